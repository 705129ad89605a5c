//! Message bus: per-world synchronous typed pub/sub.
//!
//! No direct teacher analogue (the retrieved tree names `shrev::EventChannel` in `Cargo.toml` but
//! its source isn't part of the retrieved pack); built fresh per §3/§4's "subscriptions are
//! per-type handler lists on the bus", in the teacher's plain `Vec<Box<dyn Fn>>` registry style
//! used elsewhere (`hooks.rs`, `world/binder.rs`).

use std::any::{Any, TypeId};
use std::cell::Cell;

use ahash::AHashMap;

use crate::error::{Error, Result};

/// Marker trait for values publishable on the bus. Blanket-implemented for any eligible type.
pub trait Message: Any + Send + Sync {}
impl<T: Any + Send + Sync> Message for T {}

type Handler = Box<dyn Fn(&dyn Any) + Send + Sync>;

/// A registered handler's slot, identified by a monotonically increasing id so it can be
/// unsubscribed later. `None` once unsubscribed; slots aren't compacted to keep ids stable.
struct Slot {
    id: u64,
    handler: Option<Handler>,
}

/// A handle returned by `subscribe`, used to remove the handler later.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Subscription {
    type_id: TypeId,
    id: u64,
}

/// Maximum re-entrant publish depth before a cycle is assumed and aborted (§5: "implementations
/// must detect unbounded cycles and abort with a reported error").
const MAX_PUBLISH_DEPTH: u32 = 64;

/// Synchronous typed pub/sub bus. `publish` delivers to all current subscribers of that type
/// before returning; re-entrant publication from within a handler is allowed up to
/// `MAX_PUBLISH_DEPTH`.
#[derive(Default)]
pub struct MessageBus {
    handlers: AHashMap<TypeId, Vec<Slot>>,
    next_id: Cell<u64>,
    depth: Cell<u32>,
}

impl MessageBus {
    pub fn new() -> Self {
        MessageBus::default()
    }

    /// Registers `handler` for messages of type `T`, returning a handle to unsubscribe it.
    pub fn subscribe<T, F>(&mut self, handler: F) -> Subscription
    where
        T: Message,
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let wrapped: Handler = Box::new(move |any| {
            if let Some(v) = any.downcast_ref::<T>() {
                handler(v);
            }
        });
        self.handlers
            .entry(TypeId::of::<T>())
            .or_default()
            .push(Slot { id, handler: Some(wrapped) });
        Subscription { type_id: TypeId::of::<T>(), id }
    }

    /// Removes a previously registered handler. No-op if already removed.
    pub fn unsubscribe(&mut self, subscription: Subscription) {
        if let Some(slots) = self.handlers.get_mut(&subscription.type_id) {
            if let Some(slot) = slots.iter_mut().find(|s| s.id == subscription.id) {
                slot.handler = None;
            }
        }
    }

    /// Delivers `value` synchronously to every current subscriber of `T`. Returns
    /// `DependencyCycle` if re-entrant publication exceeds `MAX_PUBLISH_DEPTH`.
    pub fn publish<T: Message>(&self, value: T) -> Result<()> {
        let depth = self.depth.get();
        if depth >= MAX_PUBLISH_DEPTH {
            return Err(Error::dependency_cycle(
                "message bus: re-entrant publish exceeded maximum depth, aborting".to_string(),
            ));
        }
        self.depth.set(depth + 1);

        // SAFETY-equivalent note: handlers are called while `self.handlers` is borrowed
        // immutably; a handler calling `subscribe`/`unsubscribe` needs `&mut MessageBus`, which
        // it cannot obtain here, matching the teacher's convention of deferring structural
        // changes to command buffers rather than allowing reentrant mutation mid-dispatch.
        if let Some(slots) = self.handlers.get(&TypeId::of::<T>()) {
            for slot in slots {
                if let Some(handler) = &slot.handler {
                    handler(&value);
                }
            }
        }

        self.depth.set(depth);
        Ok(())
    }
}
