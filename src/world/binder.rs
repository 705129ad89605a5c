//! Binding router: an opaque notification sink for entity/component changes.
//!
//! Per the glossary, the binding router is "treated as an opaque black-box interface" — the core
//! only needs to notify it, not interpret its reaction. Grounded on the teacher's observer-style
//! `Vec<Box<dyn FnMut>>` registration pattern used throughout `world/lazy.rs`.

use std::any::TypeId;

use crate::entity::Entity;

/// What happened to a component as a result of a gated write.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeltaKind {
    Added,
    Replaced,
    Removed,
}

/// External collaborator notified of entity/component lifecycle events. Implementations are
/// supplied by the host (render binder, replication layer, editor tooling) and treated as opaque.
pub trait BinderDispatcher: Send + Sync {
    /// Fired after a successful add/replace/remove, once the pool mutation has taken effect.
    fn on_component_delta(&self, entity: Entity, type_id: TypeId, kind: DeltaKind) {
        let _ = (entity, type_id, kind);
    }

    /// Fired during an entity's destruction teardown, before components are removed (§4.1).
    fn on_entity_destroyed(&self, entity: Entity) {
        let _ = entity;
    }
}

/// Fans notifications out to every registered binder.
#[derive(Default)]
pub struct BinderRouter {
    binders: Vec<Box<dyn BinderDispatcher>>,
}

impl BinderRouter {
    pub fn new() -> Self {
        BinderRouter::default()
    }

    pub fn register(&mut self, binder: Box<dyn BinderDispatcher>) {
        self.binders.push(binder);
    }

    pub fn notify_component_delta(&self, entity: Entity, type_id: TypeId, kind: DeltaKind) {
        for b in &self.binders {
            b.on_component_delta(entity, type_id, kind);
        }
    }

    pub fn notify_entity_destroyed(&self, entity: Entity) {
        for b in &self.binders {
            b.on_entity_destroyed(entity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingBinder(Arc<AtomicUsize>);
    impl BinderDispatcher for CountingBinder {
        fn on_entity_destroyed(&self, _entity: Entity) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn router_fans_out_to_all_binders() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut router = BinderRouter::new();
        router.register(Box::new(CountingBinder(counter.clone())));
        router.register(Box::new(CountingBinder(counter.clone())));
        router.notify_entity_destroyed(Entity::new(1, 0));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
