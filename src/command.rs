//! Command buffer: the RAII-scoped, record-then-apply path for structural world mutations.
//!
//! Grounded on `world/lazy.rs`'s `LazyUpdate`, which queues `Box<dyn FnOnce(&mut World)>` jobs
//! and drains them on `maintain()`. This module generalizes that to the write-phase-gated,
//! hook-checked operation set in `SPEC_FULL.md` §4.5, and — unlike `LazyUpdate`, which takes
//! `&self` because `shred::World` uses interior mutability throughout — holds `&mut World`
//! directly: recording requires exclusive access, which the borrow checker then enforces for us
//! instead of a runtime phase flag.

use std::any::{Any, TypeId};
use std::collections::VecDeque;

use crate::component::{AnyPool, Component};
use crate::config::WriteFailurePolicy;
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::hooks::WriteKind;
use crate::storage::Pool;
use crate::world::binder::DeltaKind;
use crate::world::World;

type DeferredOp<'w> = Box<dyn FnOnce(&mut CommandBuffer<'w>) + 'w>;

/// Append-only record of operations against one world, applied exactly once when it goes out of
/// scope (or on an explicit `end_write` call).
pub struct CommandBuffer<'w> {
    pub(crate) world: &'w mut World,
    ops: VecDeque<DeferredOp<'w>>,
    ended: bool,
}

impl<'w> CommandBuffer<'w> {
    pub(crate) fn new(world: &'w mut World) -> Self {
        CommandBuffer { world, ops: VecDeque::new(), ended: false }
    }

    /// Reserves an entity immediately (observable as a handle right away); `create_reserved`
    /// fires at apply (§4.5).
    pub fn create_entity(&mut self) -> Entity {
        let entity = self.world.entities.reserve(None);
        self.ops.push_back(Box::new(move |cb| {
            cb.world.entities.create_reserved(entity);
        }));
        entity
    }

    /// Like `create_entity`, but runs `on_created(entity, cb)` inside the apply, after the
    /// entity is marked alive — the callback may record further operations on `cb`, which run
    /// within the same barrier (§4.5: "enabling recursive ops").
    pub fn create_entity_with<F>(&mut self, on_created: F) -> Entity
    where
        F: FnOnce(Entity, &mut CommandBuffer<'w>) + 'w,
    {
        let entity = self.world.entities.reserve(None);
        self.ops.push_back(Box::new(move |cb| {
            cb.world.entities.create_reserved(entity);
            on_created(entity, cb);
        }));
        entity
    }

    /// Destroys `entity` at apply. No-op if not alive by then.
    pub fn destroy_entity(&mut self, entity: Entity) {
        self.ops.push_back(Box::new(move |cb| {
            cb.world.destroy_entity_now(entity);
        }));
    }

    /// Adds `value` to `entity` at apply, subject to the write gate. Registers `T`'s pool first
    /// if it doesn't exist yet.
    pub fn add_component<T: Component>(&mut self, entity: Entity, value: T) {
        self.ops.push_back(Box::new(move |cb| {
            let make: fn() -> Box<dyn AnyPool> = || Box::new(Pool::<T>::new());
            cb.apply_gated_write_dyn(
                entity,
                TypeId::of::<T>(),
                WriteKind::Structural,
                Some(Box::new(value)),
                GatedOp::Add,
                Some(make),
            );
        }));
    }

    /// Replaces `entity`'s `T` at apply, subject to the write gate.
    pub fn replace_component<T: Component>(&mut self, entity: Entity, value: T) {
        self.ops.push_back(Box::new(move |cb| {
            cb.apply_gated_write_dyn(
                entity,
                TypeId::of::<T>(),
                WriteKind::Replace,
                Some(Box::new(value)),
                GatedOp::Replace,
                None,
            );
        }));
    }

    /// Removes `entity`'s `T` at apply, subject to the write gate.
    pub fn remove_component<T: Component>(&mut self, entity: Entity) {
        self.ops.push_back(Box::new(move |cb| {
            cb.apply_gated_write_dyn(entity, TypeId::of::<T>(), WriteKind::Structural, None, GatedOp::Remove, None);
        }));
    }

    /// Boxed-value variant of `add_component`, for callers that only have a `TypeId` (the
    /// external command queue translation path). The pool must already be registered — there is
    /// no type available here to construct one.
    pub fn add_component_boxed(&mut self, entity: Entity, type_id: TypeId, value: Box<dyn Any + Send + Sync>) {
        self.ops.push_back(Box::new(move |cb| {
            cb.apply_gated_write_dyn(entity, type_id, WriteKind::Structural, Some(value), GatedOp::Add, None);
        }));
    }

    /// Boxed-value variant of `replace_component`.
    pub fn replace_component_boxed(&mut self, entity: Entity, type_id: TypeId, value: Box<dyn Any + Send + Sync>) {
        self.ops.push_back(Box::new(move |cb| {
            cb.apply_gated_write_dyn(entity, type_id, WriteKind::Replace, Some(value), GatedOp::Replace, None);
        }));
    }

    /// Boxed-value variant of `remove_component`.
    pub fn remove_component_boxed(&mut self, entity: Entity, type_id: TypeId) {
        self.ops.push_back(Box::new(move |cb| {
            cb.apply_gated_write_dyn(entity, type_id, WriteKind::Structural, None, GatedOp::Remove, None);
        }));
    }

    /// Sets the world-scoped singleton of type `T`, overwriting any previous value.
    pub fn set_singleton<T: Send + Sync + 'static>(&mut self, value: T) {
        self.ops.push_back(Box::new(move |cb| {
            cb.world.singletons.insert(TypeId::of::<T>(), Box::new(value));
        }));
    }

    /// Removes the world-scoped singleton of type `T`, if any.
    pub fn remove_singleton<T: Send + Sync + 'static>(&mut self) {
        self.ops.push_back(Box::new(move |cb| {
            cb.world.singletons.remove(&TypeId::of::<T>());
        }));
    }

    /// Schedules `job` on the world's worker, to run at the next `run_scheduled_jobs` drain (the
    /// one `end_write` performs after applying every recorded operation above).
    pub fn schedule<F>(&mut self, job: F)
    where
        F: FnOnce(&mut crate::world::World) + Send + 'static,
    {
        self.world.schedule(job);
    }

    /// Applies every recorded operation (in record order, including operations recorded
    /// recursively by callbacks during this very call) and drains the worker's job queue.
    ///
    /// Returns `Err` only under `WriteFailurePolicy::Throw`, carrying the first denial/failure
    /// encountered; every operation still runs regardless of policy (§4.4: "the command buffer
    /// continues applying subsequent operations even after a denial").
    pub fn end_write(mut self) -> Result<()> {
        self.apply()
    }

    fn apply(&mut self) -> Result<()> {
        let mut first_err: Option<Error> = None;
        loop {
            let op = match self.ops.pop_front() {
                Some(op) => op,
                None => break,
            };
            op(self);
            if first_err.is_none() {
                if let Some(e) = self.world.take_last_write_error() {
                    first_err = Some(e);
                }
            }
        }
        self.ended = true;
        self.world.run_scheduled_jobs();

        match (self.world.write_failure_policy(), first_err) {
            (WriteFailurePolicy::Throw, Some(e)) => Err(e),
            _ => Ok(()),
        }
    }

    fn apply_gated_write_dyn(
        &mut self,
        entity: Entity,
        type_id: TypeId,
        kind: WriteKind,
        value: Option<Box<dyn Any + Send + Sync>>,
        op: GatedOp,
        make_pool: Option<fn() -> Box<dyn AnyPool>>,
    ) {
        let allowed = self.world.hooks.check_write(
            self.world.write_phase,
            kind,
            entity,
            type_id,
            value.as_deref().map(|v| v as &dyn Any),
        );

        if !allowed {
            self.world.report_write_denied(entity, type_id, op);
            return;
        }

        let applied = self.world.apply_boxed_write(entity, type_id, op, value, make_pool);
        match applied {
            Ok(()) => {
                let delta_kind = match op {
                    GatedOp::Add => DeltaKind::Added,
                    GatedOp::Replace => DeltaKind::Replaced,
                    GatedOp::Remove => DeltaKind::Removed,
                };
                self.world.binder.notify_component_delta(entity, type_id, delta_kind);
            }
            Err(e) => self.world.record_write_error(e),
        }
    }
}

impl<'w> Drop for CommandBuffer<'w> {
    fn drop(&mut self) {
        if !self.ended {
            // Best-effort RAII barrier: a dropped, never-explicitly-ended buffer still applies.
            // Errors under `Throw` policy are reported through the error hook instead of
            // propagating, since `drop` cannot return a `Result`.
            if let Err(e) = self.apply() {
                self.world.report_error(&e);
            }
        }
    }
}

/// Which gated operation a deferred write performs; used to pick the right `AnyPool` call and
/// the right `DeltaKind` to notify.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum GatedOp {
    Add,
    Replace,
    Remove,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorldConfig;

    #[derive(Clone, Default, Debug, PartialEq)]
    struct Health(u32);
    impl Component for Health {}

    #[derive(Clone, Default, Debug, PartialEq)]
    struct Stun(f32);
    impl Component for Stun {}

    #[test]
    fn command_buffer_atomicity_scenario() {
        let mut world = World::new(WorldConfig::default());
        let entity;
        {
            let mut cb = world.begin_write();
            entity = cb.create_entity();
            cb.add_component(entity, Health(100));
            cb.replace_component(entity, Health(75));
            cb.add_component(entity, Stun(1.5));
            cb.remove_component::<Stun>(entity);
            cb.end_write().unwrap();
        }
        assert_eq!(world.read::<Health>(entity).unwrap().0, 75);
        assert!(!world.has::<Stun>(entity));
    }

    #[test]
    fn recursive_create_entity_with_runs_within_barrier() {
        let mut world = World::new(WorldConfig::default());
        let mut cb = world.begin_write();
        let parent = cb.create_entity_with(|parent, cb| {
            let child = cb.create_entity();
            cb.add_component(child, Health(1));
            cb.add_component(parent, Health(2));
        });
        cb.end_write().unwrap();
        assert_eq!(world.read::<Health>(parent).unwrap().0, 2);
    }
}
