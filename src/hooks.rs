//! Permission and validation hooks, and the write-phase state they're gated by.
//!
//! No direct teacher analogue — `specs` enforces read/write exclusivity through its
//! `Fetch`/`FetchMut` borrow-checked resource system rather than explicit predicate hooks. This
//! module is new per `SPEC_FULL.md` §4.4, written in the teacher's plain-registry style (compare
//! `world/lazy.rs`'s `Vec<Box<dyn FnMut(...)>>` queues).

use std::any::{Any, TypeId};

use ahash::AHashMap;

use crate::entity::Entity;

/// World write-phase state. Hooks consult this in addition to user predicates (§4.4 write gate
/// steps 1-2).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WritePhase {
    /// No frame activity in progress; writes are ungated by phase (still subject to hooks).
    None,
    /// Inside `begin_frame`/`fixed_step`: structural writes allowed.
    Simulation,
    /// Inside `late_frame`: structural writes denied, non-structural writes allowed.
    Presentation,
    /// World is resetting: every write denied.
    Reset,
}

impl WritePhase {
    /// `true` iff this phase denies all writes outright (§4.4 step 1).
    pub fn deny_all_writes(self) -> bool {
        matches!(self, WritePhase::Reset)
    }

    /// `true` iff this phase allows structural writes (create/destroy entity, add/remove
    /// component) (§4.4 step 2).
    pub fn structural_changes_allowed(self) -> bool {
        match self {
            WritePhase::None | WritePhase::Simulation => true,
            WritePhase::Presentation | WritePhase::Reset => false,
        }
    }
}

impl Default for WritePhase {
    fn default() -> Self {
        WritePhase::None
    }
}

/// Whether a gated write operation is structural (creates/destroys an entity, or adds/removes a
/// component) or a pure value replace, for the purposes of `WritePhase::structural_changes_allowed`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WriteKind {
    Structural,
    Replace,
}

type WritePredicate = Box<dyn Fn(Entity, TypeId) -> bool + Send + Sync>;
type ObjectValidator = Box<dyn Fn(&dyn Any) -> bool + Send + Sync>;

/// Registry of write/read permission predicates and value validators.
///
/// All categories AND-aggregate (§4.4 table): a write or read is allowed only if every
/// registered predicate for that category returns `true`; every registered typed validator for
/// `T` and every registered object validator must pass for an add/replace to succeed.
#[derive(Default)]
pub struct HookRegistry {
    write_permissions: Vec<WritePredicate>,
    read_permissions: Vec<WritePredicate>,
    object_validators: Vec<ObjectValidator>,
    typed_validators: AHashMap<TypeId, Vec<ObjectValidator>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        HookRegistry::default()
    }

    /// Registers a write-permission predicate `(Entity, Type) -> bool`.
    pub fn register_write_permission<F>(&mut self, predicate: F)
    where
        F: Fn(Entity, TypeId) -> bool + Send + Sync + 'static,
    {
        self.write_permissions.push(Box::new(predicate));
    }

    /// Registers a read-permission predicate `(Entity, Type) -> bool`.
    pub fn register_read_permission<F>(&mut self, predicate: F)
    where
        F: Fn(Entity, TypeId) -> bool + Send + Sync + 'static,
    {
        self.read_permissions.push(Box::new(predicate));
    }

    /// Registers an object validator run against the boxed value of every add/replace,
    /// regardless of type.
    pub fn register_object_validator<F>(&mut self, validator: F)
    where
        F: Fn(&dyn Any) -> bool + Send + Sync + 'static,
    {
        self.object_validators.push(Box::new(validator));
    }

    /// Registers a typed validator for `T`, run only against add/replace operations on `T`.
    pub fn register_typed_validator<T, F>(&mut self, validator: F)
    where
        T: 'static,
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let wrapped: ObjectValidator = Box::new(move |any| match any.downcast_ref::<T>() {
            Some(v) => validator(v),
            None => false,
        });
        self.typed_validators.entry(TypeId::of::<T>()).or_default().push(wrapped);
    }

    /// `true` iff every registered write-permission predicate allows writing `type_id` on `entity`.
    pub fn can_write(&self, entity: Entity, type_id: TypeId) -> bool {
        self.write_permissions.iter().all(|p| p(entity, type_id))
    }

    /// `true` iff every registered read-permission predicate allows reading `type_id` on `entity`.
    pub fn can_read(&self, entity: Entity, type_id: TypeId) -> bool {
        self.read_permissions.iter().all(|p| p(entity, type_id))
    }

    /// Runs typed validators for `type_id` then object validators against `value` (§4.4 step 4
    /// order: "typed validators, then object validators").
    pub fn validate(&self, type_id: TypeId, value: &dyn Any) -> bool {
        let typed_ok = self
            .typed_validators
            .get(&type_id)
            .map_or(true, |vs| vs.iter().all(|v| v(value)));
        typed_ok && self.object_validators.iter().all(|v| v(value))
    }

    /// Runs the full write gate for a gated operation (§4.4 steps 1-4). `value` is `None` for
    /// `remove_component`, which skips validator checks (only add/replace run them).
    pub fn check_write(
        &self,
        phase: WritePhase,
        kind: WriteKind,
        entity: Entity,
        type_id: TypeId,
        value: Option<&dyn Any>,
    ) -> bool {
        if phase.deny_all_writes() {
            return false;
        }
        if kind == WriteKind::Structural && !phase.structural_changes_allowed() {
            return false;
        }
        if !self.can_write(entity, type_id) {
            return false;
        }
        if let Some(v) = value {
            if !self.validate(type_id, v) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_flags() {
        assert!(WritePhase::Reset.deny_all_writes());
        assert!(!WritePhase::Simulation.deny_all_writes());
        assert!(WritePhase::Simulation.structural_changes_allowed());
        assert!(!WritePhase::Presentation.structural_changes_allowed());
    }

    #[test]
    fn write_permission_ands() {
        let mut hooks = HookRegistry::new();
        hooks.register_write_permission(|_, _| true);
        hooks.register_write_permission(|e, _| e.id() != 5);
        let ok_entity = Entity::new(1, 0);
        let denied_entity = Entity::new(5, 0);
        assert!(hooks.can_write(ok_entity, TypeId::of::<u32>()));
        assert!(!hooks.can_write(denied_entity, TypeId::of::<u32>()));
    }

    #[test]
    fn typed_validator_runs_before_object_validator() {
        let mut hooks = HookRegistry::new();
        hooks.register_typed_validator::<i32, _>(|v| *v > 0);
        hooks.register_object_validator(|_| true);
        assert!(hooks.validate(TypeId::of::<i32>(), &5i32));
        assert!(!hooks.validate(TypeId::of::<i32>(), &-5i32));
    }

    #[test]
    fn object_validator_applies_to_every_type() {
        let mut hooks = HookRegistry::new();
        hooks.register_object_validator(|_| false);
        assert!(!hooks.validate(TypeId::of::<i32>(), &5i32));
        assert!(!hooks.validate(TypeId::of::<&str>(), &"x"));
    }

    #[test]
    fn check_write_denies_structural_during_presentation() {
        let hooks = HookRegistry::new();
        let entity = Entity::new(1, 0);
        assert!(!hooks.check_write(WritePhase::Presentation, WriteKind::Structural, entity, TypeId::of::<i32>(), None));
        assert!(hooks.check_write(WritePhase::Presentation, WriteKind::Replace, entity, TypeId::of::<i32>(), None));
    }

    #[test]
    fn check_write_denies_everything_during_reset() {
        let hooks = HookRegistry::new();
        let entity = Entity::new(1, 0);
        assert!(!hooks.check_write(WritePhase::Reset, WriteKind::Replace, entity, TypeId::of::<i32>(), None));
    }
}
