//! Context registry: opaque per-entity, per-type view-side associations.
//!
//! Treated as a black-box collaborator per `SPEC_FULL.md`'s glossary ("external-collaborator
//! hooks the core notifies on entity and component changes"): the core only needs to store and
//! tear down associations by entity id, not interpret them. Grounded on the teacher's type-keyed
//! `AHashMap` storage convention (`storage/storages.rs`), reused here per-type-then-per-entity.

use std::any::{Any, TypeId};

use ahash::AHashMap;

use crate::entity::Index;

type ContextMap = AHashMap<Index, Box<dyn Any + Send + Sync>>;

/// Stores arbitrary view-side values keyed by `(TypeId, entity id)`. Unlike component pools,
/// contexts carry no presence bitset or capacity contract — they're a loose side table for
/// renderer/editor/host associations that the simulation core never reads.
#[derive(Default)]
pub struct ContextRegistry {
    by_type: AHashMap<TypeId, ContextMap>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        ContextRegistry::default()
    }

    /// Associates `value` with `id`, overwriting any previous association of type `T`.
    pub fn set<T: Send + Sync + 'static>(&mut self, id: Index, value: T) {
        self.by_type
            .entry(TypeId::of::<T>())
            .or_default()
            .insert(id, Box::new(value));
    }

    /// Reads the `T` context for `id`, if any.
    pub fn get<T: Send + Sync + 'static>(&self, id: Index) -> Option<&T> {
        self.by_type
            .get(&TypeId::of::<T>())
            .and_then(|m| m.get(&id))
            .and_then(|v| v.downcast_ref::<T>())
    }

    /// Removes the `T` context for `id`, returning `true` if one was present.
    pub fn remove<T: Send + Sync + 'static>(&mut self, id: Index) -> bool {
        self.by_type
            .get_mut(&TypeId::of::<T>())
            .map_or(false, |m| m.remove(&id).is_some())
    }

    /// Drops every context association for `id`, across all types. Called during entity
    /// destruction's teardown sequence (§4.1: "context registry to drop associations").
    pub fn clear_for_entity(&mut self, id: Index) {
        for m in self.by_type.values_mut() {
            m.remove(&id);
        }
    }

    /// Drops every association, across all types and entities. Called on world reset.
    pub fn clear_all(&mut self) {
        self.by_type.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_remove() {
        let mut ctx = ContextRegistry::new();
        ctx.set(1, "view-handle".to_string());
        assert_eq!(ctx.get::<String>(1).unwrap(), "view-handle");
        assert!(ctx.remove::<String>(1));
        assert!(ctx.get::<String>(1).is_none());
    }

    #[test]
    fn clear_for_entity_drops_all_types() {
        let mut ctx = ContextRegistry::new();
        ctx.set(1, 42i32);
        ctx.set(1, "x".to_string());
        ctx.clear_for_entity(1);
        assert!(ctx.get::<i32>(1).is_none());
        assert!(ctx.get::<String>(1).is_none());
    }
}
