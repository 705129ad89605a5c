//! Type-keyed map from component type to its pool.
//!
//! Grounded on `storage/storages.rs`'s use of `ahash::AHashMap` for the teacher's own
//! `HashMapStorage`; reused here for the world-level type -> pool registry.

use std::any::TypeId;

use ahash::AHashMap;

use crate::component::{AnyPool, Component};
use crate::storage::pool::Pool;

/// Type-keyed registry of component pools.
#[derive(Default)]
pub struct PoolMap {
    pools: AHashMap<TypeId, Box<dyn AnyPool>>,
}

impl PoolMap {
    /// Creates an empty map with `buckets` worth of preallocated capacity.
    pub fn with_capacity(buckets: u32) -> Self {
        PoolMap {
            pools: AHashMap::with_capacity_and_hasher(buckets as usize, Default::default()),
        }
    }

    /// Registers `T`'s pool if it isn't registered yet. Idempotent.
    pub fn register<T: Component>(&mut self) {
        self.pools
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(Pool::<T>::new()));
    }

    /// Returns `T`'s pool, registering an empty one first if absent — the "creating an empty
    /// pool if absent" behavior the filter resolver relies on (§4.3).
    pub fn get_or_register<T: Component>(&mut self) -> &mut Pool<T> {
        self.register::<T>();
        self.pools
            .get_mut(&TypeId::of::<T>())
            .unwrap()
            .as_any_mut()
            .downcast_mut::<Pool<T>>()
            .expect("pool type mismatch: TypeId collision should be impossible")
    }

    /// Returns `T`'s pool if registered.
    pub fn get<T: Component>(&self) -> Option<&Pool<T>> {
        self.pools
            .get(&TypeId::of::<T>())
            .map(|p| p.as_any().downcast_ref::<Pool<T>>().unwrap())
    }

    /// Returns `T`'s pool mutably if registered.
    pub fn get_mut<T: Component>(&mut self) -> Option<&mut Pool<T>> {
        self.pools
            .get_mut(&TypeId::of::<T>())
            .map(|p| p.as_any_mut().downcast_mut::<Pool<T>>().unwrap())
    }

    /// Looks up a pool by its `TypeId`, registering an empty one via `make` if absent. Used by
    /// the filter resolver, which only has a `TypeId` plus a type-erased constructor captured at
    /// the call site where `T` was statically known.
    pub fn get_or_register_dyn(
        &mut self,
        type_id: TypeId,
        make: fn() -> Box<dyn AnyPool>,
    ) -> &mut Box<dyn AnyPool> {
        self.pools.entry(type_id).or_insert_with(make)
    }

    /// Looks up a pool by `TypeId` without creating it.
    pub fn get_dyn(&self, type_id: TypeId) -> Option<&dyn AnyPool> {
        self.pools.get(&type_id).map(|b| b.as_ref())
    }

    /// Looks up a pool by `TypeId` mutably without creating it.
    pub fn get_dyn_mut(&mut self, type_id: TypeId) -> Option<&mut Box<dyn AnyPool>> {
        self.pools.get_mut(&type_id)
    }

    /// Removes the component at `id` from every registered pool. Used by entity destruction.
    pub fn remove_all_for(&mut self, id: crate::entity::Index) {
        for pool in self.pools.values_mut() {
            pool.remove_any(id);
        }
    }

    /// Clears every pool, dropping all stored components but retaining registrations.
    pub fn clear_all(&mut self) {
        for pool in self.pools.values_mut() {
            pool.clear_all();
        }
    }

    /// Iterates every registered pool along with its `TypeId`, in unspecified but stable order
    /// for a given sequence of registrations. Used by the snapshot codec to enumerate pools to
    /// save.
    pub fn iter(&self) -> impl Iterator<Item = (&TypeId, &Box<dyn AnyPool>)> {
        self.pools.iter()
    }

    /// Iterates every registered pool mutably along with its `TypeId`. Used by the snapshot
    /// codec to write loaded data back in.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&TypeId, &mut Box<dyn AnyPool>)> {
        self.pools.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default, Debug, PartialEq)]
    struct Position(f32, f32);
    impl Component for Position {}

    #[test]
    fn register_then_fetch() {
        let mut map = PoolMap::default();
        map.get_or_register::<Position>().add(1, Position(1.0, 2.0)).unwrap();
        assert_eq!(map.get::<Position>().unwrap().get(1).unwrap(), &Position(1.0, 2.0));
    }

    #[test]
    fn missing_pool_is_none() {
        let map = PoolMap::default();
        assert!(map.get::<Position>().is_none());
    }
}
