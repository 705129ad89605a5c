//! Per-type dense component storage.
//!
//! Grounded on the teacher's `storages.rs` (`VecStorage`/`DenseVecStorage`) and `storage/mod.rs`
//! (`MaskedStorage`'s `mask: BitSet` + backing array pairing), simplified to the single
//! dense-direct layout the spec allows ("sparse-direct... the external contract is only O(1)
//! random access and fast presence check").

use std::any::Any;

use hibitset::{BitSet, BitSetLike};

use crate::component::{AnyPool, Component};
use crate::entity::Index;
use crate::error::{Error, Result};

fn next_power_of_two(n: u32) -> u32 {
    n.max(1).next_power_of_two()
}

/// Dense, presence-tracked storage for components of type `T`.
///
/// `capacity` is always a power of two `>=` any indexed ID + 1, independent of the entity
/// table's own growth policy (§3: "capacity grows by doubling on demand").
pub struct Pool<T: Component> {
    dense: Vec<T>,
    presence: BitSet,
    capacity: u32,
}

impl<T: Component> Default for Pool<T> {
    fn default() -> Self {
        Pool {
            dense: Vec::new(),
            presence: BitSet::new(),
            capacity: 0,
        }
    }
}

impl<T: Component> Pool<T> {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Grows backing storage so `id` is in bounds. Capacity doubles (starting from 1) until it
    /// exceeds `id`.
    pub fn ensure_capacity(&mut self, id: Index) {
        if (id as usize) < self.dense.len() {
            return;
        }
        let required = id + 1;
        let new_capacity = next_power_of_two(required.max(self.capacity));
        self.dense.resize_with(new_capacity as usize, T::default);
        self.capacity = new_capacity;
    }

    /// `true` iff `id` currently carries a component.
    pub fn has(&self, id: Index) -> bool {
        self.presence.contains(id)
    }

    /// Adds a component at `id`. Fails with `InvalidOperation` ("Conflict") if already present.
    pub fn add(&mut self, id: Index, value: T) -> Result<()> {
        if self.has(id) {
            return Err(Error::invalid_operation(format!(
                "add<{}> conflict: entity {} already has this component",
                std::any::type_name::<T>(),
                id
            )));
        }
        self.ensure_capacity(id);
        self.dense[id as usize] = value;
        self.presence.add(id);
        Ok(())
    }

    /// Replaces the component at `id`, which must already be present. Fails with
    /// `InvalidOperation` ("MissingComponent") otherwise.
    pub fn replace(&mut self, id: Index, value: T) -> Result<()> {
        if !self.has(id) {
            return Err(self.missing_component_err(id));
        }
        self.dense[id as usize] = value;
        Ok(())
    }

    /// Removes the component at `id`, resetting its storage slot to `T::default()`. Fails with
    /// `InvalidOperation` ("MissingComponent") if absent.
    pub fn remove(&mut self, id: Index) -> Result<()> {
        if !self.presence.remove(id) {
            return Err(self.missing_component_err(id));
        }
        self.dense[id as usize] = T::default();
        Ok(())
    }

    /// Reads the component at `id`. Fails with `InvalidOperation` ("MissingComponent") if
    /// absent.
    pub fn get(&self, id: Index) -> Result<&T> {
        if self.has(id) {
            Ok(&self.dense[id as usize])
        } else {
            Err(self.missing_component_err(id))
        }
    }

    /// Reads the component at `id`, or `None` if absent.
    pub fn try_get(&self, id: Index) -> Option<&T> {
        if self.has(id) {
            Some(&self.dense[id as usize])
        } else {
            None
        }
    }

    /// Mutably accesses the component at `id`. Fails with `InvalidOperation`
    /// ("MissingComponent") if absent.
    pub fn get_mut(&mut self, id: Index) -> Result<&mut T> {
        if self.presence.contains(id) {
            Ok(&mut self.dense[id as usize])
        } else {
            Err(Error::invalid_operation(format!(
                "get_mut<{}>: entity {} has no such component",
                std::any::type_name::<T>(),
                id
            )))
        }
    }

    /// IDs currently present, in bitset iteration order (deterministic, not insertion order).
    pub fn enumerate_ids(&self) -> impl Iterator<Item = Index> + '_ {
        self.presence.iter()
    }

    /// Number of components currently present.
    pub fn len(&self) -> usize {
        self.presence.iter().count()
    }

    /// `true` iff no components are present.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every component, resetting presence. Backing capacity is retained.
    pub fn clear_all(&mut self) {
        self.presence = BitSet::new();
        for v in &mut self.dense {
            *v = T::default();
        }
    }

    fn missing_component_err(&self, id: Index) -> Error {
        Error::invalid_operation(format!(
            "missing component <{}> on entity {}",
            std::any::type_name::<T>(),
            id
        ))
    }
}

impl<T: Component> AnyPool for Pool<T> {
    fn has(&self, id: Index) -> bool {
        Pool::has(self, id)
    }

    fn remove_any(&mut self, id: Index) -> bool {
        Pool::remove(self, id).is_ok()
    }

    fn add_any(&mut self, id: Index, value: Box<dyn std::any::Any + Send + Sync>) -> Result<()> {
        let value = *value.downcast::<T>().map_err(|_| {
            Error::invalid_operation(format!(
                "add_any<{}>: boxed value type mismatch",
                std::any::type_name::<T>()
            ))
        })?;
        Pool::add(self, id, value)
    }

    fn replace_any(&mut self, id: Index, value: Box<dyn std::any::Any + Send + Sync>) -> Result<()> {
        let value = *value.downcast::<T>().map_err(|_| {
            Error::invalid_operation(format!(
                "replace_any<{}>: boxed value type mismatch",
                std::any::type_name::<T>()
            ))
        })?;
        Pool::replace(self, id, value)
    }

    fn get_any(&self, id: Index) -> Option<&dyn Any> {
        Pool::try_get(self, id).map(|v| v as &dyn Any)
    }

    fn clear_all(&mut self) {
        Pool::clear_all(self)
    }

    fn enumerate_ids(&self) -> Vec<Index> {
        Pool::enumerate_ids(self).collect()
    }

    fn ensure_capacity(&mut self, id: Index) {
        Pool::ensure_capacity(self, id)
    }

    fn stable_id(&self) -> &'static str {
        T::stable_id()
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default, PartialEq, Debug)]
    struct Health(u32);
    impl Component for Health {}

    #[test]
    fn add_then_read() {
        let mut pool = Pool::<Health>::new();
        pool.add(3, Health(100)).unwrap();
        assert_eq!(pool.get(3).unwrap(), &Health(100));
        assert!(pool.has(3));
    }

    #[test]
    fn add_conflict() {
        let mut pool = Pool::<Health>::new();
        pool.add(1, Health(1)).unwrap();
        assert!(pool.add(1, Health(2)).is_err());
    }

    #[test]
    fn replace_then_read() {
        let mut pool = Pool::<Health>::new();
        pool.add(1, Health(100)).unwrap();
        pool.replace(1, Health(75)).unwrap();
        assert_eq!(pool.get(1).unwrap(), &Health(75));
    }

    #[test]
    fn replace_missing_fails() {
        let mut pool = Pool::<Health>::new();
        assert!(pool.replace(1, Health(1)).is_err());
    }

    #[test]
    fn remove_resets_to_default() {
        let mut pool = Pool::<Health>::new();
        pool.add(1, Health(100)).unwrap();
        pool.remove(1).unwrap();
        assert!(!pool.has(1));
        // The underlying slot is reset, though it's no longer logically present.
        pool.ensure_capacity(1);
        assert_eq!(pool.dense[1], Health(0));
    }

    #[test]
    fn capacity_is_power_of_two() {
        let mut pool = Pool::<Health>::new();
        pool.ensure_capacity(5);
        assert_eq!(pool.capacity, 8);
    }
}
