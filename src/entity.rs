//! Entity table: sparse ID allocation with generation counters and alive tracking.
//!
//! Grounded on `world/entity.rs` in the teacher crate (`Allocator`, `EntitiesRes`, `Generation`),
//! simplified to the single-threaded LIFO free-list scheme this spec calls for — the teacher's
//! atomic `raised`/`killed` bitsets exist to support concurrent entity creation from systems
//! running in parallel, which is out of scope here (see Non-goals in `SPEC_FULL.md`).

use hibitset::{BitSet, BitSetLike};

use crate::config::GrowthPolicy;

/// The index half of an [`Entity`] handle. `0` is reserved as the null index.
pub type Index = u32;

/// Generation counter for a slot. Bumped every time the slot's entity is destroyed.
pub type Generation = u32;

/// A value handle `(id, generation)` referring to a logical object.
///
/// `id == 0` is the reserved null handle: never returned by `reserve`, never alive.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Entity {
    id: Index,
    generation: Generation,
}

impl Entity {
    /// The reserved null handle.
    pub const NULL: Entity = Entity { id: 0, generation: 0 };

    pub(crate) fn new(id: Index, generation: Generation) -> Self {
        Entity { id, generation }
    }

    /// The entity's index.
    #[inline]
    pub fn id(&self) -> Index {
        self.id
    }

    /// The entity's generation at the time this handle was obtained.
    #[inline]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// `true` for every handle except the reserved null handle.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.id == 0
    }
}

/// Computes the next capacity satisfying `growth_policy` for at least `required` slots.
///
/// - `Step`: round `required` up to the next multiple of `growth_step` (clamped `>= 32`).
/// - `Doubling`: start at `max(16, current)`, double until `>= required`, but never grow by less
///   than 256 in one step.
pub fn compute_new_capacity(current: u32, required: u32, policy: GrowthPolicy) -> u32 {
    match policy {
        GrowthPolicy::Step { growth_step } => {
            let step = growth_step.max(32);
            ((required + step - 1) / step) * step
        }
        GrowthPolicy::Doubling => {
            let mut next = current.max(16);
            while next < required {
                next *= 2;
            }
            if next - current < 256 {
                next = current + 256;
            }
            next
        }
    }
}

/// Sparse entity allocator: generation-tracked IDs with a LIFO free list.
///
/// See `SPEC_FULL.md` §4.1 for the full operation contract and destruction ordering guarantee.
#[derive(Debug)]
pub struct EntityTable {
    alive: BitSet,
    generations: Vec<Generation>,
    free_ids: Vec<Index>,
    next_id: Index,
    capacity: u32,
    initial_capacity: u32,
    growth_policy: GrowthPolicy,
}

impl EntityTable {
    /// Creates a table with the given initial capacity and free-id-stack reservation.
    pub fn new(initial_capacity: u32, initial_free_id_capacity: u32, growth_policy: GrowthPolicy) -> Self {
        let capacity = initial_capacity.max(16);
        EntityTable {
            alive: BitSet::new(),
            generations: vec![0; capacity as usize],
            free_ids: Vec::with_capacity(initial_free_id_capacity as usize),
            next_id: 1,
            capacity,
            initial_capacity: capacity,
            growth_policy,
        }
    }

    /// Current capacity of the generation/alive arrays. Monotonically non-decreasing except on
    /// [`EntityTable::reset`].
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// The number of currently-alive entities.
    pub fn alive_count(&self) -> usize {
        self.alive.iter().count()
    }

    fn ensure_capacity(&mut self, required: Index) {
        if required < self.capacity {
            return;
        }
        let new_capacity = compute_new_capacity(self.capacity, required + 1, self.growth_policy);
        self.generations.resize(new_capacity as usize, 0);
        self.capacity = new_capacity;
    }

    /// Allocates or reuses an ID, without marking it alive.
    ///
    /// If `fixed_id` is given, the slot is grown to accommodate it (but not marked alive) and
    /// its current generation is returned; this supports snapshot loading, which must recreate
    /// entities at their original IDs.
    pub fn reserve(&mut self, fixed_id: Option<Index>) -> Entity {
        let id = match fixed_id {
            Some(id) => {
                self.ensure_capacity(id);
                id
            }
            None => {
                if let Some(id) = self.free_ids.pop() {
                    id
                } else {
                    let id = self.next_id;
                    self.next_id += 1;
                    self.ensure_capacity(id);
                    id
                }
            }
        };
        Entity::new(id, self.generations[id as usize])
    }

    /// Marks a reserved entity alive. No-op if already alive (idempotent).
    pub fn create_reserved(&mut self, entity: Entity) {
        if self.alive.contains(entity.id()) {
            return;
        }
        self.ensure_capacity(entity.id());
        self.alive.add(entity.id());
    }

    /// Destroys an entity: clears its alive bit and bumps its generation. No-op if it wasn't
    /// alive. Returns `true` if the entity was actually destroyed.
    ///
    /// Callers that need the full destruction sequence from §4.1 (singleton clear, binder
    /// notification, context teardown, component removal, then this call, then the `destroyed`
    /// event) drive those steps around this method — `EntityTable` itself only owns the
    /// id/generation/alive bookkeeping.
    pub fn destroy(&mut self, entity: Entity) -> bool {
        if !self.is_alive(entity) {
            return false;
        }
        let id = entity.id();
        self.alive.remove(id);
        self.generations[id as usize] = self.generations[id as usize].wrapping_add(1);
        self.free_ids.push(id);
        true
    }

    /// `true` iff `id` is within bounds, alive, and its current generation matches.
    pub fn is_alive(&self, entity: Entity) -> bool {
        let id = entity.id();
        id != 0
            && (id as usize) < self.generations.len()
            && self.alive.contains(id)
            && self.generations[id as usize] == entity.generation()
    }

    /// The current generation of `id`, or `0` if never allocated.
    pub fn generation_of(&self, id: Index) -> Generation {
        self.generations.get(id as usize).copied().unwrap_or(0)
    }

    /// Snapshot of every live handle for `id` in `[1, next_id)`.
    pub fn all_entities(&self) -> Vec<Entity> {
        self.alive
            .iter()
            .map(|id| Entity::new(id, self.generations[id as usize]))
            .collect()
    }

    /// Resets to an empty table. If `keep_capacity` is false, also shrinks back to the table's
    /// originally configured capacity, matching a freshly constructed table with the same config.
    pub fn reset(&mut self, keep_capacity: bool) {
        self.alive = BitSet::new();
        self.free_ids.clear();
        self.next_id = 1;
        if keep_capacity {
            self.generations.iter_mut().for_each(|g| *g = 0);
        } else {
            self.capacity = self.initial_capacity;
            self.generations = vec![0; self.initial_capacity as usize];
        }
    }

    /// Raw access to alive-entity ids, for callers (pools, snapshot codec) that need to iterate
    /// without allocating handle structs.
    pub(crate) fn alive_ids(&self) -> impl Iterator<Item = Index> + '_ {
        self.alive.iter()
    }

    pub(crate) fn next_id(&self) -> Index {
        self.next_id
    }

    pub(crate) fn free_ids(&self) -> &[Index] {
        &self.free_ids
    }

    pub(crate) fn generations(&self) -> &[Generation] {
        &self.generations
    }

    /// Rehydrates table metadata from a snapshot. Used only by the snapshot codec during load,
    /// which first calls [`EntityTable::reset`] to guarantee a consistent starting point.
    pub(crate) fn restore_metadata(
        &mut self,
        next_id: Index,
        generations: Vec<Generation>,
        free_ids: Vec<Index>,
        alive_ids: impl IntoIterator<Item = Index>,
    ) {
        self.capacity = generations.len().max(16) as u32;
        self.generations = generations;
        self.generations.resize(self.capacity as usize, 0);
        self.free_ids = free_ids;
        self.next_id = next_id;
        self.alive = BitSet::new();
        for id in alive_ids {
            self.alive.add(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> EntityTable {
        EntityTable::new(16, 16, GrowthPolicy::Doubling)
    }

    #[test]
    fn create_destroy_recycle() {
        let mut t = table();
        let e1 = t.reserve(None);
        t.create_reserved(e1);
        assert_eq!(e1.id(), 1);
        assert_eq!(e1.generation(), 0);
        assert!(t.is_alive(e1));

        assert!(t.destroy(e1));
        assert!(!t.is_alive(e1));

        let e2 = t.reserve(None);
        t.create_reserved(e2);
        assert_eq!(e2.id(), 1);
        assert_eq!(e2.generation(), 1);
        assert!(!t.is_alive(e1));
        assert!(t.is_alive(e2));
    }

    #[test]
    fn destroy_is_idempotent() {
        let mut t = table();
        let e = t.reserve(None);
        t.create_reserved(e);
        assert!(t.destroy(e));
        assert!(!t.destroy(e));
    }

    #[test]
    fn create_reserved_is_idempotent() {
        let mut t = table();
        let e = t.reserve(None);
        t.create_reserved(e);
        t.create_reserved(e);
        assert_eq!(t.alive_count(), 1);
    }

    #[test]
    fn reserve_does_not_mark_alive() {
        let mut t = table();
        let e = t.reserve(None);
        assert!(!t.is_alive(e));
    }

    #[test]
    fn growth_doubling_respects_minimum_step() {
        assert_eq!(compute_new_capacity(16, 17, GrowthPolicy::Doubling), 272);
        assert_eq!(compute_new_capacity(256, 600, GrowthPolicy::Doubling), 1024);
    }

    #[test]
    fn growth_step_rounds_up() {
        let p = GrowthPolicy::Step { growth_step: 256 };
        assert_eq!(compute_new_capacity(0, 1, p), 256);
        assert_eq!(compute_new_capacity(0, 257, p), 512);
    }

    #[test]
    fn growth_triggers_exactly_at_boundary() {
        let mut t = EntityTable::new(16, 16, GrowthPolicy::Doubling);
        for _ in 0..15 {
            let e = t.reserve(None);
            t.create_reserved(e);
        }
        assert_eq!(t.capacity(), 16);
        let e = t.reserve(None);
        t.create_reserved(e);
        assert_eq!(e.id(), 16);
        assert!(t.capacity() > 16);
    }

    #[test]
    fn reset_without_keep_capacity_matches_fresh_table() {
        let mut t = EntityTable::new(256, 128, GrowthPolicy::Doubling);
        for _ in 0..10 {
            let e = t.reserve(None);
            t.create_reserved(e);
        }
        t.reset(false);
        assert_eq!(t.capacity(), 256);
        assert_eq!(t.alive_count(), 0);
        assert_eq!(t.next_id(), 1);
    }

    #[test]
    fn reset_without_keep_capacity_restores_grown_capacity_too() {
        let mut t = EntityTable::new(16, 16, GrowthPolicy::Doubling);
        for _ in 0..20 {
            let e = t.reserve(None);
            t.create_reserved(e);
        }
        assert!(t.capacity() > 16);
        t.reset(false);
        assert_eq!(t.capacity(), 16);
    }
}
