//! Component trait and the type-erased pool interface pools are accessed through generically
//! (snapshotting, bulk destruction, capacity alignment) without the caller knowing `T`.
//!
//! Grounded on the teacher's `AnyStorage` trait (`storage/mod.rs`), which exists for exactly the
//! same reason: a `World` holds a type-keyed map of trait objects, but still needs to be able to
//! drop components for a destroyed entity without downcasting to every registered type.

use std::any::Any;

use crate::entity::Index;
use crate::error::Result;

/// A plain-data record attachable to at most one entity of a given type.
///
/// `Default` backs the "reset to zero value" contract on removal (§4.2); `Clone` backs query
/// iteration, which yields copies rather than references into the pool.
pub trait Component: 'static + Send + Sync + Default + Clone {
    /// Reverse-DNS stable identifier used by the snapshot codec to key this type across
    /// versions, e.g. `"com.example.position.v1"`. Defaults to the Rust type name, which is
    /// *not* stable across refactors — real components should override this.
    fn stable_id() -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Type-erased operations every component pool supports, regardless of its element type.
///
/// A `Box<dyn AnyPool>` is what the world's pool map actually stores; `crate::storage::Pool<T>`
/// is the concrete, typed accessor built on top for the common case where `T` is known at the
/// call site.
pub trait AnyPool: Any + Send + Sync {
    /// `true` iff `id` currently carries a component in this pool.
    fn has(&self, id: Index) -> bool;

    /// Removes the component at `id` if present. Returns whether anything was removed.
    fn remove_any(&mut self, id: Index) -> bool;

    /// Adds a boxed value at `id`, downcasting to this pool's element type. Used by the command
    /// buffer's type-erased write path (`SPEC_FULL.md` §4.5), which only has a `TypeId` at the
    /// point the pool is looked up.
    fn add_any(&mut self, id: Index, value: Box<dyn Any + Send + Sync>) -> Result<()>;

    /// Replaces the boxed value at `id`, downcasting to this pool's element type.
    fn replace_any(&mut self, id: Index, value: Box<dyn Any + Send + Sync>) -> Result<()>;

    /// Reads the component at `id` as `&dyn Any`, for callers (the snapshot codec) that only
    /// have a `TypeId`, not the concrete `T`, at the call site.
    fn get_any(&self, id: Index) -> Option<&dyn Any>;

    /// Drops every stored component, resetting the pool to empty (capacity is retained).
    fn clear_all(&mut self);

    /// IDs currently present, in the pool's own enumeration order (deterministic, but not
    /// required to match insertion order).
    fn enumerate_ids(&self) -> Vec<Index>;

    /// Number of components currently present.
    fn len(&self) -> usize {
        self.enumerate_ids().len()
    }

    /// `true` iff no components are present.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Grows backing storage so `id` can be indexed. No-op if already large enough.
    fn ensure_capacity(&mut self, id: Index);

    /// The stable reverse-DNS identifier for this pool's component type.
    fn stable_id(&self) -> &'static str;

    /// The Rust type name, used as a snapshot fallback key when a stable ID can't be resolved.
    fn type_name(&self) -> &'static str;

    /// Downcasting support for the snapshot codec and tests.
    fn as_any(&self) -> &dyn Any;

    /// Downcasting support for the snapshot codec and tests.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
