//! Query engine: resolves `query::<(T1..Tn)>(filter)` into a minimal-seed iterator over
//! matching entities.
//!
//! The arity-generated tuple impls below are grounded on the teacher's own `bitset_and!` macro
//! in `join/mod.rs`, which generates `BitAnd` impls for tuples up to arity 16 the same way:
//! `macro_rules!` fanning out over a fixed list of type-variable lists. We cap at 8, per
//! `SPEC_FULL.md` §4.3 ("query enumeration (arity 1..8)"), and skip the teacher's
//! `tuple_utils::Split`-based binary-tree composition since the seed-pool selection here doesn't
//! need a `BitSetAnd` tree — it walks a single seed pool's presence set directly.

use std::any::TypeId;
use std::marker::PhantomData;

use crate::component::Component;
use crate::entity::{Entity, EntityTable, Index};
use crate::filter::ResolvedFilter;
use crate::storage::PoolMap;

/// A tuple of component types queryable together. Implemented for tuples of arity 1 through 8
/// via the `impl_query_tuple!` macro below.
pub trait QueryTuple: Sized {
    /// `TypeId`s of every element, in declaration order.
    fn type_ids() -> Vec<TypeId>;

    /// Clones each element out of its pool at `id`. Only called after every element's presence
    /// has already been confirmed by the caller.
    fn fetch(id: Index, pools: &PoolMap) -> Self;
}

macro_rules! impl_query_tuple {
    ($($T:ident),+) => {
        impl<$($T: Component),+> QueryTuple for ($($T,)+) {
            fn type_ids() -> Vec<TypeId> {
                vec![$(TypeId::of::<$T>()),+]
            }

            fn fetch(id: Index, pools: &PoolMap) -> Self {
                (
                    $(
                        pools
                            .get::<$T>()
                            .and_then(|p| p.try_get(id))
                            .cloned()
                            .expect("presence already confirmed by QueryIter::next"),
                    )+
                )
            }
        }
    };
}

impl_query_tuple!(A);
impl_query_tuple!(A, B);
impl_query_tuple!(A, B, C);
impl_query_tuple!(A, B, C, D);
impl_query_tuple!(A, B, C, D, E);
impl_query_tuple!(A, B, C, D, E, F);
impl_query_tuple!(A, B, C, D, E, F, G);
impl_query_tuple!(A, B, C, D, E, F, G, H);

/// Picks the pool with the smallest presence count among `required`, returning its id list (the
/// seed). `None` if any required pool is missing (§4.3 step 1: "if any required pool ... is
/// missing or empty, iterator is empty").
fn select_seed(required: &[TypeId], pools: &PoolMap) -> Option<Vec<Index>> {
    let mut best: Option<(usize, Vec<Index>)> = None;
    for &type_id in required {
        let pool = pools.get_dyn(type_id)?;
        let ids = pool.enumerate_ids();
        if ids.is_empty() {
            return Some(Vec::new());
        }
        if best.as_ref().map_or(true, |(count, _)| ids.len() < *count) {
            best = Some((ids.len(), ids));
        }
    }
    Some(best.map(|(_, ids)| ids).unwrap_or_default())
}

/// Lazy, finite, non-restartable iterator over entities matching a query. Yields owned copies of
/// each requested component (§4.3: "Yielded values are copies; mutations go through command
/// buffers or `get_mut` outside iteration").
pub struct QueryIter<'a, Q: QueryTuple> {
    pools: &'a PoolMap,
    entities: &'a EntityTable,
    seed_ids: std::vec::IntoIter<Index>,
    required: Vec<TypeId>,
    filter: Option<ResolvedFilter>,
    _marker: PhantomData<Q>,
}

impl<'a, Q: QueryTuple> QueryIter<'a, Q> {
    pub(crate) fn new(pools: &'a PoolMap, entities: &'a EntityTable, filter: Option<ResolvedFilter>) -> Self {
        let mut required = Q::type_ids();
        if let Some(rf) = &filter {
            required.extend_from_slice(rf.required());
        }

        let seed_ids = select_seed(&required, pools).unwrap_or_default();

        QueryIter {
            pools,
            entities,
            seed_ids: seed_ids.into_iter(),
            required,
            filter,
            _marker: PhantomData,
        }
    }
}

impl<'a, Q: QueryTuple> Iterator for QueryIter<'a, Q> {
    type Item = (Entity, Q);

    fn next(&mut self) -> Option<Self::Item> {
        for id in self.seed_ids.by_ref() {
            let all_required_present = self
                .required
                .iter()
                .all(|&type_id| self.pools.get_dyn(type_id).map_or(false, |p| p.has(id)));
            if !all_required_present {
                continue;
            }
            if let Some(rf) = &self.filter {
                if !rf.meets(id, self.pools) {
                    continue;
                }
            }
            let entity = Entity::new(id, self.entities.generation_of(id));
            return Some((entity, Q::fetch(id, self.pools)));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GrowthPolicy;
    use crate::filter::{Bucket, Filter};

    #[derive(Clone, Default, Debug, PartialEq)]
    struct Position(f32, f32);
    impl Component for Position {}

    #[derive(Clone, Default, Debug, PartialEq)]
    struct Health(u32);
    impl Component for Health {}

    fn setup() -> (EntityTable, PoolMap) {
        let mut table = EntityTable::new(16, 16, GrowthPolicy::Doubling);
        let mut pools = PoolMap::default();
        for i in 0..3 {
            let e = table.reserve(None);
            table.create_reserved(e);
            pools.get_or_register::<Position>().add(e.id(), Position(i as f32, 0.0)).unwrap();
            if i != 1 {
                pools.get_or_register::<Health>().add(e.id(), Health(100)).unwrap();
            }
        }
        (table, pools)
    }

    #[test]
    fn query_single_arity() {
        let (table, pools) = setup();
        let results: Vec<_> = QueryIter::<(Position,)>::new(&pools, &table, None).collect();
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn query_two_arity_excludes_missing() {
        let (table, pools) = setup();
        let results: Vec<_> = QueryIter::<(Position, Health)>::new(&pools, &table, None).collect();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn query_missing_pool_is_empty() {
        #[derive(Clone, Default)]
        struct Unregistered;
        impl Component for Unregistered {}

        let (table, pools) = setup();
        let results: Vec<_> = QueryIter::<(Unregistered,)>::new(&pools, &table, None).collect();
        assert!(results.is_empty());
    }

    #[test]
    fn query_with_filter() {
        let (table, mut pools) = setup();
        let filter = Filter::new().without_all::<Health>();
        let rf = filter.resolve(&mut pools);
        let results: Vec<_> = QueryIter::<(Position,)>::new(&pools, &table, Some(rf)).collect();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn seed_picks_smaller_pool() {
        let (_table, pools) = setup();
        let seed = select_seed(&[TypeId::of::<Position>(), TypeId::of::<Health>()], &pools).unwrap();
        assert_eq!(seed.len(), 2);

        let _ = Bucket::new(); // sanity: Bucket is constructible from this module's test scope
    }
}
