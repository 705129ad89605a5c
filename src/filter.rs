//! Composite filters over component presence, and their cached resolution against a world's
//! pool map.
//!
//! The teacher's `Join`/`BitAnd` machinery (`join/mod.rs`) composes storages' bitmasks directly
//! via `BitSetAnd`/`BitSetNot` trees built at the call site; this spec instead asks for an
//! explicit, cacheable `Filter` value with four named buckets (`with_all`/`without_all`/
//! `with_any`/`without_any`) that can be built once and resolved repeatedly, so the resolution
//! (including the FNV-1a keying below) is the novel piece grounded directly in `SPEC_FULL.md`
//! §4.3 rather than in teacher source.

use std::any::TypeId;
use std::hash::{Hash, Hasher};

use crate::component::{AnyPool, Component};
use crate::entity::Index;
use crate::storage::PoolMap;

/// One constraint-set entry: a component type's `TypeId` plus a type-erased constructor used to
/// lazily register its pool (captured at the call site, where the concrete type is known).
#[derive(Clone, Copy)]
struct Term {
    type_id: TypeId,
    make_pool: fn() -> Box<dyn AnyPool>,
}

impl Term {
    fn of<T: Component>() -> Self {
        Term {
            type_id: TypeId::of::<T>(),
            make_pool: || Box::new(crate::storage::Pool::<T>::new()),
        }
    }
}

/// A bucket of alternative types for a `with_any`/`without_any` constraint.
#[derive(Clone, Default)]
pub struct Bucket(Vec<Term>);

impl Bucket {
    /// Starts an empty bucket.
    pub fn new() -> Self {
        Bucket(Vec::new())
    }

    /// Adds `T` as one of this bucket's alternatives.
    pub fn term<T: Component>(mut self) -> Self {
        self.0.push(Term::of::<T>());
        self
    }
}

/// A composite filter: four disjoint constraint sets over component types.
///
/// Entity `E` matches iff it has every type in `with_all`, none of `without_all`, at least one
/// type from every `with_any` bucket, and no type from any `without_any` bucket.
#[derive(Clone, Default)]
pub struct Filter {
    with_all: Vec<Term>,
    without_all: Vec<Term>,
    with_any: Vec<Bucket>,
    without_any: Vec<Bucket>,
}

impl Filter {
    /// An empty filter (matches every entity).
    pub fn new() -> Self {
        Filter::default()
    }

    /// Requires `T` to be present.
    pub fn with_all<T: Component>(mut self) -> Self {
        self.with_all.push(Term::of::<T>());
        self
    }

    /// Requires `T` to be absent.
    pub fn without_all<T: Component>(mut self) -> Self {
        self.without_all.push(Term::of::<T>());
        self
    }

    /// Requires at least one type in `bucket` to be present.
    pub fn with_any(mut self, bucket: Bucket) -> Self {
        self.with_any.push(bucket);
        self
    }

    /// Requires no type in `bucket` to be present.
    pub fn without_any(mut self, bucket: Bucket) -> Self {
        self.without_any.push(bucket);
        self
    }

    /// Resolves this filter against `pools`, registering empty pools for any type mentioned
    /// that isn't registered yet, and returns the resolved form (cheap to recompute; callers
    /// should generally go through `FilterCache::resolve` instead to benefit from caching).
    pub fn resolve(&self, pools: &mut PoolMap) -> ResolvedFilter {
        for term in self.with_all.iter().chain(self.without_all.iter()) {
            pools.get_or_register_dyn(term.type_id, term.make_pool);
        }
        for bucket in self.with_any.iter().chain(self.without_any.iter()) {
            for term in &bucket.0 {
                pools.get_or_register_dyn(term.type_id, term.make_pool);
            }
        }

        ResolvedFilter {
            key: filter_key(self),
            with_all: self.with_all.iter().map(|t| t.type_id).collect(),
            without_all: self.without_all.iter().map(|t| t.type_id).collect(),
            with_any: self
                .with_any
                .iter()
                .map(|b| b.0.iter().map(|t| t.type_id).collect())
                .collect(),
            without_any: self
                .without_any
                .iter()
                .map(|b| b.0.iter().map(|t| t.type_id).collect())
                .collect(),
        }
    }
}

/// A filter with type references resolved to pool references (in practice, `TypeId`s that are
/// guaranteed registered in the owning world's pool map). Cached by [`filter_key`]; the cache is
/// invalidated on world reset (§9 open question: "resolved filters are invalidated by reset and
/// must be re-obtained").
#[derive(Clone)]
pub struct ResolvedFilter {
    key: u64,
    with_all: Vec<TypeId>,
    without_all: Vec<TypeId>,
    with_any: Vec<Vec<TypeId>>,
    without_any: Vec<Vec<TypeId>>,
}

impl ResolvedFilter {
    /// The order-independent cache key this filter resolved to.
    pub fn key(&self) -> u64 {
        self.key
    }

    /// Required ("with_all") pool types, used by the query engine to pick a seed pool.
    pub fn required(&self) -> &[TypeId] {
        &self.with_all
    }

    /// `true` iff `id` satisfies every constraint bucket.
    pub fn meets(&self, id: Index, pools: &PoolMap) -> bool {
        let has = |tid: TypeId| pools.get_dyn(tid).map_or(false, |p| p.has(id));

        self.with_all.iter().all(|&tid| has(tid))
            && self.without_all.iter().all(|&tid| !has(tid))
            && self.with_any.iter().all(|bucket| bucket.iter().any(|&tid| has(tid)))
            && self.without_any.iter().all(|bucket| bucket.iter().all(|&tid| !has(tid)))
    }
}

/// FNV-1a offset basis / prime, per the standard 64-bit parameters.
const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

struct Fnv1a(u64);

impl Fnv1a {
    fn new() -> Self {
        Fnv1a(FNV_OFFSET)
    }

    fn write_u64(&mut self, v: u64) {
        for byte in v.to_le_bytes() {
            self.0 ^= byte as u64;
            self.0 = self.0.wrapping_mul(FNV_PRIME);
        }
    }
}

fn hash_type_id(type_id: TypeId) -> u64 {
    struct Collector(u64);
    impl Hasher for Collector {
        fn finish(&self) -> u64 {
            self.0
        }
        fn write(&mut self, bytes: &[u8]) {
            let mut h = Fnv1a(self.0);
            for &b in bytes {
                h.0 ^= b as u64;
                h.0 = h.0.wrapping_mul(FNV_PRIME);
            }
            self.0 = h.0;
        }
    }
    let mut collector = Collector(FNV_OFFSET);
    type_id.hash(&mut collector);
    collector.finish()
}

/// Per-bucket mix constants so that e.g. a type appearing in `with_all` hashes differently than
/// the same type appearing in `without_all` — without these, `{with_all: [A]}` and
/// `{without_all: [A]}` would otherwise risk colliding once combined with XOR-only mixing.
const MIX_WITH_ALL: u64 = 0x9E3779B97F4A7C15;
const MIX_WITHOUT_ALL: u64 = 0xC2B2AE3D27D4EB4F;
const MIX_WITH_ANY: u64 = 0x165667B19E3779F9;
const MIX_WITHOUT_ANY: u64 = 0x27D4EB2F165667C5;

fn hash_term_set(terms: &[Term], mix: u64) -> u64 {
    let mut hashes: Vec<u64> = terms.iter().map(|t| hash_type_id(t.type_id)).collect();
    hashes.sort_unstable();
    let mut h = Fnv1a::new();
    h.write_u64(mix);
    for v in hashes {
        h.write_u64(v);
    }
    h.0
}

fn hash_buckets(buckets: &[Bucket], mix: u64) -> u64 {
    let mut bucket_hashes: Vec<u64> = buckets.iter().map(|b| hash_term_set(&b.0, mix)).collect();
    bucket_hashes.sort_unstable();
    let mut h = Fnv1a::new();
    h.write_u64(mix);
    for v in bucket_hashes {
        h.write_u64(v);
    }
    h.0
}

/// Computes an order-independent cache key for a filter: equal up to permutation of each
/// constraint set and of buckets within `with_any`/`without_any`.
pub fn filter_key(filter: &Filter) -> u64 {
    let mut h = Fnv1a::new();
    h.write_u64(hash_term_set(&filter.with_all, MIX_WITH_ALL));
    h.write_u64(hash_term_set(&filter.without_all, MIX_WITHOUT_ALL));
    h.write_u64(hash_buckets(&filter.with_any, MIX_WITH_ANY));
    h.write_u64(hash_buckets(&filter.without_any, MIX_WITHOUT_ANY));
    h.0
}

/// Caches resolved filters by their order-independent key, so repeated queries with the same
/// filter shape skip re-registering pools and re-hashing (§9: "resolution is cheap after the
/// first call for a given filter shape due to caching").
#[derive(Default)]
pub struct FilterCache {
    cache: ahash::AHashMap<u64, ResolvedFilter>,
}

impl FilterCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        FilterCache::default()
    }

    /// Resolves `filter`, reusing a cached resolution if one exists for an equal-up-to-
    /// permutation filter.
    pub fn resolve(&mut self, filter: &Filter, pools: &mut PoolMap) -> ResolvedFilter {
        let key = filter_key(filter);
        if let Some(rf) = self.cache.get(&key) {
            return rf.clone();
        }
        let rf = filter.resolve(pools);
        self.cache.insert(key, rf.clone());
        rf
    }

    /// Drops every cached resolution. Called on world reset, per the spec's open-question
    /// resolution: resolved filters are invalidated by reset and must be re-obtained.
    pub fn invalidate(&mut self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct A;
    impl Component for A {}
    #[derive(Clone, Default)]
    struct B;
    impl Component for B {}
    #[derive(Clone, Default)]
    struct C;
    impl Component for C {}

    #[test]
    fn key_is_permutation_independent() {
        let f1 = Filter::new().with_all::<A>().with_all::<B>();
        let f2 = Filter::new().with_all::<B>().with_all::<A>();
        assert_eq!(filter_key(&f1), filter_key(&f2));
    }

    #[test]
    fn key_distinguishes_with_all_from_without_all() {
        let f1 = Filter::new().with_all::<A>();
        let f2 = Filter::new().without_all::<A>();
        assert_ne!(filter_key(&f1), filter_key(&f2));
    }

    #[test]
    fn key_distinguishes_any_bucket_membership() {
        let f1 = Filter::new().with_any(Bucket::new().term::<A>().term::<B>());
        let f2 = Filter::new().with_any(Bucket::new().term::<A>().term::<C>());
        assert_ne!(filter_key(&f1), filter_key(&f2));
    }

    #[test]
    fn resolve_creates_missing_pools() {
        let mut pools = PoolMap::default();
        assert!(pools.get::<A>().is_none());
        Filter::new().with_all::<A>().resolve(&mut pools);
        assert!(pools.get::<A>().is_some());
    }

    #[test]
    fn cache_reuses_permutation_equal_filters() {
        let mut pools = PoolMap::default();
        let mut cache = FilterCache::new();
        let f1 = Filter::new().with_all::<A>().with_all::<B>();
        let f2 = Filter::new().with_all::<B>().with_all::<A>();
        let r1 = cache.resolve(&f1, &mut pools);
        let r2 = cache.resolve(&f2, &mut pools);
        assert_eq!(r1.key(), r2.key());
        assert_eq!(cache.cache.len(), 1);
    }

    #[test]
    fn meets_filter_semantics() {
        let mut pools = PoolMap::default();
        pools.get_or_register::<A>().add(1, A).unwrap();
        pools.get_or_register::<B>().add(1, B).unwrap();
        pools.get_or_register::<A>().add(2, A).unwrap();
        pools.get_or_register::<C>().add(2, C).unwrap();
        pools.get_or_register::<B>().add(3, B).unwrap();
        pools.get_or_register::<C>().add(3, C).unwrap();

        // E1{A,B}, E2{A,C}, E3{B,C}
        let rf = Filter::new().with_all::<A>().without_all::<C>().resolve(&mut pools);
        assert!(rf.meets(1, &pools));
        assert!(!rf.meets(2, &pools));
        assert!(!rf.meets(3, &pools));

        let rf = Filter::new()
            .with_any(Bucket::new().term::<B>().term::<C>())
            .resolve(&mut pools);
        assert!(rf.meets(1, &pools));
        assert!(rf.meets(2, &pools));
        assert!(rf.meets(3, &pools));

        let rf = Filter::new()
            .with_all::<A>()
            .with_any(Bucket::new().term::<B>().term::<C>())
            .resolve(&mut pools);
        assert!(rf.meets(1, &pools));
        assert!(rf.meets(2, &pools));
        assert!(!rf.meets(3, &pools));
    }
}
