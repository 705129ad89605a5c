//! Binary snapshot codec: whole-world save/load plus the per-component formatter registry and
//! post-load migration hooks it depends on.
//!
//! No direct teacher analogue — the teacher ships `saveload/` for *partial*, marker-based
//! serialization of a caller-chosen entity subset via `serde`, built on its `Component`/`Storage`
//! split. This module generalizes that idea to the spec's *whole-world* format instead (every
//! pool, every alive entity, one deterministic wire layout), keeping the teacher's dependency
//! choice (`serde` + `bincode`, gated behind the `serde` feature already in `Cargo.toml`) but
//! replacing `saveload`'s marker-component bookkeeping with a flat stable-ID-keyed pool dump.

use std::any::{Any, TypeId};
use std::io::{Read, Write};

use ahash::AHashMap;

use crate::entity::Index;
use crate::error::{Error, Result};
use crate::world::World;

const MAGIC: &[u8; 8] = b"ZENSNAP1";

/// Converts a component value to and from its on-wire byte payload.
///
/// One formatter is registered per component type (`World::register_formatter`); the codec looks
/// it up by `TypeId` when writing and by stable ID (falling back to the Rust type name) when
/// reading, since the reader doesn't have `T` statically available.
pub trait ComponentFormatter: Send + Sync {
    fn serialize(&self, value: &dyn Any) -> Result<Vec<u8>>;
    fn deserialize(&self, bytes: &[u8]) -> Result<Box<dyn Any + Send + Sync>>;
}

#[cfg(feature = "serde")]
struct SerdeFormatter<T>(std::marker::PhantomData<fn() -> T>);

#[cfg(feature = "serde")]
impl<T> SerdeFormatter<T> {
    fn new() -> Self {
        SerdeFormatter(std::marker::PhantomData)
    }
}

#[cfg(feature = "serde")]
impl<T> ComponentFormatter for SerdeFormatter<T>
where
    T: serde::Serialize + serde::de::DeserializeOwned + Send + Sync + 'static,
{
    fn serialize(&self, value: &dyn Any) -> Result<Vec<u8>> {
        let value = value
            .downcast_ref::<T>()
            .ok_or_else(|| Error::invalid_operation("snapshot formatter: value type mismatch"))?;
        bincode::serialize(value).map_err(|e| Error::corrupt_data(format!("snapshot encode failed: {}", e)))
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Box<dyn Any + Send + Sync>> {
        let value: T =
            bincode::deserialize(bytes).map_err(|e| Error::corrupt_data(format!("snapshot decode failed: {}", e)))?;
        Ok(Box::new(value))
    }
}

/// Type-keyed registry of component (de)serializers, plus a stable-ID/type-name lookup table used
/// only by `load_full` to resolve a saved pool entry back to a `TypeId`.
#[derive(Default)]
pub struct FormatterRegistry {
    by_type: AHashMap<TypeId, Box<dyn ComponentFormatter>>,
}

impl FormatterRegistry {
    pub fn new() -> Self {
        FormatterRegistry::default()
    }

    /// Registers the default `serde`-backed formatter for `T`.
    #[cfg(feature = "serde")]
    pub fn register<T>(&mut self)
    where
        T: serde::Serialize + serde::de::DeserializeOwned + Send + Sync + 'static,
    {
        self.by_type.insert(TypeId::of::<T>(), Box::new(SerdeFormatter::<T>::new()));
    }

    /// Registers a custom formatter for `T`, bypassing `serde`.
    pub fn register_with<T: 'static>(&mut self, formatter: impl ComponentFormatter + 'static) {
        self.by_type.insert(TypeId::of::<T>(), Box::new(formatter));
    }

    fn get(&self, type_id: TypeId) -> Option<&dyn ComponentFormatter> {
        self.by_type.get(&type_id).map(|f| f.as_ref())
    }
}

/// Type-keyed registry of singleton (de)serializers, alongside the stable ID each is saved under
/// (singletons aren't `Component`s, so unlike `FormatterRegistry` there's no `T::stable_id()` to
/// fall back on — the caller supplies one explicitly).
#[derive(Default)]
pub struct SingletonFormatterRegistry {
    by_type: AHashMap<TypeId, (String, Box<dyn ComponentFormatter>)>,
}

impl SingletonFormatterRegistry {
    pub fn new() -> Self {
        SingletonFormatterRegistry::default()
    }

    /// Registers the default `serde`-backed formatter for singleton type `T`, saved under
    /// `stable_id`.
    #[cfg(feature = "serde")]
    pub fn register<T>(&mut self, stable_id: impl Into<String>)
    where
        T: serde::Serialize + serde::de::DeserializeOwned + Send + Sync + 'static,
    {
        self.by_type.insert(TypeId::of::<T>(), (stable_id.into(), Box::new(SerdeFormatter::<T>::new())));
    }

    /// Registers a custom formatter for singleton type `T`, bypassing `serde`.
    pub fn register_with<T: 'static>(&mut self, stable_id: impl Into<String>, formatter: impl ComponentFormatter + 'static) {
        self.by_type.insert(TypeId::of::<T>(), (stable_id.into(), Box::new(formatter)));
    }

    fn get(&self, type_id: TypeId) -> Option<(&str, &dyn ComponentFormatter)> {
        self.by_type.get(&type_id).map(|(id, f)| (id.as_str(), f.as_ref()))
    }

    fn find_by_stable_id(&self, stable_id: &str) -> Option<(TypeId, &dyn ComponentFormatter)> {
        self.by_type.iter().find(|(_, (id, _))| id == stable_id).map(|(type_id, (_, f))| (*type_id, f.as_ref()))
    }
}

/// A registered transform run after a full snapshot load, in ascending `order`. Migrations issue
/// command buffers against the just-loaded world to add, remove, or reshape components that
/// changed shape since the snapshot was written.
type Migration = Box<dyn Fn(&mut World) + Send + Sync>;

#[derive(Default)]
pub(crate) struct MigrationRegistry {
    entries: Vec<(i64, Migration)>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        MigrationRegistry::default()
    }

    pub fn register(&mut self, order: i64, migration: impl Fn(&mut World) + Send + Sync + 'static) {
        self.entries.push((order, Box::new(migration)));
    }

    fn run_all(&self, world: &mut World) {
        let mut ordered: Vec<&(i64, Migration)> = self.entries.iter().collect();
        ordered.sort_by_key(|(order, _)| *order);
        for (_, migration) in ordered {
            migration(world);
        }
    }
}

fn io_err(e: std::io::Error) -> Error {
    Error::corrupt_data(format!("snapshot io error: {}", e))
}

fn write_u32<W: Write>(w: &mut W, v: u32) -> Result<()> {
    w.write_all(&v.to_le_bytes()).map_err(io_err)
}

fn read_u32<R: Read>(r: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf).map_err(io_err)?;
    Ok(u32::from_le_bytes(buf))
}

fn write_u32_array<W: Write>(w: &mut W, values: &[u32]) -> Result<()> {
    write_u32(w, values.len() as u32)?;
    for v in values {
        write_u32(w, *v)?;
    }
    Ok(())
}

fn read_u32_array<R: Read>(r: &mut R) -> Result<Vec<u32>> {
    let len = read_u32(r)? as usize;
    (0..len).map(|_| read_u32(r)).collect()
}

fn write_bytes<W: Write>(w: &mut W, bytes: &[u8]) -> Result<()> {
    write_u32(w, bytes.len() as u32)?;
    w.write_all(bytes).map_err(io_err)
}

fn read_bytes<R: Read>(r: &mut R) -> Result<Vec<u8>> {
    let len = read_u32(r)? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf).map_err(io_err)?;
    Ok(buf)
}

fn write_string<W: Write>(w: &mut W, s: &str) -> Result<()> {
    write_bytes(w, s.as_bytes())
}

fn read_string<R: Read>(r: &mut R) -> Result<String> {
    let bytes = read_bytes(r)?;
    String::from_utf8(bytes).map_err(|e| Error::corrupt_data(format!("snapshot string decode failed: {}", e)))
}

/// Packs `ids` into a little-endian-bit-order byte array: bit `n` of byte `n / 8` (from the LSB)
/// is set iff `n` appears in `ids`.
fn pack_alive_bits(ids: impl Iterator<Item = Index>, capacity: u32) -> Vec<u8> {
    let mut bytes = vec![0u8; ((capacity as usize) + 7) / 8];
    for id in ids {
        let byte = (id / 8) as usize;
        if byte < bytes.len() {
            bytes[byte] |= 1 << (id % 8);
        }
    }
    bytes
}

fn unpack_alive_bits(bytes: &[u8]) -> Vec<Index> {
    let mut ids = Vec::new();
    for (byte_idx, byte) in bytes.iter().enumerate() {
        for bit in 0..8 {
            if byte & (1 << bit) != 0 {
                ids.push((byte_idx * 8 + bit) as Index);
            }
        }
    }
    ids
}

/// Serializes the whole world: entity metadata, then every registered pool's alive entries,
/// then every singleton with a registered formatter, keyed by stable ID (`SPEC_FULL.md` §4.8).
///
/// Each pool's entries are framed with a total-bytes prefix covering just that segment (`SPEC_FULL.md`
/// §6.3, §9), so a reader that doesn't recognize a pool's stable ID can skip straight past its
/// entries without being able to parse them.
pub fn save_full<W: Write>(world: &World, mut writer: W) -> Result<()> {
    writer.write_all(MAGIC).map_err(io_err)?;

    write_u32(&mut writer, world.entities.next_id())?;
    write_u32_array(&mut writer, world.entities.generations())?;
    write_u32_array(&mut writer, world.entities.free_ids())?;
    let alive_bits = pack_alive_bits(world.entities.alive_ids(), world.entities.capacity());
    write_bytes(&mut writer, &alive_bits)?;

    write_u32(&mut writer, world.pools.iter().count() as u32)?;
    for (type_id, pool) in world.pools.iter() {
        write_string(&mut writer, pool.stable_id())?;
        write_string(&mut writer, pool.type_name())?;

        let ids = pool.enumerate_ids();
        let formatter = world.formatters.get(*type_id).ok_or_else(|| {
            Error::unsupported(format!("no formatter registered for {}", pool.type_name()))
        })?;

        let mut entries = Vec::new();
        for id in &ids {
            let value = pool.get_any(*id).expect("id came from enumerate_ids, must be present");
            let payload = formatter.serialize(value)?;
            write_u32(&mut entries, *id)?;
            write_bytes(&mut entries, &payload)?;
        }

        write_u32(&mut writer, ids.len() as u32)?;
        write_u32(&mut writer, entries.len() as u32)?;
        writer.write_all(&entries).map_err(io_err)?;
    }

    write_u32(&mut writer, world.singletons.len() as u32)?;
    for (type_id, value) in world.singletons.iter() {
        let (stable_id, formatter) = world.singleton_formatters.get(*type_id).ok_or_else(|| {
            Error::unsupported("a present singleton has no registered snapshot formatter".to_string())
        })?;
        let payload = formatter.serialize(value.as_ref() as &dyn Any)?;
        write_string(&mut writer, stable_id)?;
        write_bytes(&mut writer, &payload)?;
    }

    Ok(())
}

/// Loads a whole-world snapshot written by `save_full`, replacing all entity, pool, and singleton
/// state. Component writes bypass the binder (bulk-load mode); registered post-load migrations
/// run, in ascending `order`, once every pool has been restored.
///
/// A pool whose stable ID (and type name) match nothing registered in this world is skipped
/// whole: its total-bytes-framed entries segment is read and discarded without being parsed, so a
/// forward-compatible snapshot containing pools this world doesn't know about still loads
/// (`SPEC_FULL.md` §6.3).
pub fn load_full<R: Read>(world: &mut World, mut reader: R) -> Result<()> {
    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic).map_err(io_err)?;
    if &magic != MAGIC {
        return Err(Error::corrupt_data("snapshot magic mismatch"));
    }

    let next_id = read_u32(&mut reader)?;
    let generations = read_u32_array(&mut reader)?;
    let free_ids = read_u32_array(&mut reader)?;
    let alive_bits = read_bytes(&mut reader)?;
    let alive_ids = unpack_alive_bits(&alive_bits);

    world.entities.reset(false);
    world.pools.clear_all();
    world.entities.restore_metadata(next_id, generations, free_ids, alive_ids);

    let known: Vec<(TypeId, String, String)> = world
        .pools
        .iter()
        .map(|(type_id, pool)| (*type_id, pool.stable_id().to_string(), pool.type_name().to_string()))
        .collect();

    let pool_count = read_u32(&mut reader)?;
    for _ in 0..pool_count {
        let stable_id = read_string(&mut reader)?;
        let type_name = read_string(&mut reader)?;
        let _entity_count = read_u32(&mut reader)?;
        let total_bytes = read_u32(&mut reader)? as usize;

        let type_id = known
            .iter()
            .find(|(_, s, _)| *s == stable_id)
            .or_else(|| known.iter().find(|(_, _, t)| *t == type_name))
            .map(|(id, _, _)| *id);

        let type_id = match type_id {
            Some(id) => id,
            None => {
                // Forward-compat: no pool registered for this stable id. Skip the whole
                // entries segment in one read rather than aborting the load.
                let mut discard = vec![0u8; total_bytes];
                reader.read_exact(&mut discard).map_err(io_err)?;
                continue;
            }
        };

        let formatter = world
            .formatters
            .get(type_id)
            .ok_or_else(|| Error::unsupported(format!("no formatter registered for '{}'", stable_id)))?;

        let mut entries = vec![0u8; total_bytes];
        reader.read_exact(&mut entries).map_err(io_err)?;
        let mut cursor: &[u8] = &entries;
        while !cursor.is_empty() {
            let id = read_u32(&mut cursor)?;
            let payload = read_bytes(&mut cursor)?;
            let value = formatter.deserialize(&payload)?;
            let pool = world
                .pools
                .get_dyn_mut(type_id)
                .expect("resolved type_id must have a registered pool");
            pool.add_any(id, value)?;
        }
    }

    let singleton_count = read_u32(&mut reader)?;
    for _ in 0..singleton_count {
        let stable_id = read_string(&mut reader)?;
        let payload = read_bytes(&mut reader)?;
        match world.singleton_formatters.find_by_stable_id(&stable_id) {
            Some((type_id, formatter)) => {
                let value = formatter.deserialize(&payload)?;
                world.singletons.insert(type_id, value);
            }
            None => {
                // Forward-compat, same rationale as an unrecognized pool above: the payload
                // was already fully consumed by `read_bytes`, nothing left to skip.
            }
        }
    }

    world.run_post_load_migrations();
    Ok(())
}

#[cfg(test)]
#[cfg(feature = "serde")]
mod tests {
    use super::*;
    use crate::component::Component;
    use crate::config::WorldConfig;

    #[derive(Clone, Default, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Position(f32, f32, f32);
    impl Component for Position {
        fn stable_id() -> &'static str {
            "com.example.position.v1"
        }
    }

    #[derive(Clone, Default, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Health(u32);
    impl Component for Health {
        fn stable_id() -> &'static str {
            "com.example.health.v1"
        }
    }

    fn populated_world() -> (World, Vec<crate::entity::Entity>) {
        let mut world = World::new(WorldConfig::default());
        world.register_formatter::<Position>();
        world.register_formatter::<Health>();

        let mut entities = Vec::new();
        let mut cb = world.begin_write();
        for i in 0..100 {
            let e = cb.create_entity();
            cb.add_component(e, Position(i as f32, 0.0, 0.0));
            if i % 2 == 0 {
                cb.add_component(e, Health(i as u32));
            }
            entities.push(e);
        }
        cb.end_write().unwrap();
        (world, entities)
    }

    #[test]
    fn round_trip_preserves_entities_and_components() {
        let (world, entities) = populated_world();

        let mut buf = Vec::new();
        save_full(&world, &mut buf).unwrap();

        let mut loaded = World::new(WorldConfig::default());
        loaded.register_formatter::<Position>();
        loaded.register_formatter::<Health>();
        load_full(&mut loaded, buf.as_slice()).unwrap();

        assert_eq!(loaded.alive_count(), world.alive_count());
        for e in entities {
            assert_eq!(loaded.read::<Position>(e).unwrap(), world.read::<Position>(e).unwrap());
            assert_eq!(loaded.try_get::<Health>(e), world.try_get::<Health>(e));
        }
    }

    #[test]
    fn missing_formatter_on_save_is_unsupported() {
        let mut world = World::new(WorldConfig::default());
        let mut cb = world.begin_write();
        let e = cb.create_entity();
        cb.add_component(e, Position(1.0, 2.0, 3.0));
        cb.end_write().unwrap();

        let mut buf = Vec::new();
        assert!(save_full(&world, &mut buf).is_err());
    }

    #[test]
    fn corrupt_magic_is_rejected() {
        let mut world = World::new(WorldConfig::default());
        assert!(load_full(&mut world, &b"NOTASNAP"[..]).is_err());
    }

    #[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct GameClock(u32);

    #[test]
    fn round_trip_preserves_singletons() {
        let mut world = World::new(WorldConfig::default());
        world.register_singleton_formatter::<GameClock>("com.example.game_clock.v1");
        {
            let mut cb = world.begin_write();
            cb.set_singleton(GameClock(42));
            cb.end_write().unwrap();
        }

        let mut buf = Vec::new();
        save_full(&world, &mut buf).unwrap();

        let mut loaded = World::new(WorldConfig::default());
        loaded.register_singleton_formatter::<GameClock>("com.example.game_clock.v1");
        load_full(&mut loaded, buf.as_slice()).unwrap();

        assert_eq!(loaded.singleton::<GameClock>(), Some(&GameClock(42)));
    }

    #[test]
    fn missing_singleton_formatter_on_save_is_unsupported() {
        let mut world = World::new(WorldConfig::default());
        let mut cb = world.begin_write();
        cb.set_singleton(GameClock(1));
        cb.end_write().unwrap();

        let mut buf = Vec::new();
        assert!(save_full(&world, &mut buf).is_err());
    }

    #[test]
    fn load_skips_a_pool_with_no_registered_counterpart() {
        let (world, entities) = populated_world();
        let mut buf = Vec::new();
        save_full(&world, &mut buf).unwrap();

        // This world never registers Health at all (no formatter, no component ever added), so
        // it has no pool for Health's stable id; the saved Health entries must be skipped rather
        // than failing the whole load.
        let mut loaded = World::new(WorldConfig::default());
        loaded.register_formatter::<Position>();
        load_full(&mut loaded, buf.as_slice()).unwrap();

        assert_eq!(loaded.alive_count(), world.alive_count());
        for e in entities {
            assert_eq!(loaded.read::<Position>(e).unwrap(), world.read::<Position>(e).unwrap());
            assert!(!loaded.has::<Health>(e));
        }
    }

    #[test]
    fn post_load_migration_runs_after_pools_are_restored() {
        let (world, _entities) = populated_world();
        let mut buf = Vec::new();
        save_full(&world, &mut buf).unwrap();

        let mut loaded = World::new(WorldConfig::default());
        loaded.register_formatter::<Position>();
        loaded.register_formatter::<Health>();
        loaded.register_post_load_migration(0, |w| {
            let missing: Vec<_> = w.all_entities().into_iter().filter(|e| !w.has::<Health>(*e)).collect();
            let mut cb = w.begin_write();
            for e in missing {
                cb.add_component(e, Health(0));
            }
            cb.end_write().unwrap();
        });
        load_full(&mut loaded, buf.as_slice()).unwrap();

        for e in loaded.all_entities() {
            assert!(loaded.has::<Health>(e));
        }
    }
}
