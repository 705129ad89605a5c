//! The world: owns one entity table, the component pools, and every per-world collaborator
//! (hooks, singletons, context registry, binder router, message bus, worker, system runner).
//!
//! Per `SPEC_FULL.md` §9 ("re-express as a single world object with internal submodules... the
//! world delegates via composition, not subtype polymorphism"), each collaborator lives in its
//! own module (`binder`, `context`, and the crate-level `hooks`/`worker`/`message`/`system`
//! modules) and `World` only wires them together. Grounded on the teacher's `shred::World` as the
//! thing being generalized, though the teacher's version is a generic untyped resource map, not a
//! single closed struct — the composition-not-subtyping note above is exactly why this version
//! doesn't reuse that approach.

pub mod binder;
pub mod context;

use std::any::{Any, TypeId};
use std::io::{Read as IoRead, Write as IoWrite};

use ahash::AHashMap;

use crate::command::{CommandBuffer, GatedOp};
use crate::component::{AnyPool, Component};
use crate::config::{KernelOptions, WorldConfig, WriteFailurePolicy};
use crate::entity::{Entity, EntityTable, Index};
use crate::error::{Error, Result};
use crate::external::{ExternalCommand, ExternalCommandQueue};
use crate::filter::{Filter, FilterCache};
use crate::hooks::{HookRegistry, WritePhase};
use crate::logger::SharedLogger;
use crate::message::{Message, MessageBus, Subscription};
use crate::query::{QueryIter, QueryTuple};
use crate::snapshot;
use crate::storage::{Pool, PoolMap};
use crate::system::{Order, SystemEntry, SystemGroup, SystemKind, SystemRunner};
use crate::worker::Worker;

use binder::{BinderDispatcher, BinderRouter};
use context::ContextRegistry;

/// Opaque world identifier, assigned by the owning `Kernel`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct WorldId(pub(crate) u64);

impl WorldId {
    pub fn value(self) -> u64 {
        self.0
    }
}

pub struct World {
    id: WorldId,
    name: String,
    tags: Vec<String>,
    frame_count: u64,
    tick: u64,
    paused: bool,

    pub(crate) entities: EntityTable,
    pub(crate) pools: PoolMap,
    pub(crate) hooks: HookRegistry,
    pub(crate) singletons: AHashMap<TypeId, Box<dyn Any + Send + Sync>>,
    pub(crate) context: ContextRegistry,
    pub(crate) binder: BinderRouter,
    pub(crate) bus: MessageBus,
    pub(crate) worker: Worker,
    pub(crate) external: ExternalCommandQueue,
    pub(crate) filter_cache: FilterCache,
    pub(crate) runner: SystemRunner,
    pub(crate) write_phase: WritePhase,
    pub(crate) formatters: crate::snapshot::FormatterRegistry,
    pub(crate) singleton_formatters: crate::snapshot::SingletonFormatterRegistry,
    migrations: crate::snapshot::MigrationRegistry,

    config: WorldConfig,
    write_failure_policy: WriteFailurePolicy,
    logger: SharedLogger,
    error_report_hook: Option<crate::config::ErrorReportHook>,
    last_write_error: Option<Error>,
}

impl World {
    /// Builds a standalone world with default process-wide options. Kernels use
    /// [`World::with_options`] instead, to share one logger/error hook/policy across worlds.
    pub fn new(config: WorldConfig) -> Self {
        Self::with_options(WorldId(0), "world".to_string(), Vec::new(), config, &KernelOptions::default())
    }

    pub(crate) fn with_options(
        id: WorldId,
        name: String,
        tags: Vec<String>,
        config: WorldConfig,
        options: &KernelOptions,
    ) -> Self {
        let config = config.normalized();
        World {
            id,
            name,
            tags,
            frame_count: 0,
            tick: 0,
            paused: false,
            entities: EntityTable::new(config.initial_entity_capacity, config.initial_free_id_capacity, config.growth_policy),
            pools: PoolMap::with_capacity(config.initial_pool_buckets),
            hooks: HookRegistry::new(),
            singletons: AHashMap::default(),
            context: ContextRegistry::new(),
            binder: BinderRouter::new(),
            bus: MessageBus::new(),
            worker: Worker::new(),
            external: ExternalCommandQueue::new(),
            filter_cache: FilterCache::new(),
            runner: SystemRunner::new(),
            write_phase: WritePhase::None,
            formatters: crate::snapshot::FormatterRegistry::new(),
            singleton_formatters: crate::snapshot::SingletonFormatterRegistry::new(),
            migrations: crate::snapshot::MigrationRegistry::new(),
            config,
            write_failure_policy: options.write_failure_policy,
            logger: options.logger.clone(),
            error_report_hook: options.error_report_hook.clone(),
            last_write_error: None,
        }
    }

    // -- identity / lifecycle -------------------------------------------------------------

    pub fn id(&self) -> WorldId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub(crate) fn write_failure_policy(&self) -> WriteFailurePolicy {
        self.write_failure_policy
    }

    pub fn register_binder(&mut self, binder: Box<dyn BinderDispatcher>) {
        self.binder.register(binder);
    }

    /// Registers `T`'s pool up front, so later boxed/external writes (which have no static `T`
    /// to construct a pool from) can find it.
    pub fn register_component<T: Component>(&mut self) {
        self.pools.register::<T>();
    }

    // -- permission & validation hooks ----------------------------------------------------------

    /// Registers a write-permission predicate, AND-aggregated with every other one already
    /// registered (§4.4 write gate step 3).
    pub fn register_write_permission<F>(&mut self, predicate: F)
    where
        F: Fn(Entity, TypeId) -> bool + Send + Sync + 'static,
    {
        self.hooks.register_write_permission(predicate);
    }

    /// Registers a read-permission predicate, AND-aggregated with every other one already
    /// registered.
    pub fn register_read_permission<F>(&mut self, predicate: F)
    where
        F: Fn(Entity, TypeId) -> bool + Send + Sync + 'static,
    {
        self.hooks.register_read_permission(predicate);
    }

    /// Registers a validator run against the boxed value of every add/replace, regardless of
    /// type (§4.4 write gate step 4).
    pub fn register_object_validator<F>(&mut self, validator: F)
    where
        F: Fn(&dyn Any) -> bool + Send + Sync + 'static,
    {
        self.hooks.register_object_validator(validator);
    }

    /// Registers a validator run only against add/replace operations on `T`, before object
    /// validators (§4.4 write gate step 4: "typed validators, then object validators").
    pub fn register_typed_validator<T, F>(&mut self, validator: F)
    where
        T: 'static,
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.hooks.register_typed_validator::<T, F>(validator);
    }

    /// `true` iff every registered read-permission predicate allows reading `T` on `entity`.
    ///
    /// Not consulted by `read`/`try_get`/`get_mut`, which stay an ungated fast path (§9); this is
    /// for host code that wants to gate its own boundary-crossing reads (exposing a component to
    /// a network client, a save-game export, an editor inspector) before it happens.
    pub fn can_read<T: Component>(&self, entity: Entity) -> bool {
        self.hooks.can_read(entity, TypeId::of::<T>())
    }

    // -- entity API -------------------------------------------------------------------------

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    pub fn all_entities(&self) -> Vec<Entity> {
        self.entities.all_entities()
    }

    pub fn alive_count(&self) -> usize {
        self.entities.alive_count()
    }

    pub fn generation_of(&self, id: Index) -> u32 {
        self.entities.generation_of(id)
    }

    // -- component API (direct, ungated fast path; see §9 "fast path... to avoid map lookups") --

    pub fn has<T: Component>(&self, entity: Entity) -> bool {
        self.pools.get::<T>().map_or(false, |p| p.has(entity.id()))
    }

    pub fn read<T: Component>(&self, entity: Entity) -> Result<&T> {
        self.pools
            .get::<T>()
            .ok_or_else(|| Error::not_found(format!("no pool registered for {}", std::any::type_name::<T>())))?
            .get(entity.id())
    }

    pub fn try_get<T: Component>(&self, entity: Entity) -> Option<&T> {
        self.pools.get::<T>().and_then(|p| p.try_get(entity.id()))
    }

    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> Result<&mut T> {
        self.pools
            .get_mut::<T>()
            .ok_or_else(|| Error::not_found(format!("no pool registered for {}", std::any::type_name::<T>())))?
            .get_mut(entity.id())
    }

    // -- singleton API ------------------------------------------------------------------------

    pub fn singleton<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.singletons.get(&TypeId::of::<T>()).and_then(|v| v.downcast_ref::<T>())
    }

    // -- query API ----------------------------------------------------------------------------

    /// Runs a query for tuple type `Q` with an optional composite filter. Takes `&mut self`
    /// because an unresolved filter must register its pools first; plain `query::<(T,)>(None)`
    /// never mutates anything.
    pub fn query<Q: QueryTuple>(&mut self, filter: Option<Filter>) -> QueryIter<'_, Q> {
        let resolved = filter.map(|f| self.filter_cache.resolve(&f, &mut self.pools));
        QueryIter::new(&self.pools, &self.entities, resolved)
    }

    // -- message API --------------------------------------------------------------------------

    pub fn subscribe<T, F>(&mut self, handler: F) -> Subscription
    where
        T: Message,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.bus.subscribe(handler)
    }

    pub fn unsubscribe(&mut self, subscription: Subscription) {
        self.bus.unsubscribe(subscription);
    }

    pub fn publish<T: Message>(&self, value: T) -> Result<()> {
        self.bus.publish(value)
    }

    // -- context API --------------------------------------------------------------------------

    pub fn set_context<T: Send + Sync + 'static>(&mut self, entity: Entity, value: T) {
        self.context.set(entity.id(), value);
    }

    pub fn get_context<T: Send + Sync + 'static>(&self, entity: Entity) -> Option<&T> {
        self.context.get(entity.id())
    }

    pub fn remove_context<T: Send + Sync + 'static>(&mut self, entity: Entity) -> bool {
        self.context.remove(entity.id())
    }

    // -- systems API --------------------------------------------------------------------------

    pub fn add_system(&mut self, name: impl Into<String>, kind: SystemKind, order: Vec<Order>) {
        self.runner.add_system(name, kind, order);
    }

    pub fn remove_system(&mut self, name: impl Into<String>) {
        self.runner.remove_system(name);
    }

    pub fn try_get_system(&self, name: &str) -> Option<&SystemEntry> {
        self.runner.try_get(name)
    }

    pub fn all_systems(&self) -> impl Iterator<Item = &SystemEntry> {
        self.runner.all_systems()
    }

    pub fn set_system_enabled(&mut self, name: &str, enabled: bool) -> bool {
        self.runner.set_enabled(name, enabled)
    }

    pub fn is_system_enabled(&self, name: &str) -> Option<bool> {
        self.runner.is_enabled(name)
    }

    // -- frame dispatch -------------------------------------------------------------------------

    /// Applies queued system add/remove requests, then runs every variable-kind system in
    /// topological order with `dt`. Sets the write phase to `Simulation` for the duration (§4.6
    /// step 1: structural writes allowed).
    pub fn begin_frame(&mut self, dt: f32) {
        self.runner.apply_pending();
        self.write_phase = WritePhase::Simulation;

        self.dispatch_group(SystemGroup::Frame, |kind, world| match kind {
            SystemKind::FrameSetup(s) => s.setup(world, dt),
            SystemKind::VariableRun(s) => s.run(world, dt),
            _ => unreachable!("Frame group only holds FrameSetup/VariableRun"),
        });

        self.frame_count += 1;
    }

    /// Runs every fixed-setup then fixed-run system in topological order with `fixed_dt`, then
    /// clears the write phase, flushes the external command queue, and drains scheduled jobs
    /// (§4.6 step 2).
    pub fn fixed_step(&mut self, fixed_dt: f32) {
        self.write_phase = WritePhase::Simulation;

        self.dispatch_group(SystemGroup::Fixed, |kind, world| match kind {
            SystemKind::FixedSetup(s) => s.setup(world),
            SystemKind::FixedRun(s) => s.run(world, fixed_dt),
            _ => unreachable!("Fixed group only holds FixedSetup/FixedRun"),
        });

        self.write_phase = WritePhase::None;
        if let Err(e) = self.flush_external() {
            self.report_error(&e);
        }
        self.run_scheduled_jobs();
        self.tick += 1;
    }

    /// Runs every presentation system with interpolation factor `alpha`, under
    /// `WritePhase::Presentation` (structural writes denied, replaces allowed) (§4.6 step 3).
    pub fn late_frame(&mut self, _dt: f32, alpha: f32) {
        self.write_phase = WritePhase::Presentation;

        self.dispatch_group(SystemGroup::FrameView, |kind, world| match kind {
            SystemKind::Presentation(s) => s.run(world, alpha),
            _ => unreachable!("FrameView group only holds Presentation"),
        });

        self.write_phase = WritePhase::None;
    }

    /// Runs every enabled, topologically-sorted system in `group` through `invoke`, reporting
    /// (not propagating) a cyclic-dependency failure: the group is skipped with a warning rather
    /// than aborting the frame (§4.7 "a cyclic dependency is fatal to the group").
    fn dispatch_group(&mut self, group: SystemGroup, invoke: impl Fn(&mut SystemKind, &mut World)) {
        let order = match self.runner.sorted_group(group) {
            Ok(order) => order,
            Err(e) => {
                self.logger.warn(&e.message());
                return;
            }
        };
        for index in order {
            let mut kind = std::mem::replace(self.runner.kind_mut(index), SystemKind::placeholder());
            invoke(&mut kind, self);
            *self.runner.kind_mut(index) = kind;
        }
    }

    // -- write path ---------------------------------------------------------------------------

    /// Begins a command buffer scope. Applies at `end_write()` or when the returned value drops.
    pub fn begin_write(&mut self) -> CommandBuffer<'_> {
        CommandBuffer::new(self)
    }

    /// Schedules `job` to run on the next drain (`run_scheduled_jobs`, called at every
    /// command-buffer barrier and after each fixed step). `Worker::schedule` only needs `&self`
    /// (it pushes onto a lock-free queue), so this can be called from inside a running job too.
    pub fn schedule<F>(&self, job: F)
    where
        F: FnOnce(&mut World) + Send + 'static,
    {
        self.worker.schedule(job);
    }

    /// Drains the worker's job queue, one job at a time, so a job that calls `world.schedule`
    /// pushes onto this same queue and is picked up before the drain ends — unlike swapping the
    /// whole `Worker` out, which would send that nested job into a queue about to be discarded.
    /// Returns the number of jobs run.
    pub fn run_scheduled_jobs(&mut self) -> u32 {
        let mut count = 0;
        while let Some(job) = self.worker.pop_job() {
            job(self);
            count += 1;
        }
        count
    }

    pub fn external_command_enqueue(&self, command: ExternalCommand) {
        self.external.enqueue(command);
    }

    pub fn external_command_count(&self) -> usize {
        self.external.count()
    }

    pub fn external_command_clear(&self) {
        self.external.clear();
    }

    /// Drains the external command queue into a fresh command buffer, applies it, and drains
    /// scheduled jobs (§4.5: "the only sanctioned path to apply externally originated mutations").
    pub fn flush_external(&mut self) -> Result<()> {
        let commands = self.external.drain();
        let mut cb = self.begin_write();
        for command in commands {
            match command {
                ExternalCommand::DestroyEntity(e) => cb.destroy_entity(e),
                ExternalCommand::AddComponent { entity, type_id, value } => {
                    cb.add_component_boxed(entity, type_id, value)
                }
                ExternalCommand::ReplaceComponent { entity, type_id, value } => {
                    cb.replace_component_boxed(entity, type_id, value)
                }
                ExternalCommand::RemoveComponent { entity, type_id } => {
                    cb.remove_component_boxed(entity, type_id)
                }
            }
        }
        cb.end_write()
    }

    // -- snapshot API ---------------------------------------------------------------------------

    pub fn save_full<W: IoWrite>(&self, writer: W) -> Result<()> {
        snapshot::save_full(self, writer)
    }

    pub fn load_full<R: IoRead>(&mut self, reader: R) -> Result<()> {
        snapshot::load_full(self, reader)
    }

    /// Registers the default `serde`-backed formatter for `T`, used by `save_full`/`load_full` to
    /// (de)serialize its pool's payload bytes.
    #[cfg(feature = "serde")]
    pub fn register_formatter<T>(&mut self)
    where
        T: Component + serde::Serialize + serde::de::DeserializeOwned,
    {
        self.formatters.register::<T>();
    }

    /// Registers a custom formatter for `T`, bypassing the `serde` default.
    pub fn register_formatter_with<T: Component>(&mut self, formatter: impl snapshot::ComponentFormatter + 'static) {
        self.formatters.register_with::<T>(formatter);
    }

    /// Registers the default `serde`-backed formatter for singleton type `T`, saved under
    /// `stable_id`. Singleton types aren't `Component`s, so `save_full`/`load_full` have no
    /// `T::stable_id()` to fall back on; the caller supplies one, same convention as `Component`.
    #[cfg(feature = "serde")]
    pub fn register_singleton_formatter<T>(&mut self, stable_id: impl Into<String>)
    where
        T: serde::Serialize + serde::de::DeserializeOwned + Send + Sync + 'static,
    {
        self.singleton_formatters.register::<T>(stable_id);
    }

    /// Registers a custom formatter for singleton type `T`, bypassing the `serde` default.
    pub fn register_singleton_formatter_with<T: Send + Sync + 'static>(
        &mut self,
        stable_id: impl Into<String>,
        formatter: impl snapshot::ComponentFormatter + 'static,
    ) {
        self.singleton_formatters.register_with::<T>(stable_id, formatter);
    }

    /// Registers a post-load migration, run by `load_full` once every pool has been restored, in
    /// ascending `order`.
    pub fn register_post_load_migration(&mut self, order: i64, migration: impl Fn(&mut World) + Send + Sync + 'static) {
        self.migrations.register(order, migration);
    }

    pub(crate) fn run_post_load_migrations(&mut self) {
        let migrations = std::mem::take(&mut self.migrations);
        migrations.run_all(self);
        self.migrations = migrations;
    }

    // -- reset API ------------------------------------------------------------------------------

    /// Resets entities, pools, singletons, context, and filter cache to empty. Per the open
    /// question in §9, resolved filters must be re-obtained after a reset.
    pub fn reset(&mut self, keep_capacity: bool) {
        self.write_phase = WritePhase::Reset;
        self.entities.reset(keep_capacity);
        self.pools.clear_all();
        self.singletons.clear();
        self.context.clear_all();
        self.filter_cache.invalidate();
        self.write_phase = WritePhase::None;
    }

    // -- internal: called by CommandBuffer / Worker ------------------------------------------

    pub(crate) fn destroy_entity_now(&mut self, entity: Entity) {
        if !self.entities.is_alive(entity) {
            return;
        }
        // Ordering guarantee (§4.1): singleton clear -> binder notify -> context clear ->
        // component removal -> alive/gen update.
        // Singleton values aren't entity-scoped in this design, so there's nothing to clear
        // here; the step is a no-op placeholder preserving the documented sequence.
        self.binder.notify_entity_destroyed(entity);
        self.context.clear_for_entity(entity.id());
        self.pools.remove_all_for(entity.id());
        self.entities.destroy(entity);
    }

    pub(crate) fn apply_boxed_write(
        &mut self,
        entity: Entity,
        type_id: TypeId,
        op: GatedOp,
        value: Option<Box<dyn Any + Send + Sync>>,
        make_pool: Option<fn() -> Box<dyn AnyPool>>,
    ) -> Result<()> {
        let id = entity.id();
        match op {
            GatedOp::Add => {
                let pool = match make_pool {
                    Some(make) => self.pools.get_or_register_dyn(type_id, make),
                    None => self
                        .pools
                        .get_dyn_mut(type_id)
                        .ok_or_else(|| Error::invalid_operation("add_component: pool not registered for this type"))?,
                };
                pool.add_any(id, value.expect("Add always carries a value"))
            }
            GatedOp::Replace => {
                let pool = self
                    .pools
                    .get_dyn_mut(type_id)
                    .ok_or_else(|| Error::invalid_operation("replace_component: missing component"))?;
                pool.replace_any(id, value.expect("Replace always carries a value"))
            }
            GatedOp::Remove => {
                let pool = self
                    .pools
                    .get_dyn_mut(type_id)
                    .ok_or_else(|| Error::invalid_operation("remove_component: missing component"))?;
                if pool.remove_any(id) {
                    Ok(())
                } else {
                    Err(Error::invalid_operation("remove_component: missing component"))
                }
            }
        }
    }

    pub(crate) fn take_last_write_error(&mut self) -> Option<Error> {
        self.last_write_error.take()
    }

    pub(crate) fn record_write_error(&mut self, e: Error) {
        self.report_error(&e);
        if self.last_write_error.is_none() {
            self.last_write_error = Some(e);
        }
    }

    pub(crate) fn report_write_denied(&mut self, entity: Entity, type_id: TypeId, op: GatedOp) {
        let verb = match op {
            GatedOp::Add => "add",
            GatedOp::Replace => "replace",
            GatedOp::Remove => "remove",
        };
        let e = Error::invalid_operation(format!(
            "world.{}: write denied on {}<{:?}> for entity (id={}, gen={})",
            self.id.0,
            verb,
            type_id,
            entity.id(),
            entity.generation()
        ));
        self.logger.warn(&e.message());
        self.record_write_error(e);
    }

    pub(crate) fn report_error(&self, e: &Error) {
        self.logger.error(&e.message());
        if let Some(hook) = &self.error_report_hook {
            hook(e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorldConfig;

    #[derive(Clone, Default, Debug, PartialEq)]
    struct Position(f32, f32);
    impl Component for Position {}

    #[test]
    fn reset_clears_entities_and_pools() {
        let mut world = World::new(WorldConfig::default());
        let mut cb = world.begin_write();
        let e = cb.create_entity();
        cb.add_component(e, Position(1.0, 2.0));
        cb.end_write().unwrap();
        assert_eq!(world.alive_count(), 1);

        world.reset(true);
        assert_eq!(world.alive_count(), 0);
        assert!(!world.has::<Position>(e));
    }

    #[test]
    fn query_via_world() {
        let mut world = World::new(WorldConfig::default());
        let mut cb = world.begin_write();
        let e1 = cb.create_entity();
        cb.add_component(e1, Position(1.0, 0.0));
        let e2 = cb.create_entity();
        cb.add_component(e2, Position(2.0, 0.0));
        cb.end_write().unwrap();

        let results: Vec<_> = world.query::<(Position,)>(None).collect();
        assert_eq!(results.len(), 2);
    }
}
