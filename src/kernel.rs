//! Kernel: owns a registry of worlds and the fixed-step accumulator that drives them.
//!
//! No direct teacher analogue — the teacher is a single-world library with no stepping loop of
//! its own (a host calls `Dispatcher::dispatch` directly). This module is new per `SPEC_FULL.md`
//! §4.7, written in the teacher's plain `AHashMap`-registry style (`storage/storages.rs`'s
//! `HashMapStorage`) rather than anything borrowed from the join/dispatch machinery.

use ahash::AHashMap;

use crate::config::{KernelOptions, WorldConfig, WriteFailurePolicy};
use crate::error::{Error, Result};
use crate::logger::SharedLogger;
use crate::world::{World, WorldId};

/// One registered world plus the metadata the kernel's `find_world_*` family searches by.
struct Slot {
    world: World,
    name: String,
    tags: Vec<String>,
}

/// Owns every world created through it and the shared accumulator driving their fixed steps.
///
/// `create_world` hands back a [`WorldId`] rather than the `World` itself (deviating from the
/// literal "→ World" wording in the surface listing): the kernel must retain the world to step
/// it, so ownership can't also transfer to the caller. Callers reach the world back through
/// `find_world_by_id`/`_by_name`/`_by_tag`. Recorded as an open-question resolution in
/// `DESIGN.md`.
pub struct Kernel {
    worlds: AHashMap<u64, Slot>,
    next_world_id: u64,
    current: Option<WorldId>,
    options: KernelOptions,
    acc: f32,
    disposed: bool,
}

impl Kernel {
    pub fn new(options: KernelOptions) -> Self {
        Kernel {
            worlds: AHashMap::default(),
            next_world_id: 0,
            current: None,
            options,
            acc: 0.0,
            disposed: false,
        }
    }

    pub fn options(&self) -> &KernelOptions {
        &self.options
    }

    pub fn logger(&self) -> &SharedLogger {
        &self.options.logger
    }

    pub fn write_failure_policy(&self) -> WriteFailurePolicy {
        self.options.write_failure_policy
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Creates a new world with `config` (default if `None`), registers it under `name` and
    /// `tags`, and optionally makes it current. Returns its `WorldId`.
    pub fn create_world(
        &mut self,
        config: Option<WorldConfig>,
        name: Option<String>,
        tags: Vec<String>,
        set_current: bool,
    ) -> Result<WorldId> {
        if self.disposed {
            return Err(Error::disposed("kernel is disposed, cannot create a world"));
        }
        let raw_id = self.next_world_id;
        self.next_world_id += 1;
        let id = WorldId(raw_id);
        let name = name.unwrap_or_else(|| format!("world-{}", raw_id));
        let world = World::with_options(id, name.clone(), tags.clone(), config.unwrap_or_default(), &self.options);
        self.worlds.insert(raw_id, Slot { world, name, tags });
        if set_current {
            self.current = Some(id);
        }
        Ok(id)
    }

    /// Removes and drops the world with `id`. Returns `true` iff it existed. If it was current,
    /// the current pointer is cleared.
    pub fn destroy_world(&mut self, id: WorldId) -> bool {
        let existed = self.worlds.remove(&id.0).is_some();
        if existed && self.current == Some(id) {
            self.current = None;
        }
        existed
    }

    pub fn find_world_by_id(&self, id: WorldId) -> Option<&World> {
        self.worlds.get(&id.0).map(|s| &s.world)
    }

    pub fn find_world_by_id_mut(&mut self, id: WorldId) -> Option<&mut World> {
        self.worlds.get_mut(&id.0).map(|s| &mut s.world)
    }

    pub fn find_world_by_name(&self, name: &str) -> Option<&World> {
        self.worlds.values().find(|s| s.name == name).map(|s| &s.world)
    }

    pub fn find_world_by_tag(&self, tag: &str) -> Option<&World> {
        self.worlds.values().find(|s| s.tags.iter().any(|t| t == tag)).map(|s| &s.world)
    }

    pub fn current(&self) -> Option<&World> {
        self.current.and_then(|id| self.find_world_by_id(id))
    }

    pub fn current_mut(&mut self) -> Option<&mut World> {
        match self.current {
            Some(id) => self.find_world_by_id_mut(id),
            None => None,
        }
    }

    /// Sets the current world. No-op (returns `false`) if `id` isn't registered.
    pub fn set_current(&mut self, id: WorldId) -> bool {
        if self.worlds.contains_key(&id.0) {
            self.current = Some(id);
            true
        } else {
            false
        }
    }

    /// Advances every non-paused, non-disposed world by one frame: a variable-dt `begin_frame`,
    /// up to `max_substeps` fixed steps drawn from the kernel-wide accumulator (with a
    /// spiral-of-death guard dropping any excess backlog), then `late_frame` with the resulting
    /// interpolation factor (§4.7 pump algorithm).
    pub fn pump_and_late_frame(&mut self, dt: f32, fixed_dt: f32, max_substeps: u32) {
        if self.disposed {
            return;
        }

        for slot in self.worlds.values_mut() {
            if slot.world.is_paused() {
                continue;
            }
            slot.world.begin_frame(dt);
        }

        self.acc += dt;
        let mut steps = (self.acc / fixed_dt).floor() as u32;
        steps = steps.min(max_substeps);
        self.acc -= steps as f32 * fixed_dt;
        if (self.acc / fixed_dt).floor() as u32 > max_substeps {
            self.acc = 0.0;
        }

        for _ in 0..steps {
            for slot in self.worlds.values_mut() {
                if slot.world.is_paused() {
                    continue;
                }
                slot.world.fixed_step(fixed_dt);
            }
        }

        let alpha = self.acc / fixed_dt;
        for slot in self.worlds.values_mut() {
            if slot.world.is_paused() {
                continue;
            }
            slot.world.late_frame(dt, alpha);
        }
    }

    /// Drops every world and marks the kernel unusable for further world creation or pumping.
    pub fn dispose(&mut self) {
        self.worlds.clear();
        self.current = None;
        self.disposed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_find_world_by_name() {
        let mut kernel = Kernel::new(KernelOptions::default());
        let id = kernel.create_world(None, Some("physics".to_string()), vec!["sim".to_string()], true).unwrap();
        assert!(kernel.find_world_by_id(id).is_some());
        assert!(kernel.find_world_by_name("physics").is_some());
        assert!(kernel.find_world_by_tag("sim").is_some());
        assert_eq!(kernel.current().unwrap().id(), id);
    }

    #[test]
    fn destroy_world_clears_current() {
        let mut kernel = Kernel::new(KernelOptions::default());
        let id = kernel.create_world(None, None, vec![], true).unwrap();
        assert!(kernel.destroy_world(id));
        assert!(kernel.current().is_none());
        assert!(!kernel.destroy_world(id));
    }

    #[test]
    fn dispose_rejects_further_world_creation() {
        let mut kernel = Kernel::new(KernelOptions::default());
        kernel.dispose();
        assert!(kernel.create_world(None, None, vec![], false).is_err());
    }

    // Fixed-step accumulator scenario (§8): fixed_dt=1/60, max_substeps=4, dt sequence
    // [0.5, 0.02, 0.02] should run (4, 1, 1) fixed steps respectively, the first frame's backlog
    // clamped by the spiral-of-death guard (residual accumulator after the clamp is 0).
    #[test]
    fn fixed_step_accumulator_matches_scenario() {
        let fixed_dt = 1.0 / 60.0;
        let mut kernel = Kernel::new(KernelOptions::default());
        let id = kernel.create_world(None, None, vec![], true).unwrap();

        let mut total_fixed_steps = [0u32; 3];
        for (i, dt) in [0.5_f32, 0.02, 0.02].into_iter().enumerate() {
            let before = kernel.find_world_by_id(id).unwrap().tick();
            kernel.pump_and_late_frame(dt, fixed_dt, 4);
            let after = kernel.find_world_by_id(id).unwrap().tick();
            total_fixed_steps[i] = (after - before) as u32;
            if i == 0 {
                // First frame's backlog overflows the clamp check itself, so the
                // spiral-of-death guard drops it entirely rather than leaving a remainder.
                assert_eq!(kernel.acc, 0.0);
            }
        }

        assert_eq!(total_fixed_steps, [4, 1, 1]);
        assert!(kernel.acc >= 0.0 && kernel.acc < fixed_dt);
    }
}
