//! System trait family and group ordering metadata.
//!
//! No direct teacher analogue for the run-kind split (the teacher's `System<'a>` trait is a
//! single `fn run(&mut self, data: Self::SystemData)` dispatched by `shred::Dispatcher`, which we
//! dropped — see `DESIGN.md`). The registration/topological-sort shape below is new per
//! `SPEC_FULL.md` §4.6, written in the teacher's plain-trait-object registry style.

use crate::error::{Error, Result};
use crate::world::World;

/// Which group a system belongs to, governing when the runner invokes it.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SystemGroup {
    /// Deterministic simulation group, run every fixed step.
    Fixed,
    /// Variable-dt group, run once per frame in `begin_frame`.
    Frame,
    /// Presentation group, run once per frame in `late_frame` with an interpolation factor.
    FrameView,
}

/// A named ordering constraint relative to another system, by its registered name.
#[derive(Clone, Debug)]
pub enum Order {
    Before(String),
    After(String),
}

/// One of the run-kind interfaces a system implements. A system may implement more than one by
/// registering multiple `SystemSlot`s under the same name, but in practice each `System` impl
/// picks the single kind matching its group.
pub trait FixedSetup: Send {
    fn setup(&mut self, world: &mut World);
}

pub trait FixedRun: Send {
    fn run(&mut self, world: &mut World, fixed_dt: f32);
}

pub trait FrameSetup: Send {
    fn setup(&mut self, world: &mut World, dt: f32);
}

pub trait VariableRun: Send {
    fn run(&mut self, world: &mut World, dt: f32);
}

pub trait Presentation: Send {
    fn run(&mut self, world: &mut World, alpha: f32);
}

/// Type-erased system payload. Exactly one variant per registered system, selected by which
/// run-kind trait the caller implemented.
pub enum SystemKind {
    FixedSetup(Box<dyn FixedSetup>),
    FixedRun(Box<dyn FixedRun>),
    FrameSetup(Box<dyn FrameSetup>),
    VariableRun(Box<dyn VariableRun>),
    Presentation(Box<dyn Presentation>),
}

impl SystemKind {
    fn group(&self) -> SystemGroup {
        match self {
            SystemKind::FixedSetup(_) | SystemKind::FixedRun(_) => SystemGroup::Fixed,
            SystemKind::FrameSetup(_) | SystemKind::VariableRun(_) => SystemGroup::Frame,
            SystemKind::Presentation(_) => SystemGroup::FrameView,
        }
    }

    /// A transient stand-in used while a system's real `SystemKind` is on loan to the dispatcher
    /// (`World::dispatch_group` swaps it out to get a `&mut World` alongside `&mut dyn Trait`, and
    /// swaps the real one back before the next system runs).
    pub(crate) fn placeholder() -> Self {
        struct Noop;
        impl FixedRun for Noop {
            fn run(&mut self, _world: &mut World, _fixed_dt: f32) {}
        }
        SystemKind::FixedRun(Box::new(Noop))
    }
}

/// A registered system plus its ordering metadata.
pub struct SystemEntry {
    pub name: String,
    pub enabled: bool,
    kind: SystemKind,
    order: Vec<Order>,
    registration_index: u64,
}

/// Holds every registered system and computes dispatch order per group.
///
/// Registration (`add_system`/`remove_system`) is queued: it takes effect only at the next
/// `begin_frame` boundary (§4.6), so a system can safely add/remove systems from within its own
/// `run` without perturbing the in-progress dispatch.
#[derive(Default)]
pub struct SystemRunner {
    systems: Vec<SystemEntry>,
    next_registration_index: u64,
    pending_add: Vec<SystemEntry>,
    pending_remove: Vec<String>,
}

impl SystemRunner {
    pub fn new() -> Self {
        SystemRunner::default()
    }

    /// Queues `kind` for registration under `name`, taking effect at the next `begin_frame`.
    pub fn add_system(&mut self, name: impl Into<String>, kind: SystemKind, order: Vec<Order>) {
        let registration_index = self.next_registration_index;
        self.next_registration_index += 1;
        self.pending_add.push(SystemEntry {
            name: name.into(),
            enabled: true,
            kind,
            order,
            registration_index,
        });
    }

    /// Queues `name` for removal, taking effect at the next `begin_frame`.
    pub fn remove_system(&mut self, name: impl Into<String>) {
        self.pending_remove.push(name.into());
    }

    pub fn try_get(&self, name: &str) -> Option<&SystemEntry> {
        self.systems.iter().find(|s| s.name == name)
    }

    pub fn all_systems(&self) -> impl Iterator<Item = &SystemEntry> {
        self.systems.iter()
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        if let Some(s) = self.systems.iter_mut().find(|s| s.name == name) {
            s.enabled = enabled;
            true
        } else {
            false
        }
    }

    pub fn is_enabled(&self, name: &str) -> Option<bool> {
        self.try_get(name).map(|s| s.enabled)
    }

    /// Applies queued add/remove requests. Called at the start of `begin_frame`.
    pub fn apply_pending(&mut self) {
        if !self.pending_remove.is_empty() {
            let remove = std::mem::take(&mut self.pending_remove);
            self.systems.retain(|s| !remove.contains(&s.name));
        }
        self.systems.append(&mut self.pending_add);
    }

    /// Topologically sorts `group`'s enabled systems by their `Order` constraints, breaking ties
    /// by stable registration order. Returns indices into `self.systems`, in run order.
    ///
    /// Errs with `DependencyCycle` if the group's constraints are unsatisfiable; callers should
    /// skip the group and warn, per §4.7's "cyclic dependency is fatal to the group".
    pub fn sorted_group(&self, group: SystemGroup) -> Result<Vec<usize>> {
        let indices: Vec<usize> = self
            .systems
            .iter()
            .enumerate()
            .filter(|(_, s)| s.enabled && s.kind.group() == group)
            .map(|(i, _)| i)
            .collect();

        let name_to_idx: std::collections::HashMap<&str, usize> =
            indices.iter().map(|&i| (self.systems[i].name.as_str(), i)).collect();

        // adjacency: edge a -> b means a must run before b
        let mut before: std::collections::HashMap<usize, Vec<usize>> = std::collections::HashMap::new();
        let mut indegree: std::collections::HashMap<usize, usize> = indices.iter().map(|&i| (i, 0)).collect();

        for &i in &indices {
            for constraint in &self.systems[i].order {
                match constraint {
                    Order::Before(other) => {
                        if let Some(&j) = name_to_idx.get(other.as_str()) {
                            before.entry(i).or_default().push(j);
                            *indegree.get_mut(&j).unwrap() += 1;
                        }
                    }
                    Order::After(other) => {
                        if let Some(&j) = name_to_idx.get(other.as_str()) {
                            before.entry(j).or_default().push(i);
                            *indegree.get_mut(&i).unwrap() += 1;
                        }
                    }
                }
            }
        }

        // Kahn's algorithm, ties broken by registration order for determinism.
        let mut ready: std::collections::BinaryHeap<std::cmp::Reverse<(u64, usize)>> = indices
            .iter()
            .filter(|&&i| indegree[&i] == 0)
            .map(|&i| std::cmp::Reverse((self.systems[i].registration_index, i)))
            .collect();

        let mut order = Vec::with_capacity(indices.len());
        while let Some(std::cmp::Reverse((_, i))) = ready.pop() {
            order.push(i);
            if let Some(succs) = before.get(&i) {
                for &j in succs {
                    let d = indegree.get_mut(&j).unwrap();
                    *d -= 1;
                    if *d == 0 {
                        ready.push(std::cmp::Reverse((self.systems[j].registration_index, j)));
                    }
                }
            }
        }

        if order.len() != indices.len() {
            return Err(Error::dependency_cycle(format!(
                "system dependency cycle detected in group {:?}",
                group
            )));
        }

        Ok(order)
    }

    pub(crate) fn kind_mut(&mut self, index: usize) -> &mut SystemKind {
        &mut self.systems[index].kind
    }
}
