//! Process-wide and per-world configuration.

use std::sync::Arc;

use crate::logger::{NullLogger, SharedLogger};

/// How an array-backed store grows when an index beyond its current capacity is requested.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GrowthPolicy {
    /// Doubling growth (see [`crate::entity::compute_new_capacity`]): doubles from `max(16,
    /// current)` until large enough, with a minimum step of 256.
    Doubling,
    /// Round up to the next multiple of `growth_step` (clamped to at least 32).
    Step {
        /// The additive step. Clamped to `>= 32` when used.
        growth_step: u32,
    },
}

impl Default for GrowthPolicy {
    fn default() -> Self {
        GrowthPolicy::Doubling
    }
}

/// What happens when a command-buffer write operation is denied by a hook or validator.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub enum WriteFailurePolicy {
    /// Raise the failure as a recoverable [`crate::error::Error`] to the caller.
    Throw,
    /// Emit a warning through the configured [`crate::logger::Logger`] and drop the operation.
    #[default]
    Log,
    /// Drop the operation without reporting anything.
    Ignore,
}

/// Per-world sizing and growth configuration.
///
/// All fields are clamped to sane minimums on construction so a misconfigured host can't wedge
/// the allocator into a degenerate state.
#[derive(Clone, Debug)]
pub struct WorldConfig {
    /// Initial size of the entity table's alive/generation arrays. Clamped to `>= 16`.
    pub initial_entity_capacity: u32,
    /// Initial bucket count for the component-type-to-pool map. Clamped to `>= 16`.
    pub initial_pool_buckets: u32,
    /// Initial preallocated capacity of the free-id stack. Clamped to `>= 16`.
    pub initial_free_id_capacity: u32,
    /// Capacity growth policy for the entity table.
    pub growth_policy: GrowthPolicy,
}

impl WorldConfig {
    /// Clamps every field to its documented minimum and normalizes nested policy values.
    pub fn normalized(mut self) -> Self {
        self.initial_entity_capacity = self.initial_entity_capacity.max(16);
        self.initial_pool_buckets = self.initial_pool_buckets.max(16);
        self.initial_free_id_capacity = self.initial_free_id_capacity.max(16);
        if let GrowthPolicy::Step { growth_step } = &mut self.growth_policy {
            *growth_step = (*growth_step).max(32);
        }
        self
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        WorldConfig {
            initial_entity_capacity: 256,
            initial_pool_buckets: 256,
            initial_free_id_capacity: 128,
            growth_policy: GrowthPolicy::Doubling,
        }
        .normalized()
    }
}

/// Hook invoked when a system raises an error during dispatch; the runner catches the failure,
/// calls this hook, and continues with the remaining systems.
pub type ErrorReportHook = Arc<dyn Fn(&crate::error::Error) + Send + Sync>;

/// Process-wide options supplied once, at kernel construction.
///
/// Exposed back out only through read-only accessors on [`crate::kernel::Kernel`] — never as a
/// mutable global, so the process-wide policy can't drift from under worlds mid-frame.
#[derive(Clone)]
pub struct KernelOptions {
    /// What to do when a command-buffer write is denied.
    pub write_failure_policy: WriteFailurePolicy,
    /// Sink for host-visible diagnostics.
    pub logger: SharedLogger,
    /// Called with the error whenever a system raises during dispatch.
    pub error_report_hook: Option<ErrorReportHook>,
}

impl Default for KernelOptions {
    fn default() -> Self {
        KernelOptions {
            write_failure_policy: WriteFailurePolicy::default(),
            logger: SharedLogger::new(NullLogger),
            error_report_hook: None,
        }
    }
}
