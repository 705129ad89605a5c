//! Pluggable logging sink.
//!
//! The core never assumes a particular logging backend exists; hosts plug in a [`Logger`]. The
//! [`TracingLogger`] adapter forwards to the `log` crate for hosts that already have a
//! subscriber installed. Internal trace-level instrumentation (pool growth, cache invalidation)
//! uses the `log` crate's macros directly and is unrelated to this trait.

use std::fmt;
use std::sync::Arc;

/// Narrow external logging interface. Consumed, not implemented, by the core.
pub trait Logger: Send + Sync {
    /// Informational message.
    fn info(&self, message: &str);
    /// Warning: a recoverable condition the host should know about (e.g. a dropped write).
    fn warn(&self, message: &str);
    /// Error: something failed outright.
    fn error(&self, message: &str);
}

/// Discards everything. The default when no logger is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn info(&self, _message: &str) {}
    fn warn(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
}

/// Forwards to the `log` crate's global logger.
///
/// Convenience only: a host that has already initialized `env_logger`, `fern`, or similar gets
/// ECS diagnostics for free without implementing [`Logger`] itself.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn info(&self, message: &str) {
        log::info!("{}", message);
    }

    fn warn(&self, message: &str) {
        log::warn!("{}", message);
    }

    fn error(&self, message: &str) {
        log::error!("{}", message);
    }
}

/// A shared handle to a [`Logger`], cheap to clone and pass around a world.
#[derive(Clone)]
pub struct SharedLogger(Arc<dyn Logger>);

impl SharedLogger {
    /// Wraps a logger implementation for sharing.
    pub fn new(logger: impl Logger + 'static) -> Self {
        SharedLogger(Arc::new(logger))
    }
}

impl Default for SharedLogger {
    fn default() -> Self {
        SharedLogger::new(NullLogger)
    }
}

impl fmt::Debug for SharedLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedLogger(..)")
    }
}

impl std::ops::Deref for SharedLogger {
    type Target = dyn Logger;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}
