//! ZenECS: an embeddable Entity-Component-System runtime.
//!
//! A [`Kernel`](kernel::Kernel) owns one or more [`World`](world::World)s and steps them with a
//! fixed-step accumulator. Each world holds a sparse entity table, type-segregated component
//! pools, a composite filter/query engine, a barrier-scoped command buffer for structural writes,
//! and a topologically-ordered system runner.
//!
//! See the [`prelude`] module for the common import set.

mod command;
mod component;
mod config;
mod entity;
mod error;
mod external;
mod filter;
mod hooks;
pub mod kernel;
mod logger;
mod message;
mod query;
pub mod snapshot;
mod storage;
mod system;
mod worker;
pub mod world;

pub use command::CommandBuffer;
pub use component::{AnyPool, Component};
pub use config::{ErrorReportHook, GrowthPolicy, KernelOptions, WorldConfig, WriteFailurePolicy};
pub use entity::{Entity, Index};
pub use error::{Error, ErrorKind, Result};
pub use external::ExternalCommand;
pub use filter::{Bucket, Filter};
pub use hooks::{HookRegistry, WriteKind, WritePhase};
pub use kernel::Kernel;
pub use logger::{Logger, NullLogger, SharedLogger, TracingLogger};
pub use message::{Message, MessageBus, Subscription};
pub use query::{QueryIter, QueryTuple};
pub use snapshot::{ComponentFormatter, FormatterRegistry, SingletonFormatterRegistry};
pub use storage::{Pool, PoolMap};
pub use system::{
    FixedRun, FixedSetup, FrameSetup, Order, Presentation, SystemEntry, SystemGroup, SystemKind, SystemRunner,
    VariableRun,
};
pub use worker::Worker;
pub use world::{World, WorldId};

/// The common import set for embedding a ZenECS runtime.
pub mod prelude {
    pub use crate::{
        kernel::Kernel,
        world::{World, WorldId},
        Component, Entity, Error, ErrorKind, Filter, KernelOptions, Order, Result, SystemGroup, SystemKind,
        WorldConfig, WriteFailurePolicy,
    };
}
