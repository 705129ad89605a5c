//! External command queue: the sanctioned path for cross-boundary mutations (network, UI, editor
//! tooling) to reach the world.
//!
//! Grounded on the same `crossbeam::queue::SegQueue` pattern as `world/lazy.rs`'s `LazyUpdate`,
//! but storing plain data (`ExternalCommand`) rather than closures — external callers don't get
//! to run arbitrary code inside the world, only the fixed set of operations below (§4.5).

use std::any::{Any, TypeId};

use crossbeam_queue::SegQueue;

use crate::entity::Entity;

/// A boxed component value plus its type, for external operations that can't name `T` generically.
pub type BoxedComponent = Box<dyn Any + Send + Sync>;

/// One cross-boundary mutation request.
pub enum ExternalCommand {
    DestroyEntity(Entity),
    AddComponent { entity: Entity, type_id: TypeId, value: BoxedComponent },
    ReplaceComponent { entity: Entity, type_id: TypeId, value: BoxedComponent },
    RemoveComponent { entity: Entity, type_id: TypeId },
}

/// FIFO queue of externally originated commands, translated into command-buffer operations on
/// `flush_external` (the only sanctioned path to apply them, per §4.5).
#[derive(Default)]
pub struct ExternalCommandQueue {
    queue: SegQueue<ExternalCommand>,
}

impl ExternalCommandQueue {
    pub fn new() -> Self {
        ExternalCommandQueue::default()
    }

    pub fn enqueue(&self, command: ExternalCommand) {
        self.queue.push(command);
    }

    /// Number of commands currently queued.
    pub fn count(&self) -> usize {
        self.queue.len()
    }

    /// Drops every queued command without applying them.
    pub fn clear(&self) {
        while self.queue.pop().is_some() {}
    }

    /// Drains the queue in FIFO order, in one pass — used by `flush_external` to hand commands
    /// off to a fresh command buffer.
    pub(crate) fn drain(&self) -> Vec<ExternalCommand> {
        let mut out = Vec::with_capacity(self.queue.len());
        while let Some(cmd) = self.queue.pop() {
            out.push(cmd);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_count_clear() {
        let q = ExternalCommandQueue::new();
        q.enqueue(ExternalCommand::DestroyEntity(Entity::new(1, 0)));
        q.enqueue(ExternalCommand::DestroyEntity(Entity::new(2, 0)));
        assert_eq!(q.count(), 2);
        q.clear();
        assert_eq!(q.count(), 0);
    }

    #[test]
    fn drain_is_fifo_and_empties_queue() {
        let q = ExternalCommandQueue::new();
        q.enqueue(ExternalCommand::DestroyEntity(Entity::new(1, 0)));
        q.enqueue(ExternalCommand::DestroyEntity(Entity::new(2, 0)));
        let drained = q.drain();
        assert_eq!(drained.len(), 2);
        match &drained[0] {
            ExternalCommand::DestroyEntity(e) => assert_eq!(e.id(), 1),
            _ => panic!("unexpected variant"),
        }
        assert_eq!(q.count(), 0);
    }
}
