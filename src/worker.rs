//! Scheduler/worker: a deterministic, run-to-completion deferred-job queue.
//!
//! Grounded on `world/lazy.rs`'s `LazyUpdate`, which stores `Box<dyn FnOnce(&mut World)>` jobs in
//! a `crossbeam::queue::SegQueue` and drains them on `maintain()`. This module generalizes that
//! single queue into the named "worker" collaborator from §1/§4.5, drained at every
//! command-buffer barrier.

use crossbeam_queue::SegQueue;

use crate::world::World;

type Job = Box<dyn FnOnce(&mut World) + Send>;

/// FIFO queue of deferred jobs, run to completion on `run_scheduled_jobs`.
///
/// Per §5 ("the scheduler/worker is a deterministic run-to-completion queue, not an async
/// executor"), jobs never suspend; a job may itself schedule further jobs, which run within the
/// same drain call (matching the command buffer's own recursive-apply behavior).
#[derive(Default)]
pub struct Worker {
    jobs: SegQueue<Job>,
}

impl Worker {
    pub fn new() -> Self {
        Worker::default()
    }

    /// Schedules `job` to run on the next drain.
    pub fn schedule<F>(&self, job: F)
    where
        F: FnOnce(&mut World) + Send + 'static,
    {
        self.jobs.push(Box::new(job));
    }

    /// Runs every scheduled job, in FIFO order, including jobs scheduled by jobs already running
    /// in this call. Returns the number of jobs run.
    pub fn run_scheduled_jobs(&self, world: &mut World) -> u32 {
        let mut count = 0;
        while let Some(job) = self.jobs.pop() {
            job(world);
            count += 1;
        }
        count
    }

    /// Pops a single job without running it. `SegQueue::pop` only needs `&self`, which lets
    /// `World::run_scheduled_jobs` drain its own `worker` field one job at a time instead of
    /// swapping the whole queue out — a job that schedules another job pushes onto this same
    /// queue and the loop picks it back up, rather than onto a queue about to be discarded.
    pub(crate) fn pop_job(&self) -> Option<Job> {
        self.jobs.pop()
    }

    /// Number of jobs currently queued, without running them.
    pub fn pending_count(&self) -> usize {
        self.jobs.len()
    }
}
