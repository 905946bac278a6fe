//! Fixed-size sets of workers the scheduler dispatches frames to.
//!
//! A pool only moves messages: requests go in through [`WorkerPool::dispatch`], results and
//! closures come back as [`WorkerEvent`]s on the channel returned when the pool is spawned. Which
//! worker gets the next request is decided by a [`policy::SchedulingPolicy`].

/// Framing between the master and process workers.
pub mod ipc;
/// Worker selection strategies.
pub mod policy;
/// Child-process workers re-invoking this binary.
pub mod process;
/// Deterministic pool for tests.
pub mod scripted;
/// In-process worker threads.
pub mod thread;

use std::time::Duration;

use crate::foundation::core::{FrameRequest, FrameResult, WorkerId};
use crate::foundation::error::ReelResult;

pub use policy::{LeastLoaded, RandomPick, RoundRobin, SchedulingPolicy, WorkerLoad, policy_for};
pub use process::{ProcessWorkerPool, WorkerCommand};
pub use scripted::{PoolCall, ScriptedPool};
pub use thread::ThreadWorkerPool;

/// Message from a worker to the scheduler.
#[derive(Debug)]
pub enum WorkerEvent {
    Completed {
        worker: WorkerId,
        result: FrameResult,
    },
    /// The worker's channel closed. It will not produce further results.
    Closed { worker: WorkerId, reason: String },
}

/// Handles to a fixed set of workers.
pub trait WorkerPool: Send {
    /// Number of workers spawned, live or not.
    fn size(&self) -> usize;
    /// Send `req` to `worker`. An error means the worker can no longer receive requests.
    fn dispatch(&mut self, worker: WorkerId, req: FrameRequest) -> ReelResult<()>;
    /// Close every worker's input so workers exit once their current frame is done. Idempotent.
    fn begin_teardown(&mut self) -> ReelResult<()>;
    /// Wait up to `timeout` for every worker to exit; `Ok(true)` once all have.
    fn await_teardown(&mut self, timeout: Duration) -> ReelResult<bool>;
    /// Terminate every worker that is still running.
    fn kill(&mut self) -> ReelResult<()>;
}

/// Poll `done` until it holds or `timeout` elapses.
pub(crate) fn poll_until(
    timeout: Duration,
    mut done: impl FnMut() -> ReelResult<bool>,
) -> ReelResult<bool> {
    const TICK: Duration = Duration::from_millis(10);
    let deadline = std::time::Instant::now() + timeout;
    loop {
        if done()? {
            return Ok(true);
        }
        let now = std::time::Instant::now();
        if now >= deadline {
            return Ok(false);
        }
        std::thread::sleep(TICK.min(deadline - now));
    }
}
