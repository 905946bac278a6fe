use std::time::Duration;

use parking_lot::Mutex;

use crate::config::ShutdownPolicy;
use crate::encode::sink::{FinishStatus, FrameSink};
use crate::foundation::error::ReelResult;
use crate::pool::WorkerPool;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownPhase {
    Running,
    Draining,
    /// The consumer acknowledged close and every worker exited.
    Closed,
    /// Close did not complete within the attempt bound; everything was killed.
    ForceKilled,
}

/// Source of the delay between drain attempts.
pub trait Clock: Send + Sync {
    fn sleep(&self, d: Duration);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn sleep(&self, d: Duration) {
        std::thread::sleep(d);
    }
}

/// Clock that records requested sleeps and returns immediately.
#[derive(Debug, Default)]
pub struct ManualClock {
    slept: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.slept.lock().clone()
    }

    /// Total simulated time spent sleeping.
    pub fn elapsed(&self) -> Duration {
        self.slept.lock().iter().sum()
    }
}

impl Clock for ManualClock {
    fn sleep(&self, d: Duration) {
        self.slept.lock().push(d);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShutdownReport {
    pub phase: ShutdownPhase,
    pub attempts: u32,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.phase == ShutdownPhase::Closed
    }
}

/// Drains and closes the consumer and the worker pool with a bounded number of attempts.
///
/// Each attempt signals end of input, closes worker inputs, then waits up to the finish timeout
/// for the consumer's acknowledgment and for the workers to exit. Failed attempts are separated by
/// the retry delay. Once `max_attempts` attempts have failed, the consumer and the workers are
/// killed. A consumer that exits with failure is not retried: the workers are killed and the sink
/// error is returned.
pub struct ShutdownProtocol<'c> {
    policy: ShutdownPolicy,
    clock: &'c dyn Clock,
    phase: ShutdownPhase,
}

impl<'c> ShutdownProtocol<'c> {
    pub fn new(policy: ShutdownPolicy, clock: &'c dyn Clock) -> Self {
        Self {
            policy,
            clock,
            phase: ShutdownPhase::Running,
        }
    }

    pub fn phase(&self) -> ShutdownPhase {
        self.phase
    }

    #[tracing::instrument(skip_all, fields(max_attempts = self.policy.max_attempts))]
    pub fn run(
        &mut self,
        sink: &mut dyn FrameSink,
        pool: &mut dyn WorkerPool,
    ) -> ReelResult<ShutdownReport> {
        self.phase = ShutdownPhase::Draining;
        let max_attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            sink.end_input()?;
            if let Err(e) = pool.begin_teardown() {
                tracing::warn!(attempt, error = %e, "failed to close worker inputs");
            }

            let finished = match sink.await_finish(self.policy.finish_timeout()) {
                Ok(status) => status == FinishStatus::Finished,
                Err(e) => {
                    if let Err(kill_err) = pool.kill() {
                        tracing::warn!(error = %kill_err, "failed to kill workers");
                    }
                    self.phase = ShutdownPhase::ForceKilled;
                    return Err(e);
                }
            };
            let torn_down = match pool.await_teardown(self.policy.finish_timeout()) {
                Ok(done) => done,
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "worker teardown failed");
                    false
                }
            };

            if finished && torn_down {
                self.phase = ShutdownPhase::Closed;
                tracing::debug!(attempt, "output finalized and workers exited");
                return Ok(ShutdownReport {
                    phase: self.phase,
                    attempts: attempt,
                });
            }

            tracing::warn!(
                attempt,
                max_attempts,
                sink_finished = finished,
                workers_exited = torn_down,
                "shutdown attempt did not complete"
            );
            if attempt < max_attempts {
                self.clock.sleep(self.policy.retry_delay());
            }
        }

        tracing::warn!(max_attempts, "shutdown bound exceeded; killing encoder and workers");
        if let Err(e) = sink.kill() {
            tracing::warn!(error = %e, "failed to kill encoder");
        }
        if let Err(e) = pool.kill() {
            tracing::warn!(error = %e, "failed to kill workers");
        }
        self.phase = ShutdownPhase::ForceKilled;
        Ok(ShutdownReport {
            phase: self.phase,
            attempts: max_attempts,
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/shutdown.rs"]
mod tests;
