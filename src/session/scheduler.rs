use std::collections::BTreeSet;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use crate::config::ShutdownPolicy;
use crate::encode::sink::FrameSink;
use crate::foundation::core::{FrameCount, FrameIndex, FrameRequest, WorkerId};
use crate::foundation::error::{ReelError, ReelResult};
use crate::pool::{SchedulingPolicy, WorkerEvent, WorkerLoad, WorkerPool};
use crate::session::reassembly::{ReassemblyBuffer, SinkWriter};
use crate::session::shutdown::{Clock, ShutdownProtocol, ShutdownReport};

/// Knobs the scheduler needs from a run configuration.
#[derive(Clone, Debug)]
pub struct SchedulerOptions {
    pub frames: FrameCount,
    /// Event wait while the sink is draining.
    pub poll_interval: Duration,
    pub shutdown: ShutdownPolicy,
}

/// A worker whose channel closed mid-run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerClosure {
    pub worker: WorkerId,
    pub reason: String,
    /// Frames it was holding; they are not re-dispatched.
    pub lost: Vec<FrameIndex>,
}

/// Outcome of a run whose frames were all emitted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunReport {
    pub frames: FrameCount,
    pub dispatched: u64,
    pub completed: u64,
    pub closed_workers: Vec<WorkerClosure>,
    pub shutdown: ShutdownReport,
}

struct WorkerSlot {
    live: bool,
    outstanding: BTreeSet<FrameIndex>,
}

/// Master scheduler: dispatches frame requests, reassembles results in order, and feeds the sink.
///
/// Events are handled one at a time to completion (buffer, advance the sink, dispatch the next
/// frame), so none of the scheduler state needs a lock.
pub struct Scheduler<P: WorkerPool> {
    pool: P,
    policy: Box<dyn SchedulingPolicy>,
    opts: SchedulerOptions,
    buffer: ReassemblyBuffer,
    writer: SinkWriter,
    slots: Vec<WorkerSlot>,
    /// Highest index sent so far; dispatch is strictly sequential so this is also the count.
    dispatched: u64,
    completed: u64,
    closed: Vec<WorkerClosure>,
    started: bool,
}

impl<P: WorkerPool> Scheduler<P> {
    pub fn new(pool: P, policy: Box<dyn SchedulingPolicy>, opts: SchedulerOptions) -> Self {
        let slots = (0..pool.size())
            .map(|_| WorkerSlot {
                live: true,
                outstanding: BTreeSet::new(),
            })
            .collect();
        Self {
            buffer: ReassemblyBuffer::new(opts.frames),
            writer: SinkWriter::new(opts.frames),
            pool,
            policy,
            opts,
            slots,
            dispatched: 0,
            completed: 0,
            closed: Vec::new(),
            started: false,
        }
    }

    pub fn pool(&self) -> &P {
        &self.pool
    }

    pub fn into_pool(self) -> P {
        self.pool
    }

    pub fn next_to_emit(&self) -> FrameIndex {
        self.writer.next_to_emit()
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }

    pub fn closed_workers(&self) -> &[WorkerClosure] {
        &self.closed
    }

    /// Every index in `[1, N]` has been sent to some worker.
    pub fn all_dispatched(&self) -> bool {
        self.dispatched >= self.opts.frames.get()
    }

    /// Every index in `[1, N]` has been written to the sink.
    pub fn all_complete(&self) -> bool {
        self.writer.is_complete()
    }

    pub fn live_workers(&self) -> usize {
        self.slots.iter().filter(|s| s.live).count()
    }

    /// Send the initial round: indices `1..=min(W, N)`.
    pub fn start(&mut self) -> ReelResult<()> {
        if self.started {
            return Ok(());
        }
        self.started = true;
        let initial = self.opts.frames.get().min(self.slots.len() as u64);
        for _ in 0..initial {
            self.dispatch_next()?;
        }
        tracing::debug!(
            workers = self.slots.len(),
            frames = self.opts.frames.get(),
            initial,
            "initial round dispatched"
        );
        Ok(())
    }

    /// Handle one worker event to completion.
    pub fn on_event(&mut self, event: WorkerEvent, sink: &mut dyn FrameSink) -> ReelResult<()> {
        match event {
            WorkerEvent::Completed { worker, result } => {
                let idx = result.index;
                if let Some(slot) = self.slots.get_mut(worker.0)
                    && !slot.outstanding.remove(&idx)
                {
                    tracing::debug!(
                        %worker,
                        frame = idx.0,
                        "result for a frame not assigned to this worker"
                    );
                }
                self.buffer.insert(self.writer.next_to_emit(), result)?;
                self.completed += 1;
                tracing::info!(
                    frame = idx.0,
                    completed = self.completed,
                    total = self.opts.frames.get(),
                    "frame complete"
                );

                self.writer.try_advance(&mut self.buffer, sink)?;
                if !self.all_dispatched() {
                    self.dispatch_next()?;
                }
            }
            WorkerEvent::Closed { worker, reason } => {
                self.mark_closed(worker, reason);
                self.refill_idle()?;
            }
        }
        Ok(())
    }

    /// Only a completion triggers the next dispatch, so once a closed worker took every
    /// in-flight frame with it, the idle survivors get one frame each.
    fn refill_idle(&mut self) -> ReelResult<()> {
        if self.slots.iter().any(|s| s.live && !s.outstanding.is_empty()) {
            return Ok(());
        }
        let before = self.dispatched;
        for _ in 0..self.live_workers() {
            if self.all_dispatched() || self.live_workers() == 0 {
                break;
            }
            self.dispatch_next()?;
        }
        if self.dispatched > before {
            tracing::debug!(
                refilled = self.dispatched - before,
                "dispatched to idle workers after a closure"
            );
        }
        Ok(())
    }

    /// Re-run the sink writer, e.g. on a tick while it waits for drain.
    pub fn tick(&mut self, sink: &mut dyn FrameSink) -> ReelResult<usize> {
        self.writer.try_advance(&mut self.buffer, sink)
    }

    /// No frame is in flight on any live worker, no further frame can be dispatched, and the
    /// sink is not waiting to drain, yet not every frame was emitted.
    pub fn is_stalled(&self) -> bool {
        if self.all_complete() || self.writer.is_suspended() {
            return false;
        }
        let in_flight = self
            .slots
            .iter()
            .any(|s| s.live && !s.outstanding.is_empty());
        let can_dispatch = !self.all_dispatched() && self.live_workers() > 0;
        !in_flight && !can_dispatch
    }

    fn stalled_error(&self) -> ReelError {
        let next = self.writer.next_to_emit();
        let lost = (next.0..=self.dispatched)
            .map(FrameIndex)
            .filter(|idx| !self.buffer.contains(*idx))
            .collect();
        ReelError::Stalled {
            next_to_emit: next,
            lost,
        }
    }

    /// Dispatch the next index to a live worker chosen by the policy.
    ///
    /// A failed send marks the worker closed and the request goes to another live worker. With
    /// no live worker left this returns without dispatching; the run then stalls.
    fn dispatch_next(&mut self) -> ReelResult<()> {
        let idx = FrameIndex(self.dispatched + 1);
        if !self.opts.frames.contains(idx) {
            return Ok(());
        }
        let req = FrameRequest::new(idx);

        loop {
            let loads: Vec<WorkerLoad> = self
                .slots
                .iter()
                .enumerate()
                .filter(|(_, s)| s.live)
                .map(|(i, s)| WorkerLoad {
                    worker: WorkerId(i),
                    outstanding: s.outstanding.len(),
                })
                .collect();
            let Some(worker) = self.policy.select(&loads) else {
                tracing::warn!(frame = idx.0, "no live worker to dispatch to");
                return Ok(());
            };
            if !self.slots.get(worker.0).is_some_and(|s| s.live) {
                return Err(ReelError::worker(format!(
                    "scheduling policy chose unavailable {worker}"
                )));
            }

            match self.pool.dispatch(worker, req) {
                Ok(()) => {
                    self.slots[worker.0].outstanding.insert(idx);
                    self.dispatched = idx.0;
                    tracing::trace!(%worker, frame = idx.0, "dispatched");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        %worker,
                        frame = idx.0,
                        error = %e,
                        "dispatch failed; trying another worker"
                    );
                    self.mark_closed(worker, format!("dispatch failed: {e}"));
                }
            }
        }
    }

    fn mark_closed(&mut self, worker: WorkerId, reason: String) {
        let Some(slot) = self.slots.get_mut(worker.0) else {
            return;
        };
        if !slot.live {
            return;
        }
        slot.live = false;
        let lost: Vec<FrameIndex> = std::mem::take(&mut slot.outstanding).into_iter().collect();
        tracing::warn!(
            %worker,
            reason = %reason,
            lost = ?lost.iter().map(|i| i.0).collect::<Vec<_>>(),
            "worker channel closed"
        );
        self.closed.push(WorkerClosure {
            worker,
            reason,
            lost,
        });
    }

    /// Wait for events and process them until every frame is emitted or the run stalls.
    pub fn pump(
        &mut self,
        events: &mpsc::Receiver<WorkerEvent>,
        sink: &mut dyn FrameSink,
    ) -> ReelResult<()> {
        self.start()?;
        loop {
            if self.all_complete() {
                return Ok(());
            }
            if self.is_stalled() {
                return Err(self.stalled_error());
            }

            if self.writer.is_suspended() {
                match events.recv_timeout(self.opts.poll_interval) {
                    Ok(event) => self.on_event(event, sink)?,
                    Err(RecvTimeoutError::Timeout) => {
                        self.tick(sink)?;
                    }
                    Err(RecvTimeoutError::Disconnected) => {
                        // No more results can arrive; only the drain is left to wait for.
                        std::thread::sleep(self.opts.poll_interval);
                        self.tick(sink)?;
                        self.mark_all_closed("event channel disconnected");
                    }
                }
            } else {
                match events.recv() {
                    Ok(event) => self.on_event(event, sink)?,
                    Err(_) => self.mark_all_closed("event channel disconnected"),
                }
            }
        }
    }

    fn mark_all_closed(&mut self, reason: &str) {
        for i in 0..self.slots.len() {
            self.mark_closed(WorkerId(i), reason.to_string());
        }
    }

    /// Run to completion: dispatch, reassemble, emit, then drain and close exactly once.
    ///
    /// The shutdown protocol runs even when the run fails, so the consumer always gets a
    /// finalized stream; the run's own error takes precedence over a shutdown error.
    pub fn run(
        &mut self,
        events: &mpsc::Receiver<WorkerEvent>,
        sink: &mut dyn FrameSink,
        clock: &dyn Clock,
    ) -> ReelResult<RunReport> {
        let outcome = self.pump(events, sink);
        if let Err(e) = &outcome {
            tracing::error!(error = %e, "run failed; closing output");
        }

        let shutdown =
            ShutdownProtocol::new(self.opts.shutdown.clone(), clock).run(sink, &mut self.pool);

        match (outcome, shutdown) {
            (Ok(()), Ok(shutdown)) => Ok(RunReport {
                frames: self.opts.frames,
                dispatched: self.dispatched,
                completed: self.completed,
                closed_workers: self.closed.clone(),
                shutdown,
            }),
            (Ok(()), Err(e)) => Err(e),
            (Err(e), Ok(_)) => Err(e),
            (Err(e), Err(shutdown_err)) => {
                tracing::warn!(error = %shutdown_err, "shutdown after failed run also failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/scheduler.rs"]
mod tests;
