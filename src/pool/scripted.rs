use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::mpsc;
use std::time::Duration;

use crate::foundation::core::{FrameIndex, FrameRequest, FrameResult, WorkerId};
use crate::foundation::error::{ReelError, ReelResult};
use crate::pool::{WorkerEvent, WorkerPool};

/// Every call a [`ScriptedPool`] observed, in call order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PoolCall {
    Dispatch(WorkerId, FrameIndex),
    BeginTeardown,
    AwaitTeardown(bool),
    Kill,
}

/// Deterministic pool for tests: no real workers, results are released on a script.
///
/// A dispatched frame completes immediately unless an arrival order is scripted, in which case
/// results are released strictly in that order as soon as each is dispatched. Payloads are
/// [`ScriptedPool::payload_for`] the index.
pub struct ScriptedPool {
    size: usize,
    events: mpsc::Sender<WorkerEvent>,
    arrival: VecDeque<FrameIndex>,
    held: BTreeMap<FrameIndex, WorkerId>,
    unreachable: BTreeSet<WorkerId>,
    crash_on: BTreeSet<FrameIndex>,
    teardown_script: VecDeque<bool>,
    never_tear_down: bool,
    calls: Vec<PoolCall>,
}

impl ScriptedPool {
    pub fn new(size: usize) -> (Self, mpsc::Receiver<WorkerEvent>) {
        let (events, rx) = mpsc::channel();
        let pool = Self {
            size,
            events,
            arrival: VecDeque::new(),
            held: BTreeMap::new(),
            unreachable: BTreeSet::new(),
            crash_on: BTreeSet::new(),
            teardown_script: VecDeque::new(),
            never_tear_down: false,
            calls: Vec::new(),
        };
        (pool, rx)
    }

    pub fn payload_for(idx: FrameIndex) -> Vec<u8> {
        format!("frame-{idx};").into_bytes()
    }

    /// Release results in exactly this order.
    pub fn arrival_order(mut self, order: impl IntoIterator<Item = u64>) -> Self {
        self.arrival.extend(order.into_iter().map(FrameIndex));
        self
    }

    /// Dispatches to `worker` fail as if its input pipe were broken.
    pub fn unreachable_worker(mut self, worker: WorkerId) -> Self {
        self.unreachable.insert(worker);
        self
    }

    /// The worker that receives `idx` dies instead of answering.
    pub fn crash_on(mut self, idx: u64) -> Self {
        self.crash_on.insert(FrameIndex(idx));
        self
    }

    /// Queue teardown outcomes, consumed one per wait (default `true`).
    pub fn script_teardown(mut self, script: impl IntoIterator<Item = bool>) -> Self {
        self.teardown_script.extend(script);
        self
    }

    /// Workers never exit on their own.
    pub fn never_tear_down(mut self) -> Self {
        self.never_tear_down = true;
        self
    }

    pub fn calls(&self) -> &[PoolCall] {
        &self.calls
    }

    /// `(worker, index)` of every accepted dispatch, in order.
    pub fn dispatched(&self) -> Vec<(WorkerId, FrameIndex)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                PoolCall::Dispatch(w, idx) => Some((*w, *idx)),
                _ => None,
            })
            .collect()
    }

    fn release(&mut self, idx: FrameIndex, worker: WorkerId) {
        let event = if self.crash_on.contains(&idx) {
            self.unreachable.insert(worker);
            WorkerEvent::Closed {
                worker,
                reason: format!("crashed while rendering frame {idx}"),
            }
        } else {
            WorkerEvent::Completed {
                worker,
                result: FrameResult {
                    index: idx,
                    payload: Self::payload_for(idx),
                },
            }
        };
        let _ = self.events.send(event);
    }
}

impl WorkerPool for ScriptedPool {
    fn size(&self) -> usize {
        self.size
    }

    fn dispatch(&mut self, worker: WorkerId, req: FrameRequest) -> ReelResult<()> {
        if worker.0 >= self.size {
            return Err(ReelError::worker(format!("no such worker: {worker}")));
        }
        if self.unreachable.contains(&worker) {
            return Err(ReelError::worker(format!("{worker} has exited")));
        }
        self.calls.push(PoolCall::Dispatch(worker, req.index));

        if !self.arrival.contains(&req.index) {
            self.release(req.index, worker);
            return Ok(());
        }
        self.held.insert(req.index, worker);
        while let Some(next) = self.arrival.front().copied() {
            let Some(holder) = self.held.remove(&next) else {
                break;
            };
            self.arrival.pop_front();
            self.release(next, holder);
        }
        Ok(())
    }

    fn begin_teardown(&mut self) -> ReelResult<()> {
        self.calls.push(PoolCall::BeginTeardown);
        Ok(())
    }

    fn await_teardown(&mut self, _timeout: Duration) -> ReelResult<bool> {
        let done = !self.never_tear_down && self.teardown_script.pop_front().unwrap_or(true);
        self.calls.push(PoolCall::AwaitTeardown(done));
        Ok(done)
    }

    fn kill(&mut self) -> ReelResult<()> {
        self.calls.push(PoolCall::Kill);
        Ok(())
    }
}
