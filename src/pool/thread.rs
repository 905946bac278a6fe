use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::foundation::core::{FrameRequest, WorkerId};
use crate::foundation::error::{ReelError, ReelResult};
use crate::pool::{WorkerEvent, WorkerPool, poll_until};
use crate::render::WorkerExecutor;

struct ThreadWorker {
    inbox: Option<mpsc::Sender<FrameRequest>>,
    thread: Option<JoinHandle<()>>,
}

/// Workers hosted as threads of the master process, one channel inbox each.
///
/// Threads cannot be killed: [`WorkerPool::kill`] closes their inboxes and detaches them.
pub struct ThreadWorkerPool {
    workers: Vec<ThreadWorker>,
}

/// Reports the worker as closed when its thread exits for any reason, panics included.
struct ClosedOnExit {
    worker: WorkerId,
    events: mpsc::Sender<WorkerEvent>,
    reason: String,
}

impl Drop for ClosedOnExit {
    fn drop(&mut self) {
        let reason = if std::thread::panicking() {
            "worker thread panicked".to_string()
        } else {
            std::mem::take(&mut self.reason)
        };
        // The scheduler may already be gone during teardown.
        let _ = self.events.send(WorkerEvent::Closed {
            worker: self.worker,
            reason,
        });
    }
}

impl ThreadWorkerPool {
    pub fn spawn(
        size: usize,
        executor: WorkerExecutor,
    ) -> ReelResult<(Self, mpsc::Receiver<WorkerEvent>)> {
        if size == 0 {
            return Err(ReelError::validation("worker pool size must be at least 1"));
        }
        let (events_tx, events_rx) = mpsc::channel();
        let mut workers = Vec::with_capacity(size);

        for i in 0..size {
            let worker = WorkerId(i);
            let (inbox_tx, inbox_rx) = mpsc::channel::<FrameRequest>();
            let events = events_tx.clone();
            let executor = executor.clone();
            let thread = std::thread::Builder::new()
                .name(format!("zoomreel-{worker}"))
                .spawn(move || run_thread_worker(worker, inbox_rx, events, executor))
                .map_err(|e| ReelError::worker(format!("failed to spawn {worker}: {e}")))?;
            workers.push(ThreadWorker {
                inbox: Some(inbox_tx),
                thread: Some(thread),
            });
        }

        tracing::debug!(size, "spawned thread workers");
        Ok((Self { workers }, events_rx))
    }

    fn all_finished(&self) -> bool {
        self.workers
            .iter()
            .all(|w| w.thread.as_ref().is_none_or(|t| t.is_finished()))
    }
}

fn run_thread_worker(
    worker: WorkerId,
    inbox: mpsc::Receiver<FrameRequest>,
    events: mpsc::Sender<WorkerEvent>,
    executor: WorkerExecutor,
) {
    let mut guard = ClosedOnExit {
        worker,
        events: events.clone(),
        reason: "input closed".to_string(),
    };
    for req in inbox {
        match executor.execute(req) {
            Ok(result) => {
                if events.send(WorkerEvent::Completed { worker, result }).is_err() {
                    guard.reason = "scheduler hung up".to_string();
                    return;
                }
            }
            Err(e) => {
                guard.reason = format!("frame {} failed: {e}", req.index);
                return;
            }
        }
    }
}

impl WorkerPool for ThreadWorkerPool {
    fn size(&self) -> usize {
        self.workers.len()
    }

    fn dispatch(&mut self, worker: WorkerId, req: FrameRequest) -> ReelResult<()> {
        let handle = self
            .workers
            .get(worker.0)
            .ok_or_else(|| ReelError::worker(format!("no such worker: {worker}")))?;
        let inbox = handle
            .inbox
            .as_ref()
            .ok_or_else(|| ReelError::worker(format!("{worker} input is closed")))?;
        inbox
            .send(req)
            .map_err(|_| ReelError::worker(format!("{worker} has exited")))
    }

    fn begin_teardown(&mut self) -> ReelResult<()> {
        for w in &mut self.workers {
            drop(w.inbox.take());
        }
        Ok(())
    }

    fn await_teardown(&mut self, timeout: Duration) -> ReelResult<bool> {
        let done = poll_until(timeout, || Ok(self.all_finished()))?;
        if done {
            for w in &mut self.workers {
                if let Some(thread) = w.thread.take() {
                    thread
                        .join()
                        .map_err(|_| ReelError::worker("worker thread panicked"))?;
                }
            }
        }
        Ok(done)
    }

    fn kill(&mut self) -> ReelResult<()> {
        self.begin_teardown()?;
        let detached = self
            .workers
            .iter_mut()
            .filter_map(|w| w.thread.take())
            .filter(|t| !t.is_finished())
            .count();
        if detached > 0 {
            tracing::warn!(detached, "detaching worker threads that did not exit");
        }
        Ok(())
    }
}
