use std::ffi::OsString;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::config::FrameGeometry;
use crate::foundation::core::{FrameRequest, WorkerId};
use crate::foundation::error::{ReelError, ReelResult};
use crate::pool::{WorkerEvent, WorkerPool, ipc, poll_until};
use crate::render::WorkerExecutor;

/// How to start one process worker.
#[derive(Clone, Debug)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl WorkerCommand {
    /// `program worker --geometry <json> [--coordinator <url>]`.
    pub fn worker_subcommand(
        program: PathBuf,
        geometry: &FrameGeometry,
        coordinator_url: Option<&str>,
    ) -> ReelResult<Self> {
        let geometry = serde_json::to_string(geometry)
            .map_err(|e| ReelError::validation(format!("failed to encode geometry: {e}")))?;
        let mut args: Vec<OsString> = vec!["worker".into(), "--geometry".into(), geometry.into()];
        if let Some(url) = coordinator_url {
            args.push("--coordinator".into());
            args.push(url.into());
        }
        Ok(Self { program, args })
    }

    /// Same as [`WorkerCommand::worker_subcommand`] for the running executable.
    pub fn current_exe(geometry: &FrameGeometry, coordinator_url: Option<&str>) -> ReelResult<Self> {
        use anyhow::Context as _;
        let program = std::env::current_exe().context("failed to locate the running executable")?;
        Self::worker_subcommand(program, geometry, coordinator_url)
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

struct ProcessWorker {
    child: Child,
    stdin: Option<ChildStdin>,
    reader: Option<JoinHandle<()>>,
    status: Option<ExitStatus>,
}

/// Workers hosted as child processes: requests go to their stdin as JSON lines, results come back
/// on stdout in the [`ipc`] framing. Worker stderr is inherited so their logs reach the terminal.
pub struct ProcessWorkerPool {
    workers: Vec<ProcessWorker>,
}

impl ProcessWorkerPool {
    pub fn spawn(
        size: usize,
        command: &WorkerCommand,
    ) -> ReelResult<(Self, mpsc::Receiver<WorkerEvent>)> {
        if size == 0 {
            return Err(ReelError::validation("worker pool size must be at least 1"));
        }
        let (events_tx, events_rx) = mpsc::channel();
        let mut pool = Self {
            workers: Vec::with_capacity(size),
        };

        for i in 0..size {
            let worker = WorkerId(i);
            // Already-spawned children are killed by `Drop` if a later spawn fails.
            let spawned = spawn_one(worker, command, events_tx.clone())?;
            pool.workers.push(spawned);
        }

        tracing::debug!(size, program = %command.program.display(), "spawned process workers");
        Ok((pool, events_rx))
    }

    fn reap_exited(&mut self) -> ReelResult<bool> {
        for (i, w) in self.workers.iter_mut().enumerate() {
            if w.status.is_some() {
                continue;
            }
            let polled = w
                .child
                .try_wait()
                .map_err(|e| ReelError::worker(format!("failed to poll worker-{i}: {e}")))?;
            if let Some(status) = polled {
                if !status.success() {
                    tracing::warn!(worker = i, %status, "worker exited with failure status");
                }
                w.status = Some(status);
            }
        }
        Ok(self.workers.iter().all(|w| w.status.is_some()))
    }
}

fn spawn_one(
    worker: WorkerId,
    command: &WorkerCommand,
    events: mpsc::Sender<WorkerEvent>,
) -> ReelResult<ProcessWorker> {
    let mut child = command
        .command()
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| {
            ReelError::worker(format!(
                "failed to spawn {worker} ('{}'): {e}",
                command.program.display()
            ))
        })?;

    let stdin = child.stdin.take();
    let Some(stdout) = child.stdout.take() else {
        let _ = child.kill();
        let _ = child.wait();
        return Err(ReelError::worker(format!("failed to open {worker} stdout")));
    };

    let reader = std::thread::Builder::new()
        .name(format!("zoomreel-{worker}-reader"))
        .spawn(move || read_worker_output(worker, stdout, events));
    let reader = match reader {
        Ok(handle) => handle,
        Err(e) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ReelError::worker(format!(
                "failed to spawn reader for {worker}: {e}"
            )));
        }
    };

    Ok(ProcessWorker {
        child,
        stdin,
        reader: Some(reader),
        status: None,
    })
}

fn read_worker_output(
    worker: WorkerId,
    stdout: impl std::io::Read,
    events: mpsc::Sender<WorkerEvent>,
) {
    let mut input = BufReader::new(stdout);
    let reason = loop {
        match ipc::read_result(&mut input) {
            Ok(Some(result)) => {
                if events.send(WorkerEvent::Completed { worker, result }).is_err() {
                    return;
                }
            }
            Ok(None) => break "output closed".to_string(),
            Err(e) => break e.to_string(),
        }
    };
    let _ = events.send(WorkerEvent::Closed { worker, reason });
}

impl WorkerPool for ProcessWorkerPool {
    fn size(&self) -> usize {
        self.workers.len()
    }

    fn dispatch(&mut self, worker: WorkerId, req: FrameRequest) -> ReelResult<()> {
        let handle = self
            .workers
            .get_mut(worker.0)
            .ok_or_else(|| ReelError::worker(format!("no such worker: {worker}")))?;
        let stdin = handle
            .stdin
            .as_mut()
            .ok_or_else(|| ReelError::worker(format!("{worker} input is closed")))?;
        let sent = ipc::write_request(stdin, req);
        if sent.is_err() {
            // Broken pipe: the worker is gone, stop writing to it.
            handle.stdin = None;
        }
        sent
    }

    fn begin_teardown(&mut self) -> ReelResult<()> {
        for w in &mut self.workers {
            drop(w.stdin.take());
        }
        Ok(())
    }

    fn await_teardown(&mut self, timeout: Duration) -> ReelResult<bool> {
        let done = poll_until(timeout, || self.reap_exited())?;
        if done {
            for w in &mut self.workers {
                if let Some(reader) = w.reader.take_if(|r| r.is_finished()) {
                    let _ = reader.join();
                }
            }
        }
        Ok(done)
    }

    fn kill(&mut self) -> ReelResult<()> {
        self.begin_teardown()?;
        for (i, w) in self.workers.iter_mut().enumerate() {
            if w.status.is_some() {
                continue;
            }
            let _ = w.child.kill();
            let status = w
                .child
                .wait()
                .map_err(|e| ReelError::worker(format!("failed to reap worker-{i}: {e}")))?;
            w.status = Some(status);
        }
        Ok(())
    }
}

impl Drop for ProcessWorkerPool {
    fn drop(&mut self) {
        for w in &mut self.workers {
            if w.status.is_none() {
                let _ = w.child.kill();
                let _ = w.child.wait();
            }
        }
    }
}

/// Worker side of the process transport: answer requests from `input` until it closes.
///
/// Any failure ends the loop with an error, which the master observes as the worker's output
/// closing.
pub fn run_worker_loop<R: BufRead, W: Write>(
    mut input: R,
    mut output: W,
    executor: &WorkerExecutor,
) -> ReelResult<()> {
    while let Some(req) = ipc::read_request(&mut input)? {
        let result = executor.execute(req)?;
        ipc::write_result(&mut output, &result)?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/pool/process.rs"]
mod tests;
