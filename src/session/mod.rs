//! One render run, end to end: workers, scheduling, ordered output and shutdown.

pub mod reassembly;
pub mod scheduler;
pub mod shutdown;

use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::sync::Arc;

use crate::config::{RunConfig, WorkerMode};
use crate::coordinator::client::{DEFAULT_REQUEST_TIMEOUT, HttpCoordinator};
use crate::coordinator::server::CoordinatorHandle;
use crate::coordinator::{LocalCoordinator, TransformCoordinator, TransformState};
use crate::encode::ffmpeg::{FfmpegSink, FfmpegSinkOpts};
use crate::encode::sink::FrameSink;
use crate::foundation::error::ReelResult;
use crate::pool::policy_for;
use crate::pool::process::{ProcessWorkerPool, WorkerCommand};
use crate::pool::thread::ThreadWorkerPool;
use crate::render::WorkerExecutor;

pub use reassembly::{EmissionCursor, ReassemblyBuffer, SinkWriter, WriterState};
pub use scheduler::{RunReport, Scheduler, SchedulerOptions, WorkerClosure};
pub use shutdown::{
    Clock, ManualClock, ShutdownPhase, ShutdownProtocol, ShutdownReport, SystemClock,
};

/// Render `cfg.frames` frames into an MP4 through the system `ffmpeg`.
pub fn render_zoom(cfg: &RunConfig) -> ReelResult<RunReport> {
    cfg.validate()?;
    let mut sink = FfmpegSink::spawn(&FfmpegSinkOpts::from_run_config(cfg))?;
    run_pipeline(cfg, &mut sink, None)
}

/// Run the pipeline into an arbitrary sink.
///
/// Process workers re-invoke `worker_program` (default: the running executable) with the hidden
/// `worker` subcommand. Without a configured coordinator URL, process runs host a coordinator on
/// an ephemeral loopback port and thread runs share an in-process one.
#[tracing::instrument(
    skip_all,
    fields(frames = cfg.frames, workers = cfg.workers, mode = ?cfg.worker_mode)
)]
pub fn run_pipeline(
    cfg: &RunConfig,
    sink: &mut dyn FrameSink,
    worker_program: Option<&Path>,
) -> ReelResult<RunReport> {
    cfg.validate()?;
    let opts = SchedulerOptions {
        frames: cfg.frame_count()?,
        poll_interval: cfg.poll_interval(),
        shutdown: cfg.shutdown.clone(),
    };
    let policy = policy_for(cfg.policy, cfg.policy_seed);
    let clock = SystemClock;

    match cfg.worker_mode {
        WorkerMode::Thread => {
            let coordinator: Arc<dyn TransformCoordinator> = match &cfg.coordinator_url {
                Some(url) => Arc::new(HttpCoordinator::new(
                    url.clone(),
                    DEFAULT_REQUEST_TIMEOUT,
                )?),
                None => Arc::new(LocalCoordinator::default()),
            };
            let executor = WorkerExecutor::new(cfg.geometry.clone(), coordinator);
            let (pool, events) = ThreadWorkerPool::spawn(cfg.workers, executor)?;
            Scheduler::new(pool, policy, opts).run(&events, sink, &clock)
        }
        WorkerMode::Process => {
            let (hosted, url) = match &cfg.coordinator_url {
                Some(url) => (None, url.clone()),
                None => {
                    let handle = CoordinatorHandle::spawn(
                        SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
                        TransformState::default(),
                    )?;
                    let url = handle.url();
                    (Some(handle), url)
                }
            };
            let command = match worker_program {
                Some(program) => WorkerCommand::worker_subcommand(
                    program.to_path_buf(),
                    &cfg.geometry,
                    Some(&url),
                )?,
                None => WorkerCommand::current_exe(&cfg.geometry, Some(&url))?,
            };

            let (pool, events) = ProcessWorkerPool::spawn(cfg.workers, &command)?;
            let report = Scheduler::new(pool, policy, opts).run(&events, sink, &clock);

            if let Some(handle) = hosted {
                let center = handle.current();
                tracing::debug!(
                    transform_x = center.transform_x,
                    transform_y = center.transform_y,
                    "final transform center"
                );
                if let Err(e) = handle.shutdown() {
                    tracing::warn!(error = %e, "coordinator did not stop cleanly");
                }
            }
            report
        }
    }
}
