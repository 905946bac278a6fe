#![forbid(unsafe_code)]

//! Distributed fractal zoom renderer.
//!
//! A master [`Scheduler`] hands frame indices to a fixed pool of workers, reassembles their
//! out-of-order results, and streams them in order into `ffmpeg`, honoring its backpressure.
//! Workers steer the zoom through a shared [`coordinator`] holding the transform center.

pub mod config;
pub mod coordinator;
pub mod encode;
pub mod foundation;
pub mod logging;
pub mod pool;
pub mod render;
pub mod session;

pub use config::{
    FrameEncoding, FrameGeometry, PlaneBounds, PolicyKind, RunConfig, ShutdownPolicy, WorkerMode,
};
pub use coordinator::client::HttpCoordinator;
pub use coordinator::server::CoordinatorHandle;
pub use coordinator::{LocalCoordinator, TransformCoordinator, TransformState, TransformStore};
pub use encode::{FfmpegSink, FfmpegSinkOpts, FinishStatus, FrameSink, InMemorySink, WriteStatus};
pub use foundation::core::{FrameCount, FrameIndex, FrameRequest, FrameResult, WorkerId};
pub use foundation::error::{ReelError, ReelResult};
pub use pool::{
    ProcessWorkerPool, ScriptedPool, SchedulingPolicy, ThreadWorkerPool, WorkerCommand,
    WorkerEvent, WorkerPool,
};
pub use render::{RenderedFrame, WorkerExecutor, render_escape_frame};
pub use session::{
    RunReport, Scheduler, SchedulerOptions, ShutdownPhase, ShutdownReport, render_zoom,
    run_pipeline,
};
