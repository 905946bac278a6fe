//! Run configuration.
//!
//! Every knob has a default, so a JSON config file only needs the fields it overrides. The CLI
//! layers its flags on top of the file, and the positional frame count always wins.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;

use crate::foundation::core::{FrameCount, FrameIndex};
use crate::foundation::error::{ReelError, ReelResult};

/// Region of the complex plane shown at zoom 1.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PlaneBounds {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
}

impl Default for PlaneBounds {
    fn default() -> Self {
        Self {
            xmin: -2.0,
            xmax: 1.0,
            ymin: -1.0,
            ymax: 1.0,
        }
    }
}

impl PlaneBounds {
    pub fn validate(&self) -> ReelResult<()> {
        let finite = [self.xmin, self.xmax, self.ymin, self.ymax]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(ReelError::validation("plane bounds must be finite"));
        }
        if self.xmin >= self.xmax || self.ymin >= self.ymax {
            return Err(ReelError::validation(
                "plane bounds must satisfy xmin < xmax and ymin < ymax",
            ));
        }
        Ok(())
    }
}

/// Byte layout of a frame payload, and therefore of the encoder's input.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum FrameEncoding {
    /// Straight RGBA8, `width * height * 4` bytes per frame.
    #[default]
    RawRgba,
    /// One PNG image per frame.
    Png,
}

/// Everything a worker needs to turn a frame index into pixels.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
    pub bounds: PlaneBounds,
    pub max_iterations: u32,
    /// `zoom = index / zoom_divisor`.
    pub zoom_divisor: f64,
    pub encoding: FrameEncoding,
}

impl Default for FrameGeometry {
    fn default() -> Self {
        Self {
            width: 900,
            height: 600,
            bounds: PlaneBounds::default(),
            max_iterations: 250,
            zoom_divisor: 7.0,
            encoding: FrameEncoding::RawRgba,
        }
    }
}

impl FrameGeometry {
    pub fn validate(&self) -> ReelResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ReelError::validation(
                "frame width/height must be non-zero",
            ));
        }
        if !self.width.is_multiple_of(2) || !self.height.is_multiple_of(2) {
            // The encoder targets yuv420p.
            return Err(ReelError::validation(
                "frame width/height must be even (required for yuv420p mp4 output)",
            ));
        }
        if self.max_iterations < 2 {
            return Err(ReelError::validation("max_iterations must be at least 2"));
        }
        if !(self.zoom_divisor.is_finite() && self.zoom_divisor > 0.0) {
            return Err(ReelError::validation(
                "zoom_divisor must be a positive finite number",
            ));
        }
        self.bounds.validate()
    }

    pub fn zoom_for(&self, index: FrameIndex) -> f64 {
        index.0 as f64 / self.zoom_divisor
    }

    /// Size of a raw RGBA8 frame in bytes.
    pub fn rgba_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// How workers are hosted.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum WorkerMode {
    /// One child process per worker (re-invokes this binary).
    #[default]
    Process,
    /// One thread per worker inside the master process.
    Thread,
}

/// Which worker receives the next dispatch.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    RoundRobin,
    #[default]
    LeastLoaded,
    Random,
}

/// Bounds for the drain/close protocol run after the last frame is emitted.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ShutdownPolicy {
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub finish_timeout_ms: u64,
}

impl Default for ShutdownPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 1_000,
            finish_timeout_ms: 5_000,
        }
    }
}

impl ShutdownPolicy {
    pub fn validate(&self) -> ReelResult<()> {
        if self.max_attempts == 0 {
            return Err(ReelError::validation(
                "shutdown max_attempts must be at least 1",
            ));
        }
        Ok(())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn finish_timeout(&self) -> Duration {
        Duration::from_millis(self.finish_timeout_ms)
    }
}

/// Full configuration of one render run.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub frames: u64,
    pub workers: usize,
    pub worker_mode: WorkerMode,
    pub policy: PolicyKind,
    /// Seed for [`PolicyKind::Random`].
    pub policy_seed: u64,
    pub geometry: FrameGeometry,
    pub fps: u32,
    pub out_path: PathBuf,
    pub overwrite: bool,
    /// External coordinator; `None` hosts one for the run.
    pub coordinator_url: Option<String>,
    /// Queued bytes above which the encoder sink reports backpressure.
    pub sink_high_water_bytes: usize,
    /// Scheduler tick while the sink is draining.
    pub poll_interval_ms: u64,
    pub shutdown: ShutdownPolicy,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            frames: 250,
            workers: default_workers(),
            worker_mode: WorkerMode::Process,
            policy: PolicyKind::LeastLoaded,
            policy_seed: 0,
            geometry: FrameGeometry::default(),
            fps: 30,
            out_path: PathBuf::from("zoom.mp4"),
            overwrite: true,
            coordinator_url: None,
            sink_high_water_bytes: 16 * 1024 * 1024,
            poll_interval_ms: 100,
            shutdown: ShutdownPolicy::default(),
        }
    }
}

/// Host parallelism, falling back to a single worker.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl RunConfig {
    /// Load a config file; absent fields keep their defaults.
    pub fn from_json_file(path: &Path) -> ReelResult<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read config '{}'", path.display()))?;
        serde_json::from_slice(&bytes).map_err(|e| {
            ReelError::validation(format!("invalid config '{}': {e}", path.display()))
        })
    }

    pub fn validate(&self) -> ReelResult<()> {
        FrameCount::new(self.frames)?;
        if self.workers == 0 {
            return Err(ReelError::validation("workers must be at least 1"));
        }
        if self.fps == 0 {
            return Err(ReelError::validation("fps must be non-zero"));
        }
        if self.sink_high_water_bytes == 0 {
            return Err(ReelError::validation(
                "sink_high_water_bytes must be non-zero",
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ReelError::validation("poll_interval_ms must be non-zero"));
        }
        self.geometry.validate()?;
        self.shutdown.validate()
    }

    pub fn frame_count(&self) -> ReelResult<FrameCount> {
        FrameCount::new(self.frames)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
