//! Ordered output of rendered frames.
//!
//! [`sink::FrameSink`] is the contract the scheduler writes through. [`ffmpeg::FfmpegSink`] feeds
//! the system `ffmpeg` binary; [`sink::InMemorySink`] records frames for tests.

pub mod ffmpeg;
pub mod pipe;
pub mod sink;

pub use ffmpeg::{FfmpegSink, FfmpegSinkOpts, ensure_parent_dir, is_ffmpeg_on_path};
pub use sink::{FinishStatus, FrameSink, InMemorySink, SinkEvent, WriteStatus};
