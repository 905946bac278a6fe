use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use crate::config::{FrameEncoding, RunConfig};
use crate::encode::pipe::PipeWriter;
use crate::encode::sink::{FinishStatus, FrameSink, WriteStatus};
use crate::foundation::core::FrameIndex;
use crate::foundation::error::{ReelError, ReelResult};

const EXIT_POLL: Duration = Duration::from_millis(20);

/// Options for [`FfmpegSink`] MP4 output.
#[derive(Clone, Debug)]
pub struct FfmpegSinkOpts {
    /// Output MP4 file path.
    pub out_path: PathBuf,
    /// Overwrite output file if it already exists.
    pub overwrite: bool,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub encoding: FrameEncoding,
    /// Queued bytes above which writes report backpressure.
    pub high_water_bytes: usize,
}

impl FfmpegSinkOpts {
    pub fn from_run_config(cfg: &RunConfig) -> Self {
        Self {
            out_path: cfg.out_path.clone(),
            overwrite: cfg.overwrite,
            width: cfg.geometry.width,
            height: cfg.geometry.height,
            fps: cfg.fps,
            encoding: cfg.geometry.encoding,
            high_water_bytes: cfg.sink_high_water_bytes,
        }
    }

    pub fn validate(&self) -> ReelResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ReelError::validation(
                "ffmpeg sink width/height must be non-zero",
            ));
        }
        if !self.width.is_multiple_of(2) || !self.height.is_multiple_of(2) {
            return Err(ReelError::validation(
                "ffmpeg sink width/height must be even (required for yuv420p mp4 output)",
            ));
        }
        if self.fps == 0 {
            return Err(ReelError::validation("fps must be non-zero"));
        }
        if self.high_water_bytes == 0 {
            return Err(ReelError::validation(
                "ffmpeg sink high-water mark must be non-zero",
            ));
        }
        Ok(())
    }

    /// Command-line arguments passed to `ffmpeg`.
    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        let mut push = |s: &str| args.push(OsString::from(s));

        push(if self.overwrite { "-y" } else { "-n" });
        push("-loglevel");
        push("error");
        match self.encoding {
            FrameEncoding::RawRgba => {
                push("-f");
                push("rawvideo");
                push("-pix_fmt");
                push("rgba");
                push("-s");
                push(&format!("{}x{}", self.width, self.height));
            }
            FrameEncoding::Png => {
                push("-f");
                push("image2pipe");
                push("-c:v");
                push("png");
            }
        }
        // For piped input, `-r` before `-i` sets the input frame rate.
        push("-r");
        push(&self.fps.to_string());
        push("-i");
        push("pipe:0");
        // Output: h264 + yuv420p for broad compatibility.
        for a in [
            "-an",
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
        ] {
            push(a);
        }
        args.push(self.out_path.clone().into_os_string());
        args
    }

    fn expected_frame_len(&self) -> Option<usize> {
        match self.encoding {
            FrameEncoding::RawRgba => Some(self.width as usize * self.height as usize * 4),
            FrameEncoding::Png => None,
        }
    }
}

/// Sink that streams frames into a child process's stdin (normally the system `ffmpeg`).
///
/// Writes go through a [`PipeWriter`], so a slow encoder surfaces as backpressure instead of
/// blocking the scheduler. Closing input drops the child's stdin; the child exiting with status 0
/// is the finish acknowledgment.
pub struct FfmpegSink {
    child: Child,
    writer: PipeWriter,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,
    frame_len: Option<usize>,
    last_idx: Option<FrameIndex>,
    status: Option<ExitStatus>,
}

impl FfmpegSink {
    /// Validate `opts`, check for `ffmpeg` on PATH and spawn it.
    pub fn spawn(opts: &FfmpegSinkOpts) -> ReelResult<Self> {
        opts.validate()?;
        ensure_parent_dir(&opts.out_path)?;
        if !opts.overwrite && opts.out_path.exists() {
            return Err(ReelError::validation(format!(
                "output file '{}' already exists",
                opts.out_path.display()
            )));
        }
        if !is_ffmpeg_on_path() {
            return Err(ReelError::sink(
                "ffmpeg is required for MP4 encoding, but was not found on PATH",
            ));
        }

        let mut cmd = Command::new("ffmpeg");
        cmd.args(opts.args());
        Self::from_command(cmd, opts.expected_frame_len(), opts.high_water_bytes)
    }

    /// Spawn an arbitrary consumer. `frame_len`, when set, is enforced on every write.
    pub fn from_command(
        mut cmd: Command,
        frame_len: Option<usize>,
        high_water_bytes: usize,
    ) -> ReelResult<Self> {
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| ReelError::sink(format!("failed to spawn consumer: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ReelError::sink("failed to open consumer stdin (unexpected)"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ReelError::sink("failed to open consumer stderr (unexpected)"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut stderr_bytes = Vec::new();
            stderr.read_to_end(&mut stderr_bytes)?;
            Ok(stderr_bytes)
        });

        let writer = match PipeWriter::spawn(stdin, high_water_bytes) {
            Ok(writer) => writer,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e);
            }
        };

        Ok(Self {
            child,
            writer,
            stderr_drain: Some(stderr_drain),
            frame_len,
            last_idx: None,
            status: None,
        })
    }

    fn take_stderr(&mut self) -> String {
        let bytes = match self.stderr_drain.take() {
            Some(handle) => handle.join().ok().and_then(|r| r.ok()).unwrap_or_default(),
            None => Vec::new(),
        };
        String::from_utf8_lossy(&bytes).trim().to_string()
    }

    fn finish_with(&mut self, status: ExitStatus) -> ReelResult<FinishStatus> {
        self.status = Some(status);
        self.writer.close();
        if self.writer.is_finished() {
            self.writer.join()?;
        }
        if !status.success() {
            let stderr = self.take_stderr();
            return Err(ReelError::sink(format!(
                "consumer exited with status {status}: {stderr}"
            )));
        }
        Ok(FinishStatus::Finished)
    }
}

impl FrameSink for FfmpegSink {
    fn write_frame(&mut self, idx: FrameIndex, payload: Vec<u8>) -> ReelResult<WriteStatus> {
        if let Some(last) = self.last_idx
            && idx <= last
        {
            return Err(ReelError::sink(
                "consumer sink received out-of-order frame index",
            ));
        }
        if let Some(expected) = self.frame_len
            && payload.len() != expected
        {
            return Err(ReelError::validation(format!(
                "frame {idx} payload is {} bytes, expected {expected}",
                payload.len()
            )));
        }
        self.last_idx = Some(idx);
        self.writer.write(payload)
    }

    fn poll_drain(&mut self) -> ReelResult<bool> {
        self.writer.poll_drain()
    }

    fn end_input(&mut self) -> ReelResult<()> {
        self.writer.close();
        Ok(())
    }

    fn await_finish(&mut self, timeout: Duration) -> ReelResult<FinishStatus> {
        if let Some(status) = self.status {
            return if status.success() {
                Ok(FinishStatus::Finished)
            } else {
                Err(ReelError::sink(format!("consumer exited with status {status}")))
            };
        }

        let deadline = Instant::now() + timeout;
        loop {
            let polled = self
                .child
                .try_wait()
                .map_err(|e| ReelError::sink(format!("failed to poll consumer: {e}")))?;
            if let Some(status) = polled {
                return self.finish_with(status);
            }
            if Instant::now() >= deadline {
                return Ok(FinishStatus::Pending);
            }
            std::thread::sleep(EXIT_POLL);
        }
    }

    fn kill(&mut self) -> ReelResult<()> {
        self.writer.close();
        if self.status.is_none() {
            // Already exited is fine.
            let _ = self.child.kill();
            let status = self
                .child
                .wait()
                .map_err(|e| ReelError::sink(format!("failed to reap consumer: {e}")))?;
            self.status = Some(status);
        }
        let _ = self.writer.join();
        Ok(())
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        self.writer.close();
        if self.status.is_none() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> ReelResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
#[path = "../../tests/unit/encode/ffmpeg.rs"]
mod tests;
