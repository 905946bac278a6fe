use std::fmt;

use crate::foundation::error::{ReelError, ReelResult};

/// 1-based position of a frame in final output order.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct FrameIndex(pub u64);

impl FrameIndex {
    /// First frame of every run.
    pub const FIRST: FrameIndex = FrameIndex(1);

    /// The index immediately after this one.
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for FrameIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Total number of frames in a run (`N`). Always at least one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct FrameCount(u64);

impl FrameCount {
    /// Create a validated frame count (`n >= 1`).
    pub fn new(n: u64) -> ReelResult<Self> {
        if n == 0 {
            return Err(ReelError::validation("frame count must be at least 1"));
        }
        Ok(Self(n))
    }

    pub fn get(self) -> u64 {
        self.0
    }

    /// Last index of the run.
    pub fn last(self) -> FrameIndex {
        FrameIndex(self.0)
    }

    /// Return `true` when `idx` lies in `[1, N]`.
    pub fn contains(self, idx: FrameIndex) -> bool {
        idx.0 >= 1 && idx.0 <= self.0
    }
}

impl TryFrom<u64> for FrameCount {
    type Error = ReelError;

    fn try_from(n: u64) -> Result<Self, Self::Error> {
        Self::new(n)
    }
}

impl From<FrameCount> for u64 {
    fn from(n: FrameCount) -> Self {
        n.0
    }
}

/// Position of a worker inside its pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkerId(pub usize);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Dispatch message: render the frame at `index`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FrameRequest {
    #[serde(rename = "frameIndex")]
    pub index: FrameIndex,
}

impl FrameRequest {
    pub fn new(index: FrameIndex) -> Self {
        Self { index }
    }
}

/// A rendered frame, ready to be reassembled into output order.
#[derive(Clone, PartialEq, Eq)]
pub struct FrameResult {
    pub index: FrameIndex,
    /// Encoded frame bytes, opaque to the pipeline.
    pub payload: Vec<u8>,
}

impl fmt::Debug for FrameResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameResult")
            .field("index", &self.index)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}
