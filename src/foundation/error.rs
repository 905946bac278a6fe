use crate::foundation::core::FrameIndex;

pub type ReelResult<T> = Result<T, ReelError>;

#[derive(thiserror::Error, Debug)]
pub enum ReelError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("coordinator error: {0}")]
    Coordinator(String),

    #[error("worker error: {0}")]
    Worker(String),

    #[error("sink error: {0}")]
    Sink(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(
        "pipeline stalled at frame {next_to_emit}: no worker can deliver it (lost frames: {lost:?})"
    )]
    Stalled {
        next_to_emit: FrameIndex,
        lost: Vec<FrameIndex>,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ReelError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn coordinator(msg: impl Into<String>) -> Self {
        Self::Coordinator(msg.into())
    }

    pub fn worker(msg: impl Into<String>) -> Self {
        Self::Worker(msg.into())
    }

    pub fn sink(msg: impl Into<String>) -> Self {
        Self::Sink(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }
}
