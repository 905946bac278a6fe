use std::collections::VecDeque;
use std::time::Duration;

use crate::foundation::core::FrameIndex;
use crate::foundation::error::{ReelError, ReelResult};

/// Outcome of a single [`FrameSink::write_frame`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteStatus {
    /// Bytes accepted; the sink can take more right away.
    Ready,
    /// Bytes accepted, but the consumer is behind. Do not write again until
    /// [`FrameSink::poll_drain`] returns `true`.
    Backpressure,
}

/// Outcome of waiting for the consumer to finalize its output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FinishStatus {
    Finished,
    /// The consumer has not acknowledged close within the timeout.
    Pending,
}

/// Ordered byte consumer with backpressure.
///
/// Ordering contract: `write_frame` is called in strictly increasing `FrameIndex` order, and
/// never while a previous write's backpressure is still undrained.
pub trait FrameSink: Send {
    /// Hand one frame's bytes to the consumer.
    fn write_frame(&mut self, idx: FrameIndex, payload: Vec<u8>) -> ReelResult<WriteStatus>;
    /// Return `true` once the sink can accept writes again after [`WriteStatus::Backpressure`].
    fn poll_drain(&mut self) -> ReelResult<bool>;
    /// Signal end of input. Idempotent.
    fn end_input(&mut self) -> ReelResult<()>;
    /// Wait up to `timeout` for the consumer's finish acknowledgment.
    fn await_finish(&mut self, timeout: Duration) -> ReelResult<FinishStatus>;
    /// Terminate the consumer without waiting for it to finalize.
    fn kill(&mut self) -> ReelResult<()>;
}

/// Everything an [`InMemorySink`] observed, in call order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinkEvent {
    Write(FrameIndex),
    Drain(bool),
    EndInput,
    AwaitFinish(FinishStatus),
    Kill,
}

/// In-memory sink for tests and debugging.
///
/// Backpressure and close behavior are scripted: each write pops the next entry of
/// `write_script` (default [`WriteStatus::Ready`]), each drain poll pops `drain_script`
/// (default `true`), each finish wait pops `finish_script` (default
/// [`FinishStatus::Finished`]). A write issued while backpressured is reported as an error.
#[derive(Debug, Default)]
pub struct InMemorySink {
    frames: Vec<(FrameIndex, Vec<u8>)>,
    events: Vec<SinkEvent>,
    write_script: VecDeque<WriteStatus>,
    drain_script: VecDeque<bool>,
    finish_script: VecDeque<FinishStatus>,
    never_finish: bool,
    backpressured: bool,
    ended: bool,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue write outcomes, consumed one per write.
    pub fn script_writes(mut self, script: impl IntoIterator<Item = WriteStatus>) -> Self {
        self.write_script.extend(script);
        self
    }

    /// Queue drain poll outcomes, consumed one per poll.
    pub fn script_drains(mut self, script: impl IntoIterator<Item = bool>) -> Self {
        self.drain_script.extend(script);
        self
    }

    /// Queue finish outcomes, consumed one per wait.
    pub fn script_finishes(mut self, script: impl IntoIterator<Item = FinishStatus>) -> Self {
        self.finish_script.extend(script);
        self
    }

    /// Make every finish wait time out, like a consumer that never acknowledges close.
    pub fn never_finish(mut self) -> Self {
        self.never_finish = true;
        self
    }

    /// Frames in write order.
    pub fn frames(&self) -> &[(FrameIndex, Vec<u8>)] {
        &self.frames
    }

    pub fn indices(&self) -> Vec<FrameIndex> {
        self.frames.iter().map(|(idx, _)| *idx).collect()
    }

    /// Concatenation of every payload, as the consumer would see it.
    pub fn bytes(&self) -> Vec<u8> {
        self.frames
            .iter()
            .flat_map(|(_, p)| p.iter().copied())
            .collect()
    }

    pub fn events(&self) -> &[SinkEvent] {
        &self.events
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }
}

impl FrameSink for InMemorySink {
    fn write_frame(&mut self, idx: FrameIndex, payload: Vec<u8>) -> ReelResult<WriteStatus> {
        if self.backpressured {
            return Err(ReelError::sink("write issued before the sink drained"));
        }
        if self.ended {
            return Err(ReelError::sink("write issued after end of input"));
        }
        if let Some((last, _)) = self.frames.last()
            && idx <= *last
        {
            return Err(ReelError::sink(format!(
                "out-of-order write: frame {idx} after frame {last}"
            )));
        }
        self.events.push(SinkEvent::Write(idx));
        self.frames.push((idx, payload));
        let status = self.write_script.pop_front().unwrap_or(WriteStatus::Ready);
        self.backpressured = status == WriteStatus::Backpressure;
        Ok(status)
    }

    fn poll_drain(&mut self) -> ReelResult<bool> {
        let ready = self.drain_script.pop_front().unwrap_or(true);
        self.events.push(SinkEvent::Drain(ready));
        if ready {
            self.backpressured = false;
        }
        Ok(ready)
    }

    fn end_input(&mut self) -> ReelResult<()> {
        if !self.ended {
            self.events.push(SinkEvent::EndInput);
        }
        self.ended = true;
        Ok(())
    }

    fn await_finish(&mut self, _timeout: Duration) -> ReelResult<FinishStatus> {
        let status = if self.never_finish {
            FinishStatus::Pending
        } else {
            self.finish_script
                .pop_front()
                .unwrap_or(FinishStatus::Finished)
        };
        self.events.push(SinkEvent::AwaitFinish(status));
        Ok(status)
    }

    fn kill(&mut self) -> ReelResult<()> {
        self.events.push(SinkEvent::Kill);
        Ok(())
    }
}
