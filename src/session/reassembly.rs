use std::collections::BTreeMap;

use crate::encode::sink::{FrameSink, WriteStatus};
use crate::foundation::core::{FrameCount, FrameIndex, FrameResult};
use crate::foundation::error::{ReelError, ReelResult};

/// Next frame index owed to the sink. Starts at 1 and only moves forward, one write at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EmissionCursor {
    next: FrameIndex,
}

impl Default for EmissionCursor {
    fn default() -> Self {
        Self {
            next: FrameIndex::FIRST,
        }
    }
}

impl EmissionCursor {
    pub fn next_to_emit(self) -> FrameIndex {
        self.next
    }

    fn advance(&mut self) {
        self.next = self.next.next();
    }
}

/// Completed frames that cannot be emitted yet, keyed by index.
///
/// Holds only indices in `[next_to_emit, N]`, each at most once.
#[derive(Debug)]
pub struct ReassemblyBuffer {
    total: FrameCount,
    pending: BTreeMap<FrameIndex, Vec<u8>>,
}

impl ReassemblyBuffer {
    pub fn new(total: FrameCount) -> Self {
        Self {
            total,
            pending: BTreeMap::new(),
        }
    }

    /// Buffer `result`. Duplicates, already-emitted indices and indices past `N` are rejected.
    pub fn insert(&mut self, next_to_emit: FrameIndex, result: FrameResult) -> ReelResult<()> {
        let idx = result.index;
        if !self.total.contains(idx) {
            return Err(ReelError::protocol(format!(
                "frame {idx} is outside 1..={}",
                self.total.get()
            )));
        }
        if idx < next_to_emit {
            return Err(ReelError::protocol(format!(
                "frame {idx} was already emitted"
            )));
        }
        if self.pending.contains_key(&idx) {
            return Err(ReelError::protocol(format!(
                "frame {idx} arrived twice"
            )));
        }
        self.pending.insert(idx, result.payload);
        Ok(())
    }

    pub fn contains(&self, idx: FrameIndex) -> bool {
        self.pending.contains_key(&idx)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Buffered indices in ascending order.
    pub fn indices(&self) -> impl Iterator<Item = FrameIndex> + '_ {
        self.pending.keys().copied()
    }

    fn take(&mut self, idx: FrameIndex) -> Option<Vec<u8>> {
        self.pending.remove(&idx)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriterState {
    Ready,
    /// The last write reported backpressure; nothing is written until the sink drains.
    AwaitingDrain,
}

/// Moves contiguous frames from a [`ReassemblyBuffer`] into a [`FrameSink`], in index order.
#[derive(Debug)]
pub struct SinkWriter {
    total: FrameCount,
    cursor: EmissionCursor,
    state: WriterState,
}

impl SinkWriter {
    pub fn new(total: FrameCount) -> Self {
        Self {
            total,
            cursor: EmissionCursor::default(),
            state: WriterState::Ready,
        }
    }

    pub fn next_to_emit(&self) -> FrameIndex {
        self.cursor.next_to_emit()
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    pub fn is_suspended(&self) -> bool {
        self.state == WriterState::AwaitingDrain
    }

    /// `true` once every frame in `[1, N]` has been written.
    pub fn is_complete(&self) -> bool {
        self.cursor.next_to_emit() > self.total.last()
    }

    /// Write every buffered frame that is next in line; return how many were written.
    ///
    /// While suspended, the sink is polled for drain first and nothing is written unless it
    /// reports ready. Emission stops at the first gap or at the first write that reports
    /// backpressure. Calling this with nothing ready is a no-op.
    pub fn try_advance(
        &mut self,
        buffer: &mut ReassemblyBuffer,
        sink: &mut dyn FrameSink,
    ) -> ReelResult<usize> {
        if self.state == WriterState::AwaitingDrain {
            if !sink.poll_drain()? {
                return Ok(0);
            }
            self.state = WriterState::Ready;
        }

        let mut written = 0;
        while let Some(payload) = buffer.take(self.cursor.next_to_emit()) {
            let status = sink.write_frame(self.cursor.next_to_emit(), payload)?;
            self.cursor.advance();
            written += 1;
            if status == WriteStatus::Backpressure {
                self.state = WriterState::AwaitingDrain;
                break;
            }
        }
        Ok(written)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/reassembly.rs"]
mod tests;
