use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread::JoinHandle;

use crate::encode::sink::WriteStatus;
use crate::foundation::error::{ReelError, ReelResult};

/// Owns a blocking writer on a dedicated thread and reports backpressure from the number of
/// queued bytes.
///
/// `write` never blocks: bytes are queued and the writer thread drains them in order. Once the
/// queue reaches `high_water` bytes the write reports [`WriteStatus::Backpressure`]; the pipe
/// counts as drained again when the queue falls to half of that.
pub struct PipeWriter {
    tx: Option<mpsc::Sender<Vec<u8>>>,
    queued: Arc<AtomicUsize>,
    high_water: usize,
    thread: Option<JoinHandle<std::io::Result<()>>>,
}

impl PipeWriter {
    pub fn spawn<W: Write + Send + 'static>(mut out: W, high_water: usize) -> ReelResult<Self> {
        if high_water == 0 {
            return Err(ReelError::validation("pipe high-water mark must be non-zero"));
        }
        let (tx, rx) = mpsc::channel::<Vec<u8>>();
        let queued = Arc::new(AtomicUsize::new(0));
        let queued_thread = queued.clone();

        let thread = std::thread::Builder::new()
            .name("zoomreel-sink-writer".to_string())
            .spawn(move || -> std::io::Result<()> {
                for buf in rx {
                    out.write_all(&buf)?;
                    queued_thread.fetch_sub(buf.len(), Ordering::AcqRel);
                }
                out.flush()
            })
            .map_err(|e| ReelError::sink(format!("failed to spawn sink writer thread: {e}")))?;

        Ok(Self {
            tx: Some(tx),
            queued,
            high_water,
            thread: Some(thread),
        })
    }

    /// Queue `bytes` for writing.
    pub fn write(&mut self, bytes: Vec<u8>) -> ReelResult<WriteStatus> {
        let Some(tx) = self.tx.as_ref() else {
            return Err(ReelError::sink("sink input is already closed"));
        };
        let len = bytes.len();
        let queued = self.queued.fetch_add(len, Ordering::AcqRel) + len;
        if tx.send(bytes).is_err() {
            self.queued.fetch_sub(len, Ordering::AcqRel);
            return Err(self.writer_failure());
        }
        if queued >= self.high_water {
            Ok(WriteStatus::Backpressure)
        } else {
            Ok(WriteStatus::Ready)
        }
    }

    /// `true` once the queue has drained below the low-water mark.
    pub fn poll_drain(&mut self) -> ReelResult<bool> {
        if self.queued_bytes() <= self.high_water / 2 {
            return Ok(true);
        }
        if self.thread.as_ref().is_some_and(|t| t.is_finished()) {
            return Err(self.writer_failure());
        }
        Ok(false)
    }

    pub fn queued_bytes(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    /// Stop accepting bytes. The writer thread finishes the queue, then drops the writer.
    pub fn close(&mut self) {
        drop(self.tx.take());
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_none()
    }

    /// `true` when the writer thread has exited (or was already joined).
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(|t| t.is_finished())
    }

    /// Join the writer thread and surface its I/O error, if any.
    pub fn join(&mut self) -> ReelResult<()> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        thread
            .join()
            .map_err(|_| ReelError::sink("sink writer thread panicked"))?
            .map_err(|e| ReelError::sink(format!("failed to write to consumer: {e}")))
    }

    fn writer_failure(&mut self) -> ReelError {
        match self.join() {
            Err(e) => e,
            Ok(()) => ReelError::sink("sink writer stopped unexpectedly"),
        }
    }
}
