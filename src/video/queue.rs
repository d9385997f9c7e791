//! Bounded frame queue between the frame source and the presentation loop
//!
//! Single producer, single consumer, FIFO. `push` blocks while the queue is
//! full, so a slow display stalls decoding instead of dropping frames. The
//! queue closes when the sender is dropped; the receiver drains what is left
//! and then reports the close.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use thiserror::Error;

use super::DecodedFrame;

/// Default number of frames buffered ahead of the display
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// A queue entry
#[derive(Debug, Clone, PartialEq)]
pub enum QueueItem {
    Frame(DecodedFrame),
    /// Placeholder for a frame that could not be produced; consumers skip it
    Marker,
}

/// The consumer side has gone away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("frame queue closed")]
pub struct QueueClosed;

/// Why `pop_timeout` returned without an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PopError {
    #[error("timed out waiting for a frame")]
    Timeout,
    #[error("frame queue closed")]
    Closed,
}

struct Envelope {
    generation: u64,
    item: QueueItem,
}

/// Constructor namespace for the bounded queue
pub struct FrameQueue;

impl FrameQueue {
    /// Create a queue holding at most `capacity` items
    pub fn bounded(capacity: usize) -> (FrameSender, FrameReceiver) {
        let (tx, rx) = bounded(capacity.max(1));
        let generation = Arc::new(AtomicU64::new(0));
        (
            FrameSender {
                tx,
                generation: Arc::clone(&generation),
            },
            FrameReceiver { rx, generation },
        )
    }
}

/// Producer handle
pub struct FrameSender {
    tx: Sender<Envelope>,
    generation: Arc<AtomicU64>,
}

impl FrameSender {
    /// Enqueue an item, blocking while the queue is full
    pub fn push(&self, item: QueueItem) -> Result<(), QueueClosed> {
        let generation = self.generation.load(Ordering::Acquire);
        self.tx
            .send(Envelope { generation, item })
            .map_err(|_| QueueClosed)
    }

    /// Invalidate everything currently queued
    ///
    /// Items pushed before the flush are discarded by the receiver without
    /// being returned.
    pub fn flush(&self) {
        let previous = self.generation.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(discarded = self.tx.len(), generation = previous + 1, "Flushed frame queue");
    }

    /// Number of items waiting
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(DEFAULT_QUEUE_CAPACITY)
    }
}

/// Consumer handle
pub struct FrameReceiver {
    rx: Receiver<Envelope>,
    generation: Arc<AtomicU64>,
}

impl FrameReceiver {
    fn is_current(&self, envelope: &Envelope) -> bool {
        envelope.generation == self.generation.load(Ordering::Acquire)
    }

    /// Block until an item arrives; `None` once the queue is closed and drained
    pub fn pop(&self) -> Option<QueueItem> {
        loop {
            let envelope = self.rx.recv().ok()?;
            if self.is_current(&envelope) {
                return Some(envelope.item);
            }
        }
    }

    /// Like `pop`, but gives up after `timeout`
    pub fn pop_timeout(&self, timeout: Duration) -> Result<QueueItem, PopError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.rx.recv_deadline(deadline) {
                Ok(envelope) if self.is_current(&envelope) => return Ok(envelope.item),
                Ok(_) => continue,
                Err(RecvTimeoutError::Timeout) => return Err(PopError::Timeout),
                Err(RecvTimeoutError::Disconnected) => return Err(PopError::Closed),
            }
        }
    }

    /// Number of items waiting, including ones a flush will discard
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
