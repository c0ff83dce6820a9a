//! Bounded hand-off of integrated frames to the writer thread.
//!
//! The capture path pushes, the writer pops. Push, pop and clear each run
//! inside one lock acquisition, so depth checks and dequeues never tear.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use thiserror::Error;

use crate::integration::IntegratedFrame;

/// Default queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Errors returned by the recording queue.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The writer is not keeping up. Recording must be aborted.
    #[error("recording queue capacity of {capacity} frames exceeded")]
    CapacityExceeded {
        /// Queue capacity in frames.
        capacity: usize,
    },
    /// The queue no longer accepts frames.
    #[error("recording queue is closed")]
    Closed,
}

struct Inner {
    frames: VecDeque<IntegratedFrame>,
    closed: bool,
}

/// FIFO of frames awaiting the writer.
pub struct RecordingQueue {
    inner: Mutex<Inner>,
    available: Condvar,
    capacity: usize,
}

impl RecordingQueue {
    /// Creates an open queue holding at most `capacity` frames.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                frames: VecDeque::with_capacity(capacity.min(DEFAULT_QUEUE_CAPACITY)),
                closed: false,
            }),
            available: Condvar::new(),
            capacity,
        }
    }

    /// Appends a frame at the tail and returns the resulting depth.
    pub fn push(&self, frame: IntegratedFrame) -> Result<usize, QueueError> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(QueueError::Closed);
        }
        if inner.frames.len() >= self.capacity {
            return Err(QueueError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        inner.frames.push_back(frame);
        let depth = inner.frames.len();
        drop(inner);

        self.available.notify_one();
        Ok(depth)
    }

    /// Removes the frame at the head, if any.
    pub fn pop(&self) -> Option<IntegratedFrame> {
        self.inner.lock().frames.pop_front()
    }

    /// Waits for the next frame.
    ///
    /// Returns `None` only once the queue is closed and fully drained.
    pub fn pop_blocking(&self) -> Option<IntegratedFrame> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(frame) = inner.frames.pop_front() {
                return Some(frame);
            }
            if inner.closed {
                return None;
            }
            self.available.wait(&mut inner);
        }
    }

    /// Discards all pending frames and returns how many were dropped.
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let dropped = inner.frames.len();
        inner.frames.clear();
        dropped
    }

    /// Reopens the queue empty, ready for a new recording.
    pub fn reset(&self) -> usize {
        let mut inner = self.inner.lock();
        let dropped = inner.frames.len();
        inner.frames.clear();
        inner.closed = false;
        dropped
    }

    /// Stops accepting frames. Pending frames stay available to pop.
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.available.notify_all();
    }

    /// Returns true if the queue no longer accepts frames.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Current number of pending frames.
    pub fn len(&self) -> usize {
        self.inner.lock().frames.len()
    }

    /// Returns true if no frame is pending.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().frames.is_empty()
    }

    /// Maximum number of pending frames.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for RecordingQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}
