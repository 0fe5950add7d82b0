//! Bounded frame hand-off between the source and the worker.
//!
//! The queue never blocks either side. When it is full a push discards
//! everything already queued before inserting, and a pop takes the newest
//! frame and discards anything older. The consumer therefore always works on
//! the freshest frame available and lag never builds up.

use crate::frame::Frame;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

/// Default number of frames held
pub const DEFAULT_QUEUE_CAPACITY: usize = 2;

/// Freshest-frame-wins bounded queue
#[derive(Debug)]
pub struct FrameQueue {
    frames: Mutex<VecDeque<Frame>>,
    capacity: usize,
    pushed: AtomicU64,
    dropped: AtomicU64,
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl FrameQueue {
    /// Create a queue holding at most `capacity` frames (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            pushed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Insert a frame, discarding stale frames if the queue is full
    pub fn push(&self, frame: Frame) {
        let mut frames = self.frames.lock();
        if frames.len() >= self.capacity {
            let stale = frames.len() as u64;
            frames.clear();
            self.dropped.fetch_add(stale, Ordering::Relaxed);
            tracing::trace!("Frame queue full, discarded {} stale frame(s)", stale);
        }
        frames.push_back(frame);
        self.pushed.fetch_add(1, Ordering::Relaxed);
    }

    /// Take the newest frame, discarding older ones; `None` when empty
    pub fn pop(&self) -> Option<Frame> {
        let mut frames = self.frames.lock();
        let newest = frames.pop_back()?;
        let stale = frames.len() as u64;
        if stale > 0 {
            frames.clear();
            self.dropped.fetch_add(stale, Ordering::Relaxed);
        }
        Some(newest)
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }

    /// Discard all queued frames without counting them as dropped
    pub fn clear(&self) {
        self.frames.lock().clear();
    }

    /// Frames accepted by `push` so far
    pub fn pushed(&self) -> u64 {
        self.pushed.load(Ordering::Relaxed)
    }

    /// Frames discarded without being consumed
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
