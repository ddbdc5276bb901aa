//! Host scheduler seam
//!
//! A running layout asks its host for one callback per frame. The host later
//! calls `run_frame` on the layout, which executes a small batch of ticks and
//! asks again if it is still running.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Per-frame callback provider, e.g. a window event loop or a test driver
pub trait HostScheduler {
    /// Ask for `run_frame` to be called on the next frame
    fn request_frame(&mut self);
}

impl<F: FnMut()> HostScheduler for F {
    fn request_frame(&mut self) {
        self()
    }
}

/// Counts outstanding frame requests; clones share the same counter
#[derive(Debug, Clone, Default)]
pub struct FrameQueue {
    pending: Arc<AtomicUsize>,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames requested and not yet taken
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Consume one pending request, returning whether there was one
    pub fn take(&self) -> bool {
        self.pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl HostScheduler for FrameQueue {
    fn request_frame(&mut self) {
        self.pending.fetch_add(1, Ordering::AcqRel);
    }
}
