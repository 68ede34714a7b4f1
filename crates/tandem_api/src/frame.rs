//! Animation-frame callback queue
//!
//! Worklets registered through `request_animation_frame` are buffered here;
//! the first registration after a drain asks the host for a render, further
//! ones coalesce into the same request. Draining takes only the current
//! batch, so a callback re-registering itself runs on the next frame, not
//! the same one.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tandem_core::Shareable;

pub struct FrameQueue {
    callbacks: Mutex<Vec<Arc<Shareable>>>,
    render_requested: AtomicBool,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self {
            callbacks: Mutex::new(Vec::new()),
            render_requested: AtomicBool::new(false),
        }
    }

    /// Buffer `callback`. Returns true when the caller must issue a render
    /// request (the first push since the last drain).
    pub fn push(&self, callback: Arc<Shareable>) -> bool {
        self.callbacks.lock().push(callback);
        !self.render_requested.swap(true, Ordering::AcqRel)
    }

    /// Take the current batch. The request flag clears first so callbacks
    /// pushed while the batch runs trigger a fresh render request.
    pub fn take_batch(&self) -> Vec<Arc<Shareable>> {
        self.render_requested.store(false, Ordering::Release);
        std::mem::take(&mut *self.callbacks.lock())
    }
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::new()
    }
}
