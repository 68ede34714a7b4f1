//! Host message-loop seam
//!
//! The scheduler only needs "run this callback on thread X soon" from the
//! host platform. `EventLoopThread` is the in-process implementation used by
//! the demo binary and tests; real hosts adapt their own loops.

use crossbeam_channel::{unbounded, Sender};
use std::thread::JoinHandle;

pub type Task = Box<dyn FnOnce() + Send>;

pub trait MessageLoop: Send + Sync {
    /// Enqueue `task` to run on the loop's thread, soon. Must not block.
    fn post(&self, task: Task);
}

enum LoopMessage {
    Run(Task),
    Shutdown,
}

/// A dedicated OS thread draining posted tasks in order.
pub struct EventLoopThread {
    sender: Sender<LoopMessage>,
    handle: Option<JoinHandle<()>>,
}

impl EventLoopThread {
    pub fn spawn(name: &str) -> Self {
        let (sender, receiver) = unbounded();
        let thread_name = name.to_string();
        let handle = std::thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                while let Ok(message) = receiver.recv() {
                    match message {
                        LoopMessage::Run(task) => task(),
                        LoopMessage::Shutdown => break,
                    }
                }
                tracing::debug!(thread = %thread_name, "event loop stopped");
            })
            .expect("failed to spawn event loop thread");
        Self {
            sender,
            handle: Some(handle),
        }
    }
}

impl MessageLoop for EventLoopThread {
    fn post(&self, task: Task) {
        // The loop may already be shutting down; posting to a stopped loop
        // drops the task, mirroring host loops torn down on live-reload.
        let _ = self.sender.send(LoopMessage::Run(task));
    }
}

impl Drop for EventLoopThread {
    fn drop(&mut self) {
        let _ = self.sender.send(LoopMessage::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_posted_tasks_run_in_order() {
        let event_loop = EventLoopThread::spawn("test-loop");
        let log = Arc::new(AtomicUsize::new(0));
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);

        for i in 1..=3 {
            let log = log.clone();
            event_loop.post(Box::new(move || {
                // Each task only advances the counter if it runs in order.
                let _ = log.compare_exchange(i - 1, i, Ordering::SeqCst, Ordering::SeqCst);
            }));
        }
        event_loop.post(Box::new(move || {
            let _ = done_tx.send(());
        }));

        done_rx
            .recv_timeout(std::time::Duration::from_secs(5))
            .unwrap();
        assert_eq!(log.load(Ordering::SeqCst), 3);
    }
}
