//! Coalesced-trigger job queues for the two cooperating threads

use crate::message_loop::MessageLoop;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Which of the two cooperating threads a job targets.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ThreadLane {
    Ui,
    Main,
}

/// An opaque unit of work; consumed exactly once, never retried.
pub type Job = Box<dyn FnOnce() + Send>;

struct SchedulerInner {
    lane: ThreadLane,
    queue: Mutex<VecDeque<Job>>,
    trigger_pending: AtomicBool,
    message_loop: Arc<dyn MessageLoop>,
}

/// One lane's queue. Jobs scheduled from the same source thread run on the
/// target thread in schedule order; there is no ordering guarantee across
/// different source threads.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    pub fn new(lane: ThreadLane, message_loop: Arc<dyn MessageLoop>) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                lane,
                queue: Mutex::new(VecDeque::new()),
                trigger_pending: AtomicBool::new(false),
                message_loop,
            }),
        }
    }

    pub fn lane(&self) -> ThreadLane {
        self.inner.lane
    }

    /// Enqueue `job`; never blocks, never fails. If no drain is pending for
    /// this lane, ask the owning thread's loop to drain once, soon.
    pub fn schedule(&self, job: Job) {
        self.inner.queue.lock().push_back(job);
        if !self.inner.trigger_pending.swap(true, Ordering::AcqRel) {
            let scheduler = self.clone();
            self.inner
                .message_loop
                .post(Box::new(move || scheduler.drain()));
        }
    }

    /// Run every job enqueued up to this point, in FIFO order, on the
    /// calling thread. Jobs enqueued while the batch runs are left for the
    /// next trigger, so one drain pass has bounded latency.
    pub fn drain(&self) {
        self.inner.trigger_pending.store(false, Ordering::Release);
        let batch: Vec<Job> = {
            let mut queue = self.inner.queue.lock();
            queue.drain(..).collect()
        };
        for job in batch {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(job)) {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                tracing::error!(lane = ?self.inner.lane, %message, "scheduled job failed");
            }
        }
    }
}

/// The two lanes together: one queue drained on the UI thread, one on the
/// main thread.
#[derive(Clone)]
pub struct DualScheduler {
    ui: Scheduler,
    main: Scheduler,
}

impl DualScheduler {
    pub fn new(ui_loop: Arc<dyn MessageLoop>, main_loop: Arc<dyn MessageLoop>) -> Self {
        Self {
            ui: Scheduler::new(ThreadLane::Ui, ui_loop),
            main: Scheduler::new(ThreadLane::Main, main_loop),
        }
    }

    pub fn schedule_on(&self, lane: ThreadLane, job: Job) {
        match lane {
            ThreadLane::Ui => self.ui.schedule(job),
            ThreadLane::Main => self.main.schedule(job),
        }
    }

    pub fn schedule_on_ui(&self, job: Job) {
        self.ui.schedule(job);
    }

    pub fn schedule_on_main(&self, job: Job) {
        self.main.schedule(job);
    }

    pub fn ui(&self) -> &Scheduler {
        &self.ui
    }

    pub fn main(&self) -> &Scheduler {
        &self.main
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message_loop::{EventLoopThread, Task};
    use parking_lot::Mutex as PlMutex;
    use std::sync::atomic::AtomicUsize;

    /// Records posted drain requests instead of running them, so tests can
    /// observe trigger coalescing and drive drains by hand.
    #[derive(Default)]
    struct ManualLoop {
        posted: PlMutex<Vec<Task>>,
    }

    impl ManualLoop {
        fn run_all(&self) {
            let tasks: Vec<Task> = std::mem::take(&mut *self.posted.lock());
            for task in tasks {
                task();
            }
        }

        fn posted_count(&self) -> usize {
            self.posted.lock().len()
        }
    }

    impl MessageLoop for ManualLoop {
        fn post(&self, task: Task) {
            self.posted.lock().push(task);
        }
    }

    #[test]
    fn test_trigger_is_coalesced() {
        let message_loop = Arc::new(ManualLoop::default());
        let scheduler = Scheduler::new(ThreadLane::Ui, message_loop.clone());
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let counter = counter.clone();
            scheduler.schedule(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }
        // Ten schedule calls, one drain request.
        assert_eq!(message_loop.posted_count(), 1);

        message_loop.run_all();
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_jobs_enqueued_during_drain_wait_for_next_pass() {
        let message_loop = Arc::new(ManualLoop::default());
        let scheduler = Scheduler::new(ThreadLane::Ui, message_loop.clone());
        let order = Arc::new(PlMutex::new(Vec::new()));

        {
            let order = order.clone();
            let reentrant = scheduler.clone();
            scheduler.schedule(Box::new(move || {
                order.lock().push("first");
                let order = order.clone();
                reentrant.schedule(Box::new(move || {
                    order.lock().push("second");
                }));
            }));
        }

        message_loop.run_all();
        assert_eq!(*order.lock(), vec!["first"]);

        // The re-entrant schedule produced a fresh trigger.
        assert_eq!(message_loop.posted_count(), 1);
        message_loop.run_all();
        assert_eq!(*order.lock(), vec!["first", "second"]);
    }

    #[test]
    fn test_failing_job_does_not_abort_the_batch() {
        let message_loop = Arc::new(ManualLoop::default());
        let scheduler = Scheduler::new(ThreadLane::Main, message_loop.clone());
        let counter = Arc::new(AtomicUsize::new(0));

        scheduler.schedule(Box::new(|| panic!("job blew up")));
        {
            let counter = counter.clone();
            scheduler.schedule(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }

        message_loop.run_all();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fifo_across_threads() {
        let ui_loop = Arc::new(EventLoopThread::spawn("ui"));
        let scheduler = Scheduler::new(ThreadLane::Ui, ui_loop);
        let seen = Arc::new(PlMutex::new(Vec::new()));
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);

        for i in 0..100u32 {
            let seen = seen.clone();
            scheduler.schedule(Box::new(move || {
                seen.lock().push(i);
            }));
        }
        scheduler.schedule(Box::new(move || {
            let _ = done_tx.send(());
        }));

        done_rx
            .recv_timeout(std::time::Duration::from_secs(5))
            .unwrap();
        let seen = seen.lock();
        assert_eq!(seen.len(), 100);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }
}
