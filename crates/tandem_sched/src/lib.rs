//! Tandem dual scheduler
//!
//! Moves opaque jobs between the two cooperating threads. Each lane owns a
//! concurrent FIFO with coalesced-trigger semantics: any number of schedule
//! calls before a drain produce exactly one drain request on the owning
//! thread's message loop. Scheduling never blocks and never fails; a job
//! that panics is caught at the drain boundary and logged.

mod message_loop;
mod scheduler;

pub use message_loop::{EventLoopThread, MessageLoop, Task};
pub use scheduler::{DualScheduler, Job, Scheduler, ThreadLane};
