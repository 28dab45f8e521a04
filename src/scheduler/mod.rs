//! Scheduler Module
//!
//! Recurring-task scheduler used by the service monitor. Each task gets its
//! own re-armable timer; the schedule service guarantees that a task's action
//! never overlaps itself, survives failing actions, and can be cancelled at
//! any time without waiting for an in-flight run.

pub mod error;
pub mod registry;
pub mod service;
pub mod task;
pub mod timer;


pub use error::{SchedulerError, SchedulerResult, TimerError};
pub use registry::TaskRegistry;
pub use service::{FireOutcome, ScheduleService};
pub use task::{TaskAction, TaskId, TaskRecord, TaskSnapshot, TaskState};
pub use timer::{Timer, TimerCallback};
