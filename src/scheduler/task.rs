//! Task records
//!
//! A [`TaskRecord`] is the passive description of one scheduled unit of work.
//! Its lifecycle is an atomic state machine driven only by the schedule
//! service: the firing protocol moves it between `Armed` and `Firing`, and
//! cancellation moves it to `Stopped`.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::timer::Timer;

/// Action run on every firing of a task
pub type TaskAction = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync + 'static>;

/// Identity of a scheduled task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(u64);

impl TaskId {
    /// Returned by `schedule` when the task could not be registered.
    /// Never allocated to a real task.
    pub const INVALID: TaskId = TaskId(0);

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum TaskState {
    /// Registered, timer not armed yet
    Created = 0,
    /// Waiting for the next timer fire
    Armed = 1,
    /// Action is executing
    Firing = 2,
    /// Cancelled; terminal
    Stopped = 3,
}

impl TaskState {
    /// Check if transition to the target state is valid
    pub fn can_transition_to(&self, target: TaskState) -> bool {
        match (self, target) {
            (TaskState::Created, TaskState::Armed) => true,
            (TaskState::Armed, TaskState::Firing) => true,
            (TaskState::Firing, TaskState::Armed) => true,
            // Cancellation may land at any point before the terminal state
            (TaskState::Stopped, TaskState::Stopped) => false,
            (_, TaskState::Stopped) => true,
            _ => false,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => TaskState::Created,
            1 => TaskState::Armed,
            2 => TaskState::Firing,
            _ => TaskState::Stopped,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Created => write!(f, "created"),
            TaskState::Armed => write!(f, "armed"),
            TaskState::Firing => write!(f, "firing"),
            TaskState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Atomic cell holding a [`TaskState`]
#[derive(Debug)]
pub struct AtomicTaskState(AtomicU8);

impl AtomicTaskState {
    pub fn new(state: TaskState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn load(&self) -> TaskState {
        TaskState::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Move from `from` to `to` if the cell still holds `from`.
    ///
    /// On failure returns the state actually observed.
    pub fn transition(&self, from: TaskState, to: TaskState) -> Result<(), TaskState> {
        debug_assert!(from.can_transition_to(to));
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(TaskState::from_u8)
    }

    /// Enter `Stopped`. Returns the previous state.
    pub fn stop(&self) -> TaskState {
        TaskState::from_u8(self.0.swap(TaskState::Stopped as u8, Ordering::SeqCst))
    }
}

/// One scheduled unit of work
pub struct TaskRecord {
    id: TaskId,
    name: String,
    action: TaskAction,
    due_time: Duration,
    period: Duration,
    state: AtomicTaskState,
    timer: Timer,
    runs: AtomicU64,
    failures: AtomicU64,
    last_run: Mutex<Option<DateTime<Utc>>>,
}

impl TaskRecord {
    pub fn new(
        id: TaskId,
        name: impl Into<String>,
        action: TaskAction,
        due_time: Duration,
        period: Duration,
        timer: Timer,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            action,
            due_time,
            period,
            state: AtomicTaskState::new(TaskState::Created),
            timer,
            runs: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            last_run: Mutex::new(None),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn action(&self) -> &TaskAction {
        &self.action
    }

    pub fn due_time(&self) -> Duration {
        self.due_time
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn state(&self) -> TaskState {
        self.state.load()
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == TaskState::Stopped
    }

    pub(crate) fn lifecycle(&self) -> &AtomicTaskState {
        &self.state
    }

    pub(crate) fn timer(&self) -> &Timer {
        &self.timer
    }

    pub(crate) fn record_run(&self) {
        self.runs.fetch_add(1, Ordering::SeqCst);
        *self.last_run.lock() = Some(Utc::now());
    }

    /// When the last invocation finished
    pub fn last_run(&self) -> Option<DateTime<Utc>> {
        *self.last_run.lock()
    }

    pub(crate) fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::SeqCst);
    }

    /// Point-in-time view for diagnostics
    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id,
            name: self.name.clone(),
            due_time_ms: self.due_time.as_millis() as u64,
            period_ms: self.period.as_millis() as u64,
            state: self.state(),
            runs: self.runs.load(Ordering::SeqCst),
            failures: self.failures.load(Ordering::SeqCst),
            last_run: self.last_run(),
        }
    }
}

impl fmt::Debug for TaskRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRecord")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("due_time", &self.due_time)
            .field("period", &self.period)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Diagnostic view of a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub name: String,
    pub due_time_ms: u64,
    pub period_ms: u64,
    pub state: TaskState,
    /// Completed invocations, successful or not
    pub runs: u64,
    /// Invocations that returned an error or panicked
    pub failures: u64,
    pub last_run: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_sentinel() {
        assert!(!TaskId::INVALID.is_valid());
        assert!(TaskId::from_raw(1).is_valid());
        assert_eq!(TaskId::from_raw(42).to_string(), "42");
        assert_eq!(TaskId::from_raw(42).as_u64(), 42);
    }

    #[test]
    fn test_task_state_transitions() {
        assert!(TaskState::Created.can_transition_to(TaskState::Armed));
        assert!(TaskState::Armed.can_transition_to(TaskState::Firing));
        assert!(TaskState::Firing.can_transition_to(TaskState::Armed));
        assert!(TaskState::Created.can_transition_to(TaskState::Stopped));
        assert!(TaskState::Armed.can_transition_to(TaskState::Stopped));
        assert!(TaskState::Firing.can_transition_to(TaskState::Stopped));

        assert!(!TaskState::Created.can_transition_to(TaskState::Firing));
        assert!(!TaskState::Armed.can_transition_to(TaskState::Created));
        assert!(!TaskState::Stopped.can_transition_to(TaskState::Armed));
        assert!(!TaskState::Stopped.can_transition_to(TaskState::Firing));
        assert!(!TaskState::Stopped.can_transition_to(TaskState::Stopped));
    }

    #[test]
    fn test_atomic_state_transition() {
        let state = AtomicTaskState::new(TaskState::Created);
        assert_eq!(state.transition(TaskState::Created, TaskState::Armed), Ok(()));
        assert_eq!(state.transition(TaskState::Armed, TaskState::Firing), Ok(()));

        // A second firing observes the first one
        assert_eq!(
            state.transition(TaskState::Armed, TaskState::Firing),
            Err(TaskState::Firing)
        );

        assert_eq!(state.stop(), TaskState::Firing);
        assert_eq!(
            state.transition(TaskState::Firing, TaskState::Armed),
            Err(TaskState::Stopped)
        );
        assert_eq!(state.load(), TaskState::Stopped);
    }

    #[test]
    fn test_stop_is_terminal() {
        let state = AtomicTaskState::new(TaskState::Armed);
        assert_eq!(state.stop(), TaskState::Armed);
        assert_eq!(state.stop(), TaskState::Stopped);
        assert_eq!(state.load(), TaskState::Stopped);
    }
}
