//! Schedule Service
//!
//! Runs actions on a recurring timer. Each task owns one [`Timer`]; every
//! fire goes through the protocol in [`fire`]:
//!
//! 1. look the task up (absent means cancelled)
//! 2. bail out if stopped
//! 3. disarm the timer if the fire's generation is still current, then claim
//!    the task (`Armed -> Firing`)
//! 4. bail out if the fire is stale or the claim fails: stopped, or another
//!    fire is still running
//! 5. run the action, catching errors and panics
//! 6. release the claim (`Firing -> Armed`) and re-arm for the next period
//!
//! Disarming before the action and re-arming after it is what keeps a slow
//! action from overlapping itself. Fires the timer had already dispatched
//! before it was disarmed carry an old generation and are dropped, so ticks
//! missed while the blocking pool was busy never replay as a burst.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::runtime::Handle;

use super::error::{is_disposal_race, SchedulerError, SchedulerResult, TimerError};
use super::registry::TaskRegistry;
use super::task::{TaskAction, TaskId, TaskRecord, TaskSnapshot, TaskState};
use super::timer::{Timer, MIN_TIMER_PERIOD};

/// What a single fire did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    /// Task no longer registered
    Missing,
    /// Task was stopped before the action began
    Stopped,
    /// Dispatched by an arm that has since been replaced
    Stale,
    /// Another invocation of the same task was still running
    Overlapped,
    /// Action returned `Ok`
    Completed,
    /// Action returned an error or panicked
    Failed,
}

/// Recurring task scheduler
pub struct ScheduleService {
    registry: Arc<TaskRegistry>,
    runtime: Handle,
}

impl ScheduleService {
    /// Create a scheduler whose timers run on `runtime`
    pub fn new(runtime: Handle) -> Self {
        Self {
            registry: Arc::new(TaskRegistry::new()),
            runtime,
        }
    }

    /// Schedule `action` to run after `due_time` and then every `period`.
    ///
    /// Returns [`TaskId::INVALID`] if the task could not be registered.
    pub fn schedule<F>(
        &self,
        name: impl Into<String>,
        action: F,
        due_time: Duration,
        period: Duration,
    ) -> TaskId
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.schedule_action(name, Arc::new(action), due_time, period)
    }

    /// Same as [`schedule`](Self::schedule) for an already shared action
    pub fn schedule_action(
        &self,
        name: impl Into<String>,
        action: TaskAction,
        due_time: Duration,
        period: Duration,
    ) -> TaskId {
        match self.try_schedule_action(name, action, due_time, period) {
            Ok(id) => id,
            Err(e) => {
                tracing::error!("Schedule task failed: {}", e);
                TaskId::INVALID
            }
        }
    }

    /// Schedule a task, surfacing registration failures as errors
    pub fn try_schedule<F>(
        &self,
        name: impl Into<String>,
        action: F,
        due_time: Duration,
        period: Duration,
    ) -> SchedulerResult<TaskId>
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.try_schedule_action(name, Arc::new(action), due_time, period)
    }

    fn try_schedule_action(
        &self,
        name: impl Into<String>,
        action: TaskAction,
        due_time: Duration,
        period: Duration,
    ) -> SchedulerResult<TaskId> {
        let name = name.into();
        let id = self.registry.allocate();

        let registry = Arc::downgrade(&self.registry);
        let timer = Timer::new(&self.runtime, Arc::new(move |generation: u64| on_timer(&registry, id, generation)));

        let record = Arc::new(TaskRecord::new(id, name, action, due_time, period, timer));
        if !self.registry.insert(Arc::clone(&record)) {
            record.lifecycle().stop();
            record.timer().release();
            return Err(SchedulerError::DuplicateTask {
                id,
                name: record.name().to_string(),
            });
        }

        // A cancel may already have stopped the task; then there is nothing to arm
        if record.lifecycle().transition(TaskState::Created, TaskState::Armed).is_ok() {
            match record.timer().arm(due_time, period) {
                Ok(()) | Err(TimerError::Released) => {}
            }
        }

        tracing::debug!(
            task = record.name(),
            task_id = %id,
            due_ms = due_time.as_millis() as u64,
            period_ms = period.as_millis() as u64,
            "Task scheduled"
        );

        Ok(id)
    }

    /// Stop a task. Unknown or already cancelled ids are ignored.
    ///
    /// Does not wait for a running invocation; it finishes, but no further
    /// invocation starts.
    pub fn cancel(&self, id: TaskId) {
        if let Some(record) = self.registry.remove(id) {
            retire(&record);
            tracing::debug!(task = record.name(), task_id = %id, "Task cancelled");
        }
    }

    /// Cancel every task
    pub fn shutdown(&self) {
        let records = self.registry.drain();
        for record in &records {
            retire(record);
        }
        if !records.is_empty() {
            tracing::debug!(count = records.len(), "Schedule service shut down");
        }
    }

    pub fn is_scheduled(&self, id: TaskId) -> bool {
        self.registry.contains(id)
    }

    pub fn task_count(&self) -> usize {
        self.registry.len()
    }

    pub fn snapshot(&self, id: TaskId) -> Option<TaskSnapshot> {
        self.registry.lookup(id).map(|record| record.snapshot())
    }

    /// Snapshots of all live tasks, ordered by id
    pub fn snapshots(&self) -> Vec<TaskSnapshot> {
        self.registry
            .ids()
            .into_iter()
            .filter_map(|id| self.snapshot(id))
            .collect()
    }

    pub(crate) fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }
}

impl Drop for ScheduleService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ScheduleService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduleService")
            .field("tasks", &self.registry.len())
            .finish()
    }
}

/// Stop a record that has already left the registry
fn retire(record: &TaskRecord) {
    record.lifecycle().stop();
    let _ = record.timer().disarm();
    record.timer().release();
}

/// Timer callback. Runs on the blocking pool.
fn on_timer(registry: &Weak<TaskRegistry>, id: TaskId, generation: u64) {
    if let Some(registry) = registry.upgrade() {
        fire(&registry, id, generation);
    }
}

/// Run one fire of task `id`, dispatched by timer generation `generation`
pub(crate) fn fire(registry: &TaskRegistry, id: TaskId, generation: u64) -> FireOutcome {
    let Some(record) = registry.lookup(id) else {
        return FireOutcome::Missing;
    };

    if record.is_stopped() {
        return FireOutcome::Stopped;
    }

    match record.timer().disarm_if_current(generation) {
        Ok(true) => {}
        Ok(false) => {
            tracing::trace!(task = record.name(), task_id = %id, "Dropping stale fire");
            return FireOutcome::Stale;
        }
        Err(TimerError::Released) => return FireOutcome::Stopped,
    }

    match record.lifecycle().transition(TaskState::Armed, TaskState::Firing) {
        Ok(()) => {}
        Err(TaskState::Stopped) | Err(TaskState::Created) => return FireOutcome::Stopped,
        Err(_) => {
            tracing::trace!(task = record.name(), task_id = %id, "Skipping overlapping fire");
            return FireOutcome::Overlapped;
        }
    }

    let outcome = invoke(&record);

    if record
        .lifecycle()
        .transition(TaskState::Firing, TaskState::Armed)
        .is_ok()
    {
        let next_due = record.period().max(MIN_TIMER_PERIOD);
        match record.timer().arm(next_due, record.period()) {
            Ok(()) | Err(TimerError::Released) => {}
        }
    }

    outcome
}

fn invoke(record: &TaskRecord) -> FireOutcome {
    let action = Arc::clone(record.action());
    let result = panic::catch_unwind(AssertUnwindSafe(|| action()));
    record.record_run();

    match result {
        Ok(Ok(())) => FireOutcome::Completed,
        Ok(Err(e)) if is_disposal_race(&e) => {
            tracing::trace!(task = record.name(), "Task hit a released timer: {}", e);
            FireOutcome::Completed
        }
        Ok(Err(e)) => {
            record.record_failure();
            tracing::error!(
                task = record.name(),
                due_ms = record.due_time().as_millis() as u64,
                period_ms = record.period().as_millis() as u64,
                "Task has exception: {:#}",
                e
            );
            FireOutcome::Failed
        }
        Err(payload) => {
            record.record_failure();
            tracing::error!(
                task = record.name(),
                due_ms = record.due_time().as_millis() as u64,
                period_ms = record.period().as_millis() as u64,
                "Task panicked: {}",
                panic_message(payload.as_ref())
            );
            FireOutcome::Failed
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
