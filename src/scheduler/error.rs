//! Error types for the scheduler module

use thiserror::Error;

use super::task::TaskId;

/// Errors raised by a [`Timer`](super::timer::Timer)
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerError {
    /// The timer was released, usually by a concurrent cancel.
    #[error("Timer already released")]
    Released,
}

/// Errors raised by the schedule service
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Task id {id} is already registered (task '{name}')")]
    DuplicateTask { id: TaskId, name: String },

    #[error("Timer error: {0}")]
    Timer(#[from] TimerError),
}

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Returns true when the error chain contains [`TimerError::Released`].
///
/// Such failures come from a task being cancelled while its action was
/// touching the timer and are expected, not reportable.
pub fn is_disposal_race(error: &anyhow::Error) -> bool {
    error
        .chain()
        .any(|cause| matches!(cause.downcast_ref::<TimerError>(), Some(TimerError::Released)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_released_is_disposal_race() {
        let err = anyhow::Error::from(TimerError::Released);
        assert!(is_disposal_race(&err));

        let wrapped = err.context("re-arming heartbeat");
        assert!(is_disposal_race(&wrapped));
    }

    #[test]
    fn test_scheduler_timer_error_is_disposal_race() {
        let err = anyhow::Error::from(SchedulerError::Timer(TimerError::Released));
        assert!(is_disposal_race(&err));
    }

    #[test]
    fn test_other_errors_are_not_disposal_races() {
        let err = anyhow::anyhow!("service refused to start");
        assert!(!is_disposal_race(&err));

        let dup = anyhow::Error::from(SchedulerError::DuplicateTask {
            id: TaskId::from_raw(3),
            name: "probe".to_string(),
        });
        assert!(!is_disposal_race(&dup));
    }
}
