//! Task state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a task.
///
/// State transitions:
/// - PENDING -> STARTED -> SUCCESS | FAILURE | REVOKED
/// - PENDING -> FAILURE (could not be enqueued / no handler on the worker)
/// - PENDING -> REVOKED (revoked before any worker picked it up)
///
/// Terminal states never transition again. Serialized as
/// SCREAMING_SNAKE_CASE (`"PENDING"`, `"SUCCESS"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Submitted, waiting in a queue (or unknown, see `TaskView`).
    Pending,

    /// Picked up by a worker and executing.
    Started,

    /// Work function returned a result.
    Success,

    /// Work function faulted, hit the hard time limit, or could not be run.
    Failure,

    /// Revoked from outside before it finished.
    Revoked,
}

impl TaskState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Success | TaskState::Failure | TaskState::Revoked
        )
    }

    /// Is `self -> next` an allowed transition?
    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Pending, Started)
                | (Pending, Failure)
                | (Pending, Revoked)
                | (Started, Success)
                | (Started, Failure)
                | (Started, Revoked)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Pending => "PENDING",
            TaskState::Started => "STARTED",
            TaskState::Success => "SUCCESS",
            TaskState::Failure => "FAILURE",
            TaskState::Revoked => "REVOKED",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
