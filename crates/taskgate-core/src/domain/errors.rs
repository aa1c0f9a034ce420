//! Errors - エラー型と分類

use std::time::Duration;

use super::ids::IdParseError;
use super::{TaskId, TaskState, TaskType};

/// A state change the task state machine does not allow.
///
/// The usual cause is a terminal record (e.g. revoked while a worker was
/// still running it).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid transition for {task_id}: {from} -> {to}")]
pub struct TransitionError {
    pub task_id: TaskId,
    pub from: TaskState,
    pub to: TaskState,
}

/// CoreError はドメイン/バックエンド共通のエラー
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Broker or result store unreachable (or too slow to answer).
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("unknown task: {0}")]
    UnknownTask(TaskId),

    #[error("task already exists: {0}")]
    DuplicateTask(TaskId),

    #[error("no handler registered for task_type={0}")]
    UnknownTaskType(TaskType),

    #[error("duplicate handler for task_type={0}")]
    DuplicateHandler(TaskType),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    InvalidTaskId(#[from] IdParseError),

    #[error("invalid rate limit {0:?}")]
    InvalidLimitSpec(String),

    #[error("soft time limit ({soft:?}) must be shorter than hard time limit ({hard:?})")]
    InvalidTimeLimits { soft: Duration, hard: Duration },
}

impl CoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::BackendUnavailable(message.into())
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }
}

/// Error raised by a work function. Stored verbatim as the FAILURE error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct WorkFault {
    message: String,
}

impl WorkFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<serde_json::Error> for WorkFault {
    fn from(err: serde_json::Error) -> Self {
        Self::new(format!("json decode: {err}"))
    }
}
