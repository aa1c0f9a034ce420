//! Read models returned to clients: a single task's status and the
//! pending-work rows.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::record::TaskRecord;
use super::{TaskId, TaskState, WorkerName};

pub const PENDING_MESSAGE: &str = "Task is pending or unknown";
pub const REVOKED_MESSAGE: &str = "Task was revoked";

/// Status of one task as seen by a client.
///
/// A never-submitted id and an evicted id both look exactly like a task that
/// is still queued: state PENDING with `PENDING_MESSAGE`. The status route is
/// unauthenticated and must not tell callers which ids exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskView {
    pub task_id: TaskId,
    pub state: TaskState,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker: Option<WorkerName>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TaskView {
    /// Build the client view; `None` means the store has no record.
    pub fn from_record(task_id: TaskId, record: Option<&TaskRecord>) -> Self {
        let mut view = Self {
            task_id,
            state: TaskState::Pending,
            result: None,
            error: None,
            worker: None,
            message: None,
        };
        let Some(record) = record else {
            view.message = Some(PENDING_MESSAGE.to_string());
            return view;
        };

        view.state = record.state;
        match record.state {
            TaskState::Pending => view.message = Some(PENDING_MESSAGE.to_string()),
            TaskState::Started => view.worker = record.owner_worker.clone(),
            TaskState::Success => {
                view.result = Some(record.result.clone().unwrap_or(serde_json::Value::Null))
            }
            TaskState::Failure => view.error = record.error.clone(),
            TaskState::Revoked => {
                view.message = Some(match &record.revoked_reason {
                    Some(reason) => format!("{REVOKED_MESSAGE}: {reason}"),
                    None => REVOKED_MESSAGE.to_string(),
                })
            }
        }
        view
    }
}

/// Live queue category a worker reports a task under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueCategory {
    /// Currently executing.
    Active,
    /// Claimed with a deferred start (eta in the future).
    Scheduled,
    /// Claimed, waiting for a free execution slot.
    Reserved,
}

impl QueueCategory {
    /// Enumeration order used by the pending aggregator.
    pub const ALL: [QueueCategory; 3] = [
        QueueCategory::Active,
        QueueCategory::Scheduled,
        QueueCategory::Reserved,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            QueueCategory::Active => "active",
            QueueCategory::Scheduled => "scheduled",
            QueueCategory::Reserved => "reserved",
        }
    }
}

impl fmt::Display for QueueCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One (worker, task) pair of outstanding work.
///
/// `category` goes over the wire as `"type"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEntry {
    pub task_id: TaskId,
    pub state: TaskState,
    pub worker: WorkerName,
    #[serde(rename = "type")]
    pub category: QueueCategory,
}
