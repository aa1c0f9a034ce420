//! Task record: what the task store holds per task id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::TransitionError;
use super::{TaskId, TaskState, TaskType, WorkerName};

/// Worker-side execution metadata.
///
/// Kept for a shorter retention window than the record itself; once it is
/// dropped the record still answers status queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMeta {
    pub worker: WorkerName,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Terminal outcome reported for a task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Succeeded(serde_json::Value),
    Failed(String),
    Revoked(Option<String>),
}

impl TaskOutcome {
    pub fn state(&self) -> TaskState {
        match self {
            TaskOutcome::Succeeded(_) => TaskState::Success,
            TaskOutcome::Failed(_) => TaskState::Failure,
            TaskOutcome::Revoked(_) => TaskState::Revoked,
        }
    }
}

/// Metadata + outcome for one task.
///
/// Design:
/// - Every state change goes through `mark_started` or `finish`, which check the
///   state machine first, so a terminal record is never mutated again.
/// - `result` / `error` / `revoked_reason` are only set together with the
///   matching terminal state.
/// - `owner_worker` is only set while STARTED.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub task_type: TaskType,
    pub state: TaskState,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_worker: Option<WorkerName>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionMeta>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    /// A freshly submitted task (PENDING).
    pub fn new(task_id: TaskId, task_type: TaskType, now: DateTime<Utc>) -> Self {
        Self {
            task_id,
            task_type,
            state: TaskState::Pending,
            result: None,
            error: None,
            revoked_reason: None,
            owner_worker: None,
            execution: None,
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    fn transition(&mut self, next: TaskState, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if !self.state.can_transition_to(next) {
            return Err(TransitionError {
                task_id: self.task_id,
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        self.updated_at = now;
        if next.is_terminal() {
            self.finished_at = Some(now);
            self.owner_worker = None;
            if let Some(meta) = self.execution.as_mut() {
                meta.finished_at = Some(now);
            }
        }
        Ok(())
    }

    /// Worker picked the task up.
    pub fn mark_started(
        &mut self,
        worker: &WorkerName,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.transition(TaskState::Started, now)?;
        self.owner_worker = Some(worker.clone());
        self.execution = Some(ExecutionMeta {
            worker: worker.clone(),
            started_at: now,
            finished_at: None,
        });
        Ok(())
    }

    /// Apply a terminal outcome.
    pub fn finish(&mut self, outcome: TaskOutcome, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.transition(outcome.state(), now)?;
        match outcome {
            TaskOutcome::Succeeded(result) => self.result = Some(result),
            TaskOutcome::Failed(error) => self.error = Some(error),
            TaskOutcome::Revoked(reason) => self.revoked_reason = reason,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use ulid::Ulid;

    fn record() -> TaskRecord {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        TaskRecord::new(TaskId::from_ulid(Ulid::new()), TaskType::new("test"), now)
    }

    #[test]
    fn started_sets_owner_and_execution_meta() {
        let mut r = record();
        let worker = WorkerName::new("worker1@host");
        let now = r.created_at + chrono::Duration::seconds(1);

        r.mark_started(&worker, now).unwrap();

        assert_eq!(r.state, TaskState::Started);
        assert_eq!(r.owner_worker.as_ref(), Some(&worker));
        let meta = r.execution.as_ref().unwrap();
        assert_eq!(meta.started_at, now);
        assert_eq!(meta.finished_at, None);
    }

    #[test]
    fn success_clears_owner_and_keeps_result() {
        let mut r = record();
        let worker = WorkerName::new("worker1@host");
        r.mark_started(&worker, r.created_at).unwrap();

        let done = r.created_at + chrono::Duration::seconds(10);
        r.finish(TaskOutcome::Succeeded(json!("R")), done).unwrap();

        assert_eq!(r.state, TaskState::Success);
        assert_eq!(r.result, Some(json!("R")));
        assert_eq!(r.error, None);
        assert_eq!(r.owner_worker, None);
        assert_eq!(r.finished_at, Some(done));
        assert_eq!(r.execution.unwrap().finished_at, Some(done));
    }

    #[test]
    fn terminal_record_is_not_mutated() {
        let mut r = record();
        r.finish(TaskOutcome::Revoked(Some("operator".into())), r.created_at)
            .unwrap();
        let snapshot = r.clone();

        let err = r
            .finish(TaskOutcome::Succeeded(json!(1)), r.created_at)
            .unwrap_err();
        assert_eq!(err.from, TaskState::Revoked);
        assert_eq!(err.to, TaskState::Success);

        let err = r
            .mark_started(&WorkerName::new("w"), r.created_at)
            .unwrap_err();
        assert_eq!(err.to, TaskState::Started);

        assert_eq!(r, snapshot);
    }

    #[test]
    fn pending_cannot_succeed_without_starting() {
        let mut r = record();
        assert!(r.finish(TaskOutcome::Succeeded(json!(null)), r.created_at).is_err());
        assert_eq!(r.state, TaskState::Pending);
    }
}
