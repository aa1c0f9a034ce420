//! TaskStore port - task id → state / result の正本（source of truth）
//!
//! The dispatcher writes the PENDING record, workers write every later
//! transition, and the status / pending queries only read.

use async_trait::async_trait;

use crate::domain::{CoreError, TaskId, TaskOutcome, TaskRecord, WorkerName};

/// TaskStore holds one record per task id.
///
/// # Contract
/// - read-your-writes per task id: after `create` returns, `get` sees the record
/// - state changes go through the record's state machine; a forbidden
///   transition is `CoreError::Transition` and leaves the record untouched
/// - an id that was never created, or was evicted, is `Ok(None)` on `get`
/// - an unreachable backend is `CoreError::BackendUnavailable`, never `Ok(None)`
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a new record. Ids are never reused, so an existing id is an error.
    async fn create(&self, record: TaskRecord) -> Result<(), CoreError>;

    async fn get(&self, task_id: TaskId) -> Result<Option<TaskRecord>, CoreError>;

    /// PENDING -> STARTED, recording the owning worker.
    async fn mark_started(
        &self,
        task_id: TaskId,
        worker: &WorkerName,
    ) -> Result<TaskRecord, CoreError>;

    /// Move to a terminal state.
    async fn finish(&self, task_id: TaskId, outcome: TaskOutcome)
    -> Result<TaskRecord, CoreError>;

    /// Drop whatever is past its retention window. Returns evicted record count.
    async fn purge_expired(&self) -> Result<usize, CoreError>;

    /// Liveness check.
    async fn ping(&self) -> Result<(), CoreError>;
}
