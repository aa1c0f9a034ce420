//! TaskContext - work function に渡す実行コンテキスト

use tokio_util::sync::CancellationToken;

use crate::domain::{TaskId, TaskType, WorkerName};

/// Everything a work function gets to see about its own execution.
///
/// The soft time limit is cooperative: the worker cancels `soft_limit` when
/// it passes and the work function decides how to wind down. The hard limit
/// is enforced outside the function and cannot be observed here.
#[derive(Debug, Clone)]
pub struct TaskContext {
    task_id: TaskId,
    task_type: TaskType,
    worker: WorkerName,
    payload: serde_json::Value,
    soft_limit: CancellationToken,
}

impl TaskContext {
    pub fn new(
        task_id: TaskId,
        task_type: TaskType,
        worker: WorkerName,
        payload: serde_json::Value,
        soft_limit: CancellationToken,
    ) -> Self {
        Self {
            task_id,
            task_type,
            worker,
            payload,
            soft_limit,
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn task_type(&self) -> &TaskType {
        &self.task_type
    }

    pub fn worker(&self) -> &WorkerName {
        &self.worker
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    pub fn soft_limit_reached(&self) -> bool {
        self.soft_limit.is_cancelled()
    }

    /// Resolves once the soft time limit has passed.
    pub async fn soft_limit_expired(&self) {
        self.soft_limit.cancelled().await
    }

    pub fn soft_limit_token(&self) -> &CancellationToken {
        &self.soft_limit
    }
}
