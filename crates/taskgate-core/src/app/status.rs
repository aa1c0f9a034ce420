//! StatusService - 単一タスクの状態照会（read only）

use std::sync::Arc;
use std::time::Duration;

use super::bounded;
use crate::domain::{CoreError, TaskId, TaskView};
use crate::ports::TaskStore;

pub struct StatusService {
    store: Arc<dyn TaskStore>,
    backend_timeout: Duration,
}

impl StatusService {
    pub fn new(store: Arc<dyn TaskStore>, backend_timeout: Duration) -> Self {
        Self {
            store,
            backend_timeout,
        }
    }

    /// Current view of `task_id`. An absent record (never submitted, or
    /// already evicted) reads as PENDING.
    pub async fn get_status(&self, task_id: TaskId) -> Result<TaskView, CoreError> {
        let record = bounded(self.backend_timeout, "task store", self.store.get(task_id)).await?;
        Ok(TaskView::from_record(task_id, record.as_ref()))
    }
}
