//! WorkerInspector port - worker fleet introspection.

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::domain::{CoreError, QueueCategory, TaskId, WorkerName};

/// Task ids per worker for one queue category.
pub type WorkerTasks = BTreeMap<WorkerName, Vec<TaskId>>;

/// Asks every known worker what it holds in one live category.
///
/// Workers answer independently, so successive calls are not a consistent
/// snapshot of the fleet.
#[async_trait]
pub trait WorkerInspector: Send + Sync {
    async fn inspect(&self, category: QueueCategory) -> Result<WorkerTasks, CoreError>;
}
