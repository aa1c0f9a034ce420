//! InMemoryTaskStore - 開発用の result store
//!
//! Two retention windows:
//! - `result_ttl`: the whole record (default 24h after its last update)
//! - `execution_meta_ttl`: worker-side `ExecutionMeta` (default 3h after finishing)
//!
//! Eviction only happens in `purge_expired`, which the GC loop drives; reads
//! never extend a record's life.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::domain::{CoreError, TaskId, TaskOutcome, TaskRecord, WorkerName};
use crate::ports::{Clock, TaskStore};

#[derive(Debug, Clone)]
pub struct TaskStoreConfig {
    pub result_ttl: Duration,
    pub execution_meta_ttl: Duration,
}

impl Default for TaskStoreConfig {
    fn default() -> Self {
        Self {
            result_ttl: Duration::from_secs(24 * 60 * 60),
            execution_meta_ttl: Duration::from_secs(3 * 60 * 60),
        }
    }
}

pub struct InMemoryTaskStore {
    records: RwLock<HashMap<TaskId, TaskRecord>>,
    clock: Arc<dyn Clock>,
    config: TaskStoreConfig,
}

impl InMemoryTaskStore {
    pub fn new(clock: Arc<dyn Clock>, config: TaskStoreConfig) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            clock,
            config,
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Every record, oldest first.
    pub async fn snapshot(&self) -> Vec<TaskRecord> {
        let mut records: Vec<_> = self.records.read().await.values().cloned().collect();
        records.sort_by_key(|r| (r.created_at, r.task_id));
        records
    }
}

fn ttl(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create(&self, record: TaskRecord) -> Result<(), CoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.task_id) {
            return Err(CoreError::DuplicateTask(record.task_id));
        }
        records.insert(record.task_id, record);
        Ok(())
    }

    async fn get(&self, task_id: TaskId) -> Result<Option<TaskRecord>, CoreError> {
        Ok(self.records.read().await.get(&task_id).cloned())
    }

    async fn mark_started(
        &self,
        task_id: TaskId,
        worker: &WorkerName,
    ) -> Result<TaskRecord, CoreError> {
        let now = self.clock.now();
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&task_id)
            .ok_or(CoreError::UnknownTask(task_id))?;
        record.mark_started(worker, now)?;
        Ok(record.clone())
    }

    async fn finish(
        &self,
        task_id: TaskId,
        outcome: TaskOutcome,
    ) -> Result<TaskRecord, CoreError> {
        let now = self.clock.now();
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&task_id)
            .ok_or(CoreError::UnknownTask(task_id))?;
        record.finish(outcome, now)?;
        Ok(record.clone())
    }

    async fn purge_expired(&self) -> Result<usize, CoreError> {
        let now = self.clock.now();
        let result_ttl = ttl(self.config.result_ttl);
        let meta_ttl = ttl(self.config.execution_meta_ttl);

        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| {
            record
                .updated_at
                .checked_add_signed(result_ttl)
                .is_none_or(|expires_at| expires_at > now)
        });
        for record in records.values_mut() {
            let meta_expired = record
                .execution
                .as_ref()
                .and_then(|meta| meta.finished_at)
                .and_then(|finished| finished.checked_add_signed(meta_ttl))
                .is_some_and(|expires_at| expires_at <= now);
            if meta_expired {
                record.execution = None;
            }
        }
        Ok(before - records.len())
    }

    async fn ping(&self) -> Result<(), CoreError> {
        Ok(())
    }
}
