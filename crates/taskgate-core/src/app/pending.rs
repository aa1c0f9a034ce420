//! PendingAggregator - worker 横断の未完了タスク一覧
//!
//! Worker ごとの active / scheduled / reserved を列挙し、各 task id の
//! 状態を TaskStore で引き直す。トランザクショナルな snapshot ではない。

use std::sync::Arc;
use std::time::Duration;

use super::bounded;
use crate::domain::{CoreError, PendingEntry, QueueCategory, TaskState};
use crate::ports::{TaskStore, WorkerInspector};

pub struct PendingAggregator {
    inspector: Arc<dyn WorkerInspector>,
    store: Arc<dyn TaskStore>,
    backend_timeout: Duration,
}

impl PendingAggregator {
    pub fn new(
        inspector: Arc<dyn WorkerInspector>,
        store: Arc<dyn TaskStore>,
        backend_timeout: Duration,
    ) -> Self {
        Self {
            inspector,
            store,
            backend_timeout,
        }
    }

    /// Every (worker, task) pair still held by a worker whose state is not
    /// SUCCESS.
    ///
    /// No deduplication: a task caught mid-handoff in two categories shows
    /// up twice. An outage in either backend is an error, never an empty list.
    pub async fn list_pending(&self) -> Result<Vec<PendingEntry>, CoreError> {
        let mut entries = Vec::new();
        for category in QueueCategory::ALL {
            let per_worker = bounded(
                self.backend_timeout,
                "worker inspector",
                self.inspector.inspect(category),
            )
            .await?;

            for (worker, task_ids) in per_worker {
                for task_id in task_ids {
                    let record =
                        bounded(self.backend_timeout, "task store", self.store.get(task_id))
                            .await?;
                    let state = record.map_or(TaskState::Pending, |r| r.state);
                    if state == TaskState::Success {
                        continue;
                    }
                    entries.push(PendingEntry {
                        task_id,
                        state,
                        worker: worker.clone(),
                        category,
                    });
                }
            }
        }
        tracing::debug!(count = entries.len(), "pending work listed");
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TaskId, TaskOutcome, TaskRecord, TaskType, WorkerName};
    use crate::impls::{InMemoryFleet, InMemoryTaskStore, TaskStoreConfig};
    use crate::ports::{Clock, FixedClock, WorkerTasks};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use ulid::Ulid;

    struct Fixture {
        fleet: Arc<InMemoryFleet>,
        store: Arc<InMemoryTaskStore>,
        clock: FixedClock,
        aggregator: PendingAggregator,
    }

    fn fixture() -> Fixture {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let store = Arc::new(InMemoryTaskStore::new(
            Arc::new(clock.clone()),
            TaskStoreConfig::default(),
        ));
        let fleet = Arc::new(InMemoryFleet::new());
        let aggregator =
            PendingAggregator::new(fleet.clone(), store.clone(), Duration::from_secs(1));
        Fixture {
            fleet,
            store,
            clock,
            aggregator,
        }
    }

    async fn stored(fx: &Fixture) -> TaskId {
        let task_id = TaskId::from_ulid(Ulid::new());
        fx.store
            .create(TaskRecord::new(task_id, TaskType::new("t"), fx.clock.now()))
            .await
            .unwrap();
        task_id
    }

    #[tokio::test]
    async fn one_active_task_across_two_workers() {
        let fx = fixture();
        let w1 = WorkerName::new("worker1@host");
        let ledger = fx.fleet.join(&w1);
        fx.fleet.join(&WorkerName::new("worker2@host"));

        let task_id = stored(&fx).await;
        fx.store.mark_started(task_id, &w1).await.unwrap();
        ledger.activate(task_id);

        let entries = fx.aggregator.list_pending().await.unwrap();
        assert_eq!(
            entries,
            vec![PendingEntry {
                task_id,
                state: TaskState::Started,
                worker: w1,
                category: QueueCategory::Active,
            }]
        );
    }

    #[tokio::test]
    async fn success_is_excluded_failure_is_kept() {
        let fx = fixture();
        let w = WorkerName::new("w");
        let ledger = fx.fleet.join(&w);

        let done = stored(&fx).await;
        let failed = stored(&fx).await;
        for (task_id, outcome) in [
            (done, TaskOutcome::Succeeded(json!(1))),
            (failed, TaskOutcome::Failed("boom".into())),
        ] {
            fx.store.mark_started(task_id, &w).await.unwrap();
            fx.store.finish(task_id, outcome).await.unwrap();
            ledger.activate(task_id);
        }

        let entries = fx.aggregator.list_pending().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].task_id, failed);
        assert_eq!(entries[0].state, TaskState::Failure);
    }

    #[tokio::test]
    async fn every_category_is_listed() {
        let fx = fixture();
        let a = fx.fleet.join(&WorkerName::new("a"));
        let b = fx.fleet.join(&WorkerName::new("b"));
        let scheduled = stored(&fx).await;
        let reserved = stored(&fx).await;
        a.schedule(scheduled);
        b.reserve(reserved);

        let entries = fx.aggregator.list_pending().await.unwrap();
        let categories: Vec<_> = entries.iter().map(|e| (e.task_id, e.category)).collect();
        assert_eq!(
            categories,
            vec![
                (scheduled, QueueCategory::Scheduled),
                (reserved, QueueCategory::Reserved),
            ]
        );
        assert!(entries.iter().all(|e| e.state == TaskState::Pending));
    }

    #[tokio::test]
    async fn no_workers_means_empty_list() {
        let fx = fixture();
        assert!(fx.aggregator.list_pending().await.unwrap().is_empty());
    }

    struct DownInspector;

    #[async_trait]
    impl WorkerInspector for DownInspector {
        async fn inspect(&self, _category: QueueCategory) -> Result<WorkerTasks, CoreError> {
            Err(CoreError::unavailable("broker unreachable"))
        }
    }

    /// Reports `task_id` under both Active and Reserved, as a worker caught
    /// between the two would.
    struct HandoffInspector {
        worker: WorkerName,
        task_id: TaskId,
    }

    #[async_trait]
    impl WorkerInspector for HandoffInspector {
        async fn inspect(&self, category: QueueCategory) -> Result<WorkerTasks, CoreError> {
            let mut tasks = WorkerTasks::new();
            if matches!(category, QueueCategory::Active | QueueCategory::Reserved) {
                tasks.insert(self.worker.clone(), vec![self.task_id]);
            }
            Ok(tasks)
        }
    }

    #[tokio::test]
    async fn task_in_two_categories_is_listed_twice() {
        let fx = fixture();
        let task_id = stored(&fx).await;
        let worker = WorkerName::new("worker1@host");
        let aggregator = PendingAggregator::new(
            Arc::new(HandoffInspector {
                worker: worker.clone(),
                task_id,
            }),
            fx.store.clone(),
            Duration::from_secs(1),
        );

        let entries = aggregator.list_pending().await.unwrap();
        assert_eq!(
            entries,
            vec![
                PendingEntry {
                    task_id,
                    state: TaskState::Pending,
                    worker: worker.clone(),
                    category: QueueCategory::Active,
                },
                PendingEntry {
                    task_id,
                    state: TaskState::Pending,
                    worker,
                    category: QueueCategory::Reserved,
                },
            ]
        );
    }

    #[tokio::test]
    async fn inspector_outage_is_an_error_not_an_empty_list() {
        let fx = fixture();
        let aggregator =
            PendingAggregator::new(Arc::new(DownInspector), fx.store.clone(), Duration::from_secs(1));

        let err = aggregator.list_pending().await.unwrap_err();
        assert!(err.is_unavailable());
    }
}
