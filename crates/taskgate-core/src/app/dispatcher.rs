//! Dispatcher - submit / revoke
//!
//! submit は PENDING record を書いてから broker に渡し、worker を待たずに
//! handle を返す。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::bounded;
use crate::domain::{
    CoreError, TaskEnvelope, TaskId, TaskOutcome, TaskRecord, TaskType, TaskView, TimeLimits,
};
use crate::ports::{Broker, Clock, IdGenerator, TaskStore};
use crate::typed::HandlerRegistry;

/// Opaque handle returned to the submitter. Only useful as a status key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskHandle {
    task_id: TaskId,
}

impl TaskHandle {
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.task_id.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SubmitOptions {
    /// Earliest start, relative to submission.
    pub countdown: Option<Duration>,
    /// Overrides the time limits registered for the task type.
    pub limits: Option<TimeLimits>,
}

impl SubmitOptions {
    pub fn with_countdown(mut self, countdown: Duration) -> Self {
        self.countdown = Some(countdown);
        self
    }

    pub fn with_limits(mut self, limits: TimeLimits) -> Self {
        self.limits = Some(limits);
        self
    }
}

pub struct Dispatcher {
    store: Arc<dyn TaskStore>,
    broker: Arc<dyn Broker>,
    registry: Arc<HandlerRegistry>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    backend_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn TaskStore>,
        broker: Arc<dyn Broker>,
        registry: Arc<HandlerRegistry>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
        backend_timeout: Duration,
    ) -> Self {
        Self {
            store,
            broker,
            registry,
            ids,
            clock,
            backend_timeout,
        }
    }

    /// Create a PENDING task and queue it.
    ///
    /// Returns as soon as the envelope is queued. The record exists before
    /// this returns, so a status query for the handle never misses it.
    pub async fn submit(
        &self,
        task_type: &TaskType,
        payload: serde_json::Value,
        options: SubmitOptions,
    ) -> Result<TaskHandle, CoreError> {
        let task_options = self
            .registry
            .options(task_type)
            .ok_or_else(|| CoreError::UnknownTaskType(task_type.clone()))?;
        let limits = options.limits.unwrap_or(task_options.limits);

        let now = self.clock.now();
        let task_id = self.ids.generate_task_id();
        let eta = options.countdown.map(|countdown| eta_after(now, countdown));

        let record = TaskRecord::new(task_id, task_type.clone(), now);
        bounded(self.backend_timeout, "task store", self.store.create(record)).await?;

        let envelope = TaskEnvelope::new(task_id, task_type.clone(), payload)
            .with_eta(eta)
            .with_limits(limits);
        if let Err(err) =
            bounded(self.backend_timeout, "broker", self.broker.enqueue(envelope)).await
        {
            tracing::error!(%task_id, %task_type, error = %err, "enqueue failed");
            let outcome = TaskOutcome::Failed(format!("enqueue failed: {err}"));
            if let Err(mark_err) = bounded(
                self.backend_timeout,
                "task store",
                self.store.finish(task_id, outcome),
            )
            .await
            {
                tracing::warn!(%task_id, error = %mark_err, "could not mark unqueued task as failed");
            }
            return Err(err);
        }

        tracing::info!(%task_id, %task_type, ?eta, "task submitted");
        Ok(TaskHandle { task_id })
    }

    /// Move a task that has not finished yet to REVOKED.
    ///
    /// A worker that picks it up later skips it; one that is running it
    /// keeps running, but its result is discarded.
    pub async fn revoke(
        &self,
        task_id: TaskId,
        reason: Option<String>,
    ) -> Result<TaskView, CoreError> {
        let record = bounded(
            self.backend_timeout,
            "task store",
            self.store.finish(task_id, TaskOutcome::Revoked(reason)),
        )
        .await?;
        tracing::info!(%task_id, "task revoked");
        Ok(TaskView::from_record(task_id, Some(&record)))
    }
}

fn eta_after(now: DateTime<Utc>, countdown: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(countdown)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TaskState, WorkFault};
    use crate::impls::{InMemoryBroker, InMemoryTaskStore, TaskStoreConfig};
    use crate::ports::{FixedClock, UlidGenerator};
    use crate::typed::{Handler, Job, TaskContext, TaskOptions};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use serde_json::json;

    #[derive(Serialize, Deserialize)]
    struct Noop {}

    impl Job for Noop {
        const NAME: &'static str = "noop";
        type Output = ();
    }

    struct NoopHandler;

    #[async_trait]
    impl Handler<Noop> for NoopHandler {
        async fn handle(&self, _job: Noop, _ctx: &TaskContext) -> Result<(), WorkFault> {
            Ok(())
        }
    }

    /// Broker that is down.
    struct DeadBroker;

    #[async_trait]
    impl Broker for DeadBroker {
        async fn enqueue(&self, _envelope: TaskEnvelope) -> Result<(), CoreError> {
            Err(CoreError::unavailable("connection refused"))
        }

        async fn dequeue(&self, _timeout: Duration) -> Result<Option<TaskEnvelope>, CoreError> {
            Err(CoreError::unavailable("connection refused"))
        }

        async fn ping(&self) -> Result<(), CoreError> {
            Err(CoreError::unavailable("connection refused"))
        }
    }

    /// Broker that never answers.
    struct HungBroker;

    #[async_trait]
    impl Broker for HungBroker {
        async fn enqueue(&self, _envelope: TaskEnvelope) -> Result<(), CoreError> {
            std::future::pending().await
        }

        async fn dequeue(&self, _timeout: Duration) -> Result<Option<TaskEnvelope>, CoreError> {
            std::future::pending().await
        }

        async fn ping(&self) -> Result<(), CoreError> {
            std::future::pending().await
        }
    }

    struct Fixture {
        clock: FixedClock,
        store: Arc<InMemoryTaskStore>,
        dispatcher: Dispatcher,
    }

    fn fixture(broker: Arc<dyn Broker>) -> Fixture {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let store = Arc::new(InMemoryTaskStore::new(
            Arc::clone(&shared_clock),
            TaskStoreConfig::default(),
        ));
        let mut registry = HandlerRegistry::new();
        registry
            .register::<Noop, _>(NoopHandler, TaskOptions::default())
            .unwrap();
        let dispatcher = Dispatcher::new(
            store.clone(),
            broker,
            Arc::new(registry),
            Arc::new(UlidGenerator::new(Arc::clone(&shared_clock))),
            shared_clock,
            Duration::from_secs(2),
        );
        Fixture {
            clock,
            store,
            dispatcher,
        }
    }

    #[tokio::test]
    async fn submit_writes_pending_record_before_returning() {
        let broker = Arc::new(InMemoryBroker::new());
        let fx = fixture(broker.clone());

        let handle = fx
            .dispatcher
            .submit(&Noop::task_type(), json!({}), SubmitOptions::default())
            .await
            .unwrap();

        let record = fx.store.get(handle.task_id()).await.unwrap().unwrap();
        assert_eq!(record.state, TaskState::Pending);
        assert_eq!(broker.len().await, 1);
    }

    #[tokio::test]
    async fn countdown_sets_eta() {
        let broker = Arc::new(InMemoryBroker::new());
        let fx = fixture(broker.clone());

        fx.dispatcher
            .submit(
                &Noop::task_type(),
                json!({}),
                SubmitOptions::default().with_countdown(Duration::from_secs(30)),
            )
            .await
            .unwrap();

        let envelope = broker.dequeue(Duration::ZERO).await.unwrap().unwrap();
        assert_eq!(
            envelope.eta(),
            Some(fx.clock.now() + chrono::Duration::seconds(30))
        );
    }

    #[tokio::test]
    async fn unknown_task_type_creates_nothing() {
        let fx = fixture(Arc::new(InMemoryBroker::new()));

        let err = fx
            .dispatcher
            .submit(&TaskType::new("nope"), json!({}), SubmitOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::UnknownTaskType(_)));
        assert!(fx.store.is_empty().await);
    }

    #[tokio::test]
    async fn broker_outage_fails_fast_and_marks_the_record() {
        let fx = fixture(Arc::new(DeadBroker));

        let err = fx
            .dispatcher
            .submit(&Noop::task_type(), json!({}), SubmitOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_unavailable());

        let records = fx.store.snapshot().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].state, TaskState::Failure);
        assert!(records[0].error.as_deref().unwrap().starts_with("enqueue failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_broker_is_bounded_by_backend_timeout() {
        let fx = fixture(Arc::new(HungBroker));

        let err = fx
            .dispatcher
            .submit(&Noop::task_type(), json!({}), SubmitOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::BackendUnavailable(msg) if msg.contains("broker")));
    }

    #[tokio::test]
    async fn revoke_pending_then_revoke_again() {
        let fx = fixture(Arc::new(InMemoryBroker::new()));
        let handle = fx
            .dispatcher
            .submit(&Noop::task_type(), json!({}), SubmitOptions::default())
            .await
            .unwrap();

        let view = fx
            .dispatcher
            .revoke(handle.task_id(), Some("operator".into()))
            .await
            .unwrap();
        assert_eq!(view.state, TaskState::Revoked);
        assert_eq!(view.message.as_deref(), Some("Task was revoked: operator"));

        let err = fx
            .dispatcher
            .revoke(handle.task_id(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Transition(_)));
    }
}
