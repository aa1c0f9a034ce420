//! Worker runtime - dequeue → reserve → start → run → finish
//!
//! # ライフサイクル（1 delivery あたり）
//! 1. eta が未来なら `scheduled` に入れて待つ
//! 2. `reserved` に移し、実行 slot（と task_type ごとの実行 rate limit）を待つ
//! 3. `active` に移し、TaskStore を STARTED にして work function を実行
//! 4. 結果を TaskStore に書き、台帳から外す
//!
//! shutdown 要求が来たら新規 dequeue を止める。まだ実行前の delivery は
//! broker に戻し、実行中のものは終わるまで待つ。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use super::bounded;
use super::supervisor::run_with_deadline;
use crate::domain::{CoreError, TaskEnvelope, TaskId, TaskOutcome, WorkerName};
use crate::impls::{Backend, WorkerLedger};
use crate::limiter::{Admission, RateLimiter};
use crate::typed::{HandlerRegistry, TaskContext};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Execution slots per worker.
    pub concurrency: usize,
    /// Deliveries held per slot (running + waiting).
    pub prefetch_multiplier: usize,
    /// Longest single wait on the broker.
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            prefetch_multiplier: 4,
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl WorkerConfig {
    fn prefetch_limit(&self) -> usize {
        self.concurrency.max(1) * self.prefetch_multiplier.max(1)
    }
}

/// What every worker in the process shares.
#[derive(Clone)]
pub struct WorkerRuntime {
    pub backend: Backend,
    pub registry: Arc<HandlerRegistry>,
    pub limiter: Arc<RateLimiter>,
    pub backend_timeout: Duration,
}

struct Worker {
    name: WorkerName,
    ledger: Arc<WorkerLedger>,
    rt: WorkerRuntime,
    config: WorkerConfig,
    slots: Arc<Semaphore>,
}

/// Handle to a set of running workers.
/// - `request_shutdown()` で dequeue を止める
/// - `shutdown_and_join()` で実行中タスクの完了まで待つ
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
    names: Vec<WorkerName>,
}

impl WorkerGroup {
    /// Spawn one worker per name. Each joins the fleet immediately and
    /// leaves it when it stops.
    pub fn spawn(rt: WorkerRuntime, names: Vec<WorkerName>, config: WorkerConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(names.len());
        for name in &names {
            let worker = Arc::new(Worker {
                name: name.clone(),
                ledger: rt.backend.fleet.join(name),
                rt: rt.clone(),
                config: config.clone(),
                slots: Arc::new(Semaphore::new(config.concurrency.max(1))),
            });
            let rx = shutdown_rx.clone();
            joins.push(tokio::spawn(worker.run(rx)));
        }
        tracing::info!(workers = names.len(), concurrency = config.concurrency, "worker group started");

        Self {
            shutdown_tx,
            joins,
            names,
        }
    }

    pub fn worker_names(&self) -> &[WorkerName] {
        &self.names
    }

    /// Stop taking new deliveries. In-flight executions keep running.
    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(err) = join.await {
                tracing::error!(error = %err, "worker task ended abnormally");
            }
        }
        tracing::info!("worker group stopped");
    }
}

/// Resolves when shutdown is requested (or the group handle is gone).
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    // sender dropped counts as shutdown
    let _ = shutdown.wait_for(|stop| *stop).await;
}

impl Worker {
    async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let prefetch = Arc::new(Semaphore::new(self.config.prefetch_limit()));
        let mut inflight = JoinSet::new();
        tracing::info!(worker = %self.name, "worker online");

        loop {
            let permit = tokio::select! {
                biased;
                _ = stopped(&mut shutdown) => break,
                permit = Arc::clone(&prefetch).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            // dequeue は cancel-safe なので shutdown で drop してよい
            let delivery = tokio::select! {
                biased;
                _ = stopped(&mut shutdown) => break,
                delivery = self.rt.backend.broker.dequeue(self.config.poll_interval) => delivery,
            };

            match delivery {
                Ok(Some(envelope)) => {
                    let worker = Arc::clone(&self);
                    let rx = shutdown.clone();
                    inflight.spawn(async move {
                        worker.process(envelope, rx).await;
                        drop(permit);
                    });
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(worker = %self.name, error = %err, "dequeue failed");
                    tokio::select! {
                        _ = stopped(&mut shutdown) => break,
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
            }

            while let Some(joined) = inflight.try_join_next() {
                if let Err(err) = joined {
                    tracing::error!(worker = %self.name, error = %err, "delivery task failed");
                }
            }
        }

        while let Some(joined) = inflight.join_next().await {
            if let Err(err) = joined {
                tracing::error!(worker = %self.name, error = %err, "delivery task failed");
            }
        }
        self.rt.backend.fleet.leave(&self.name);
        tracing::info!(worker = %self.name, "worker offline");
    }

    /// Sleep `wait`, unless shutdown comes first. Returns false on shutdown.
    async fn wait_unless_stopped(
        &self,
        wait: Duration,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        tokio::select! {
            _ = stopped(shutdown) => false,
            _ = tokio::time::sleep(wait) => true,
        }
    }

    async fn process(&self, envelope: TaskEnvelope, mut shutdown: watch::Receiver<bool>) {
        let task_id = envelope.task_id();

        if let Some(eta) = envelope.eta() {
            let now = self.rt.backend.clock.now();
            if eta > now {
                self.ledger.schedule(task_id);
                let wait = (eta - now).to_std().unwrap_or(Duration::ZERO);
                if !self.wait_unless_stopped(wait, &mut shutdown).await {
                    return self.requeue(envelope).await;
                }
            }
        }

        self.ledger.reserve(task_id);

        let rate_limit = self
            .rt
            .registry
            .options(envelope.task_type())
            .and_then(|options| options.rate_limit);
        if let Some(spec) = rate_limit {
            let operation = format!("execute:{}", envelope.task_type());
            loop {
                match self.rt.limiter.admit(self.name.as_str(), &operation, spec) {
                    Admission::Allowed { .. } => break,
                    Admission::Denied { retry_after } => {
                        tracing::debug!(%task_id, ?retry_after, "execution rate limit reached");
                        if !self.wait_unless_stopped(retry_after, &mut shutdown).await {
                            return self.requeue(envelope).await;
                        }
                    }
                }
            }
        }

        let slot = tokio::select! {
            _ = stopped(&mut shutdown) => return self.requeue(envelope).await,
            slot = Arc::clone(&self.slots).acquire_owned() => slot,
        };
        let Ok(_slot) = slot else {
            return self.requeue(envelope).await;
        };

        self.ledger.activate(task_id);
        self.execute(envelope).await;
        self.ledger.release(task_id);
    }

    async fn requeue(&self, envelope: TaskEnvelope) {
        let task_id = envelope.task_id();
        self.ledger.release(task_id);
        match bounded(
            self.rt.backend_timeout,
            "broker",
            self.rt.backend.broker.enqueue(envelope),
        )
        .await
        {
            Ok(()) => tracing::info!(worker = %self.name, %task_id, "delivery returned to broker"),
            Err(err) => {
                tracing::error!(worker = %self.name, %task_id, error = %err, "could not return delivery to broker")
            }
        }
    }

    async fn execute(&self, envelope: TaskEnvelope) {
        let task_id = envelope.task_id();
        let store = &self.rt.backend.store;
        let timeout = self.rt.backend_timeout;

        let Some(handler) = self.rt.registry.handler(envelope.task_type()) else {
            let message = format!("no handler registered for task_type={}", envelope.task_type());
            tracing::error!(worker = %self.name, %task_id, "{message}");
            self.record(task_id, TaskOutcome::Failed(message)).await;
            return;
        };

        match bounded(timeout, "task store", store.mark_started(task_id, &self.name)).await {
            Ok(_) => {}
            Err(CoreError::Transition(err)) => {
                tracing::info!(worker = %self.name, %task_id, state = %err.from, "skipping task that is no longer pending");
                return;
            }
            Err(CoreError::UnknownTask(_)) => {
                tracing::warn!(worker = %self.name, %task_id, "no record for delivered task; skipping");
                return;
            }
            Err(err) => {
                tracing::error!(worker = %self.name, %task_id, error = %err, "could not mark task started");
                return self.requeue(envelope).await;
            }
        }
        tracing::info!(worker = %self.name, %task_id, task_type = %envelope.task_type(), "task started");

        let ctx = TaskContext::new(
            task_id,
            envelope.task_type().clone(),
            self.name.clone(),
            envelope.payload().clone(),
            CancellationToken::new(),
        );
        let outcome = run_with_deadline(handler, ctx, envelope.limits()).await;
        self.record(task_id, outcome).await;
    }

    async fn record(&self, task_id: TaskId, outcome: TaskOutcome) {
        let state = outcome.state();
        match bounded(
            self.rt.backend_timeout,
            "task store",
            self.rt.backend.store.finish(task_id, outcome),
        )
        .await
        {
            Ok(_) => tracing::info!(worker = %self.name, %task_id, %state, "task finished"),
            Err(CoreError::Transition(err)) => {
                tracing::warn!(worker = %self.name, %task_id, current = %err.from, "task already terminal; outcome discarded")
            }
            Err(err) => {
                tracing::error!(worker = %self.name, %task_id, error = %err, "could not record outcome")
            }
        }
    }
}
