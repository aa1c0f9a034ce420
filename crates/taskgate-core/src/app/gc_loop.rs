//! GcLoop - 期限切れ record と idle な rate-limit bucket の回収
//!
//! Retention is driven from here, never from reads, so records expire on
//! schedule whether or not anyone polls them.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::domain::CoreError;
use crate::limiter::RateLimiter;
use crate::ports::TaskStore;

pub struct GcLoop {
    store: Arc<dyn TaskStore>,
    limiters: Vec<Arc<RateLimiter>>,
    interval: Duration,
}

/// What one sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcReport {
    pub records: usize,
    pub buckets: usize,
}

impl GcLoop {
    pub fn new(store: Arc<dyn TaskStore>, interval: Duration) -> Self {
        Self {
            store,
            limiters: Vec::new(),
            interval,
        }
    }

    /// Also drop idle buckets from `limiter` on every sweep.
    pub fn with_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiters.push(limiter);
        self
    }

    pub async fn run_once(&self) -> Result<GcReport, CoreError> {
        let buckets = self.limiters.iter().map(|l| l.purge_idle()).sum();
        let records = self.store.purge_expired().await?;
        Ok(GcReport { records, buckets })
    }

    /// Sweep every `interval` until `shutdown` flips to true (or its sender
    /// is dropped).
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // interval の初回 tick は即時
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.wait_for(|stop| *stop) => break,
                    _ = ticker.tick() => {}
                }
                match self.run_once().await {
                    Ok(report) if report != GcReport::default() => {
                        tracing::info!(records = report.records, buckets = report.buckets, "gc sweep");
                    }
                    Ok(_) => {}
                    Err(err) => tracing::warn!(error = %err, "gc sweep failed"),
                }
            }
            tracing::debug!("gc loop stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TaskId, TaskRecord, TaskType};
    use crate::impls::{InMemoryTaskStore, TaskStoreConfig};
    use crate::limiter::LimitSpec;
    use crate::ports::{Clock, FixedClock};
    use chrono::{TimeZone, Utc};
    use ulid::Ulid;

    fn setup() -> (FixedClock, Arc<InMemoryTaskStore>, Arc<RateLimiter>) {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let shared: Arc<dyn Clock> = Arc::new(clock.clone());
        let store = Arc::new(InMemoryTaskStore::new(
            Arc::clone(&shared),
            TaskStoreConfig::default(),
        ));
        let limiter = Arc::new(RateLimiter::new(shared));
        (clock, store, limiter)
    }

    #[tokio::test]
    async fn run_once_purges_both() {
        let (clock, store, limiter) = setup();
        store
            .create(TaskRecord::new(
                TaskId::from_ulid(Ulid::new()),
                TaskType::new("t"),
                clock.now(),
            ))
            .await
            .unwrap();
        limiter.admit("c", "op", LimitSpec::per_minute(5));

        let gc = GcLoop::new(store.clone(), Duration::from_secs(60)).with_limiter(limiter.clone());
        assert_eq!(gc.run_once().await.unwrap(), GcReport::default());

        clock.advance(Duration::from_secs(24 * 60 * 60));
        assert_eq!(
            gc.run_once().await.unwrap(),
            GcReport {
                records: 1,
                buckets: 1
            }
        );
        assert!(store.is_empty().await);
        assert!(limiter.is_empty());
    }

    #[tokio::test]
    async fn every_attached_limiter_is_swept() {
        let (clock, store, http) = setup();
        let execution = Arc::new(RateLimiter::new(Arc::new(clock.clone())));
        http.admit("10.0.0.1", "tasks:index", LimitSpec::per_minute(5));
        execution.admit("worker1@host", "execute:background", LimitSpec::per_minute(10));
        execution.admit("worker2@host", "execute:background", LimitSpec::per_minute(10));

        let gc = GcLoop::new(store, Duration::from_secs(60))
            .with_limiter(http.clone())
            .with_limiter(execution.clone());
        clock.advance(Duration::from_secs(60));

        assert_eq!(gc.run_once().await.unwrap().buckets, 3);
        assert!(http.is_empty());
        assert!(execution.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn loop_sweeps_on_interval_and_stops_on_shutdown() {
        let (clock, store, limiter) = setup();
        limiter.admit("c", "op", LimitSpec::per_minute(5));
        let (tx, rx) = watch::channel(false);
        let handle = GcLoop::new(store, Duration::from_secs(60))
            .with_limiter(limiter.clone())
            .spawn(rx);

        clock.advance(Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(limiter.is_empty());

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
