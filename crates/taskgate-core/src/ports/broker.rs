//! Broker port - 配送キュー
//!
//! The broker carries envelopes from the dispatcher to whichever worker
//! dequeues first. It holds no task state.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::{CoreError, TaskEnvelope};

#[async_trait]
pub trait Broker: Send + Sync {
    /// Hand an envelope to the work queue. Must not wait for a worker.
    async fn enqueue(&self, envelope: TaskEnvelope) -> Result<(), CoreError>;

    /// Take the next envelope, waiting at most `timeout`.
    ///
    /// Cancel-safe: dropping the future never loses an envelope.
    async fn dequeue(&self, timeout: Duration) -> Result<Option<TaskEnvelope>, CoreError>;

    /// Liveness check.
    async fn ping(&self) -> Result<(), CoreError>;
}
