//! InMemoryBroker - 開発用の配送キュー
//!
//! # 学習ポイント
//! - tokio::sync::Mutex + Notify による async な blocking pop
//! - `Notified::enable` で「確認してから待つ」間の通知取りこぼしを防ぐ
//! - pop はロック内で完結するので dequeue future を drop しても envelope は失われない

use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::domain::{CoreError, TaskEnvelope};
use crate::ports::Broker;

/// Single FIFO queue shared by every worker.
#[derive(Default)]
pub struct InMemoryBroker {
    queue: Mutex<VecDeque<TaskEnvelope>>,
    notify: Notify,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.queue.lock().await.is_empty()
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn enqueue(&self, envelope: TaskEnvelope) -> Result<(), CoreError> {
        self.queue.lock().await.push_back(envelope);
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<TaskEnvelope>, CoreError> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(envelope) = self.queue.lock().await.pop_front() {
                return Ok(Some(envelope));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn ping(&self) -> Result<(), CoreError> {
        Ok(())
    }
}
