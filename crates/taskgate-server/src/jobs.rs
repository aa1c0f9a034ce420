//! Work functions shipped with the server.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use taskgate_core::{Handler, Job, LimitSpec, TaskContext, TaskOptions, TimeLimits, WorkFault};

pub const SOFT_LIMIT_RESULT: &str = "Task exceeded soft time limit";

/// Demo job behind `GET /tasks/run`: sleeps, then returns its own task id.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Background {}

impl Job for Background {
    const NAME: &'static str = "background";
    type Output = String;
}

pub struct BackgroundHandler {
    duration: Duration,
}

impl BackgroundHandler {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    /// Ten executions per minute per worker.
    pub fn options(limits: TimeLimits) -> TaskOptions {
        TaskOptions::default()
            .with_limits(limits)
            .with_rate_limit(LimitSpec::per_minute(10))
    }
}

#[async_trait]
impl Handler<Background> for BackgroundHandler {
    async fn handle(&self, _job: Background, ctx: &TaskContext) -> Result<String, WorkFault> {
        tracing::info!(task_id = %ctx.task_id(), worker = %ctx.worker(), "background task started");
        tokio::select! {
            _ = tokio::time::sleep(self.duration) => {
                tracing::info!(task_id = %ctx.task_id(), "background task completed");
                Ok(ctx.task_id().to_string())
            }
            _ = ctx.soft_limit_expired() => {
                tracing::warn!(task_id = %ctx.task_id(), "background task hit soft time limit");
                Ok(SOFT_LIMIT_RESULT.to_string())
            }
        }
    }
}
