//! Two-tier deadline around one work function call.
//!
//! - soft: `TaskContext` のキャンセルトークンを発火（協調的）
//! - hard: tokio task を abort して FAILURE（非協調的、常に勝つ）

use std::any::Any;
use std::sync::Arc;

use crate::domain::{TaskOutcome, TimeLimits};
use crate::typed::{TaskContext, TaskHandler};

/// Run `handler` in its own tokio task under `limits` and turn whatever
/// happens into a terminal outcome. Panics become FAILURE.
pub async fn run_with_deadline(
    handler: Arc<dyn TaskHandler>,
    ctx: TaskContext,
    limits: TimeLimits,
) -> TaskOutcome {
    let task_id = ctx.task_id();
    let soft_limit = ctx.soft_limit_token().clone();
    let mut join = tokio::spawn(async move { handler.run(ctx).await });

    let joined = match tokio::time::timeout(limits.soft, &mut join).await {
        Ok(joined) => joined,
        Err(_) => {
            tracing::warn!(%task_id, soft_secs = limits.soft.as_secs(), "soft time limit exceeded");
            soft_limit.cancel();
            match tokio::time::timeout(limits.grace(), &mut join).await {
                Ok(joined) => joined,
                Err(_) => {
                    join.abort();
                    tracing::error!(%task_id, hard_secs = limits.hard.as_secs(), "hard time limit exceeded");
                    return TaskOutcome::Failed(format!(
                        "hard time limit ({}s) exceeded",
                        limits.hard.as_secs()
                    ));
                }
            }
        }
    };

    match joined {
        Ok(Ok(result)) => TaskOutcome::Succeeded(result),
        Ok(Err(fault)) => TaskOutcome::Failed(fault.message().to_string()),
        Err(err) if err.is_panic() => TaskOutcome::Failed(panic_message(err.into_panic())),
        Err(err) => TaskOutcome::Failed(format!("work function cancelled: {err}")),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
