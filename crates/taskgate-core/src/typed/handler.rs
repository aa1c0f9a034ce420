//! Handler trait - work function の定義
//!
//! # 学習ポイント
//! - ジェネリック trait (Handler<J>)
//! - Object-safe trait (TaskHandler)
//! - Type erasure パターン (TypedHandler<J, H> → TaskHandler)

use async_trait::async_trait;
use std::marker::PhantomData;

use super::codec::{decode_payload, encode_output};
use super::context::TaskContext;
use super::job::Job;
use crate::domain::WorkFault;

/// Object-safe work function. This is what workers execute.
///
/// The returned value becomes the SUCCESS result; a `WorkFault` becomes the
/// FAILURE error string.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn run(&self, ctx: TaskContext) -> Result<serde_json::Value, WorkFault>;
}

/// Typed work function for one `Job`.
///
/// ```ignore
/// struct ResizeHandler;
///
/// #[async_trait]
/// impl Handler<Resize> for ResizeHandler {
///     async fn handle(&self, job: Resize, ctx: &TaskContext) -> Result<String, WorkFault> {
///         Ok(format!("{} resized to {}", ctx.task_id(), job.width))
///     }
/// }
/// ```
#[async_trait]
pub trait Handler<J: Job>: Send + Sync {
    async fn handle(&self, job: J, ctx: &TaskContext) -> Result<J::Output, WorkFault>;
}

pub struct TypedHandler<J: Job, H: Handler<J>> {
    handler: H,
    _marker: PhantomData<fn() -> J>,
}

impl<J: Job, H: Handler<J>> TypedHandler<J, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<J: Job, H: Handler<J>> TaskHandler for TypedHandler<J, H> {
    async fn run(&self, ctx: TaskContext) -> Result<serde_json::Value, WorkFault> {
        let job: J = decode_payload(ctx.payload())?;
        let output = self.handler.handle(job, &ctx).await?;
        encode_output::<J>(&output)
    }
}
