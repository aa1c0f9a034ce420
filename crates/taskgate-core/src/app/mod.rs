//! App - アプリケーション層
//!
//! ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: アプリケーションの構築とワイヤリング
//! - **Dispatcher**: submit / revoke
//! - **StatusService**: 単一タスクの状態照会
//! - **PendingAggregator**: worker 横断の未完了タスク一覧
//! - **WorkerGroup**: タスク実行ループ（dequeue→reserve→start→run→finish）
//! - **GcLoop**: 期限切れ record と idle bucket の回収

pub mod builder;
pub mod dispatcher;
pub mod gc_loop;
pub mod pending;
pub mod status;
pub mod supervisor;
pub mod worker;

pub use self::builder::{App, AppBuilder, BackendHealth, BuildError};
pub use self::dispatcher::{Dispatcher, SubmitOptions, TaskHandle};
pub use self::gc_loop::{GcLoop, GcReport};
pub use self::pending::PendingAggregator;
pub use self::status::StatusService;
pub use self::supervisor::run_with_deadline;
pub use self::worker::{WorkerConfig, WorkerGroup, WorkerRuntime};

use std::future::Future;
use std::time::Duration;

use crate::domain::CoreError;

/// Run a backend call, turning a hang into `BackendUnavailable`.
pub(crate) async fn bounded<T>(
    timeout: Duration,
    what: &str,
    fut: impl Future<Output = Result<T, CoreError>>,
) -> Result<T, CoreError> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(CoreError::unavailable(format!(
            "{what} timed out after {timeout:?}"
        ))),
    }
}
