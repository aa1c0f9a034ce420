//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - 開発体験の改善（明確なエラーメッセージ）

use std::sync::Arc;
use std::time::Duration;

use super::dispatcher::Dispatcher;
use super::gc_loop::GcLoop;
use super::pending::PendingAggregator;
use super::status::StatusService;
use super::worker::{WorkerConfig, WorkerGroup, WorkerRuntime};
use super::bounded;
use crate::domain::{CoreError, TaskType, WorkerName};
use crate::impls::Backend;
use crate::limiter::RateLimiter;
use crate::ports::{IdGenerator, UlidGenerator};
use crate::typed::{Handler, HandlerRegistry, Job, TaskHandler, TaskOptions};

/// AppBuilder はアプリケーションを構築
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new(Backend::in_memory(clock, TaskStoreConfig::default()))
///     .register::<MyJob, _>(MyJobHandler, TaskOptions::default())?
///     .expect_tasks(&["my_job"])
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - expect_tasks() で期待される task_type を登録
/// - build() 時に「期待集合 ⊆ 登録済み集合」をチェック
/// - 不足があれば BuildError を返す
pub struct AppBuilder {
    backend: Backend,
    registry: HandlerRegistry,
    expected_tasks: Option<Vec<TaskType>>,
    backend_timeout: Duration,
    ids: Option<Arc<dyn IdGenerator>>,
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing task types: {0:?}. These tasks were expected but not registered.")]
    MissingTaskTypes(Vec<TaskType>),

    #[error(transparent)]
    Registry(#[from] CoreError),
}

impl AppBuilder {
    pub const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            registry: HandlerRegistry::new(),
            expected_tasks: None,
            backend_timeout: Self::DEFAULT_BACKEND_TIMEOUT,
            ids: None,
        }
    }

    /// Upper bound on any single store / broker call made by the app.
    pub fn with_backend_timeout(mut self, timeout: Duration) -> Self {
        self.backend_timeout = timeout;
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn register<J: Job, H: Handler<J> + 'static>(
        mut self,
        handler: H,
        options: TaskOptions,
    ) -> Result<Self, CoreError> {
        self.registry.register::<J, H>(handler, options)?;
        Ok(self)
    }

    pub fn register_dyn(
        mut self,
        task_type: TaskType,
        handler: Arc<dyn TaskHandler>,
        options: TaskOptions,
    ) -> Result<Self, CoreError> {
        self.registry.register_dyn(task_type, handler, options)?;
        Ok(self)
    }

    pub fn expect_tasks(mut self, task_types: &[&str]) -> Self {
        self.expected_tasks = Some(task_types.iter().map(|t| TaskType::new(*t)).collect());
        self
    }

    pub fn build(self) -> Result<App, BuildError> {
        if let Some(expected) = &self.expected_tasks {
            let missing: Vec<TaskType> = expected
                .iter()
                .filter(|t| !self.registry.contains(t))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingTaskTypes(missing));
            }
        }

        let backend = self.backend;
        let timeout = self.backend_timeout;
        let registry = Arc::new(self.registry);
        let ids: Arc<dyn IdGenerator> = match self.ids {
            Some(ids) => ids,
            None => Arc::new(UlidGenerator::new(Arc::clone(&backend.clock))),
        };
        let limiter = Arc::new(RateLimiter::new(Arc::clone(&backend.clock)));
        let execution_limiter = Arc::new(RateLimiter::new(Arc::clone(&backend.clock)));

        let dispatcher = Dispatcher::new(
            backend.store.clone(),
            backend.broker.clone(),
            Arc::clone(&registry),
            ids,
            Arc::clone(&backend.clock),
            timeout,
        );
        let status = StatusService::new(backend.store.clone(), timeout);
        let pending = PendingAggregator::new(backend.inspector(), backend.store.clone(), timeout);

        tracing::info!(task_types = ?registry.registered_types(), "app built");
        Ok(App {
            backend,
            registry,
            limiter,
            execution_limiter,
            dispatcher: Arc::new(dispatcher),
            status: Arc::new(status),
            pending: Arc::new(pending),
            backend_timeout: timeout,
        })
    }
}

/// Result of pinging each backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendHealth {
    pub store: Result<(), String>,
    pub broker: Result<(), String>,
}

impl BackendHealth {
    pub fn is_healthy(&self) -> bool {
        self.store.is_ok() && self.broker.is_ok()
    }
}

/// App はアプリケーションのランタイム
///
/// HTTP 側（dispatcher / status / pending / limiter）と worker 側は
/// `Backend` 経由でのみつながる。worker の実行回数制限は
/// `execution_limiter` に持ち、HTTP のバケットとは混ざらない。
pub struct App {
    backend: Backend,
    registry: Arc<HandlerRegistry>,
    limiter: Arc<RateLimiter>,
    execution_limiter: Arc<RateLimiter>,
    dispatcher: Arc<Dispatcher>,
    status: Arc<StatusService>,
    pending: Arc<PendingAggregator>,
    backend_timeout: Duration,
}

impl App {
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn status(&self) -> &Arc<StatusService> {
        &self.status
    }

    pub fn pending(&self) -> &Arc<PendingAggregator> {
        &self.pending
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn execution_limiter(&self) -> &Arc<RateLimiter> {
        &self.execution_limiter
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn spawn_workers(&self, names: Vec<WorkerName>, config: WorkerConfig) -> WorkerGroup {
        let rt = WorkerRuntime {
            backend: self.backend.clone(),
            registry: Arc::clone(&self.registry),
            limiter: Arc::clone(&self.execution_limiter),
            backend_timeout: self.backend_timeout,
        };
        WorkerGroup::spawn(rt, names, config)
    }

    pub fn gc_loop(&self, interval: Duration) -> GcLoop {
        GcLoop::new(self.backend.store.clone(), interval)
            .with_limiter(Arc::clone(&self.limiter))
            .with_limiter(Arc::clone(&self.execution_limiter))
    }

    pub async fn check_backends(&self) -> BackendHealth {
        let timeout = self.backend_timeout;
        let (store, broker) = tokio::join!(
            bounded(timeout, "task store", self.backend.store.ping()),
            bounded(timeout, "broker", self.backend.broker.ping()),
        );
        BackendHealth {
            store: store.map_err(|e| e.to_string()),
            broker: broker.map_err(|e| e.to_string()),
        }
    }
}
