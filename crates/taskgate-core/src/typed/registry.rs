//! HandlerRegistry - task_type → handler + 実行オプション
//!
//! # 学習ポイント
//! - HashMap での型消去された trait object の管理
//! - Generic methods での登録と型安全性

use std::collections::HashMap;
use std::sync::Arc;

use super::handler::{Handler, TaskHandler, TypedHandler};
use super::job::Job;
use crate::domain::{CoreError, TaskType, TimeLimits};
use crate::limiter::LimitSpec;

/// Per-type execution options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskOptions {
    pub limits: TimeLimits,
    /// Execution budget shared by every worker in the process.
    pub rate_limit: Option<LimitSpec>,
}

impl TaskOptions {
    pub fn with_limits(mut self, limits: TimeLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: LimitSpec) -> Self {
        self.rate_limit = Some(rate_limit);
        self
    }
}

struct Registration {
    handler: Arc<dyn TaskHandler>,
    options: TaskOptions,
}

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<TaskType, Registration>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<J: Job, H: Handler<J> + 'static>(
        &mut self,
        handler: H,
        options: TaskOptions,
    ) -> Result<(), CoreError> {
        self.register_dyn(
            J::task_type(),
            Arc::new(TypedHandler::<J, H>::new(handler)),
            options,
        )
    }

    /// Register an already type-erased handler under an explicit name.
    pub fn register_dyn(
        &mut self,
        task_type: TaskType,
        handler: Arc<dyn TaskHandler>,
        options: TaskOptions,
    ) -> Result<(), CoreError> {
        if self.handlers.contains_key(&task_type) {
            return Err(CoreError::DuplicateHandler(task_type));
        }
        self.handlers
            .insert(task_type, Registration { handler, options });
        Ok(())
    }

    pub fn handler(&self, task_type: &TaskType) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(task_type).map(|r| Arc::clone(&r.handler))
    }

    pub fn options(&self, task_type: &TaskType) -> Option<TaskOptions> {
        self.handlers.get(task_type).map(|r| r.options)
    }

    pub fn contains(&self, task_type: &TaskType) -> bool {
        self.handlers.contains_key(task_type)
    }

    /// Sorted, so logs and error messages are stable.
    pub fn registered_types(&self) -> Vec<TaskType> {
        let mut types: Vec<_> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::WorkFault;
    use crate::typed::TaskContext;
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Serialize, Deserialize)]
    struct Ping {}

    impl Job for Ping {
        const NAME: &'static str = "ping";
        type Output = &'static str;
    }

    #[derive(Serialize, Deserialize)]
    struct Echo {
        text: String,
    }

    impl Job for Echo {
        const NAME: &'static str = "echo";
        type Output = String;
    }

    struct PingHandler;

    #[async_trait]
    impl Handler<Ping> for PingHandler {
        async fn handle(&self, _job: Ping, _ctx: &TaskContext) -> Result<&'static str, WorkFault> {
            Ok("pong")
        }
    }

    struct EchoHandler;

    #[async_trait]
    impl Handler<Echo> for EchoHandler {
        async fn handle(&self, job: Echo, _ctx: &TaskContext) -> Result<String, WorkFault> {
            Ok(job.text)
        }
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = HandlerRegistry::new();
        registry
            .register::<Ping, _>(PingHandler, TaskOptions::default())
            .unwrap();

        assert!(registry.handler(&TaskType::new("ping")).is_some());
        assert!(registry.handler(&TaskType::new("pong")).is_none());
        assert_eq!(
            registry.options(&TaskType::new("ping")),
            Some(TaskOptions::default())
        );
    }

    #[test]
    fn double_registration_is_rejected() {
        let mut registry = HandlerRegistry::new();
        registry
            .register::<Ping, _>(PingHandler, TaskOptions::default())
            .unwrap();

        let err = registry
            .register::<Ping, _>(PingHandler, TaskOptions::default())
            .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateHandler(t) if t.as_str() == "ping"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn options_are_kept_per_type() {
        let limits = TimeLimits::new(Duration::from_secs(5), Duration::from_secs(10)).unwrap();
        let mut registry = HandlerRegistry::new();
        registry
            .register::<Ping, _>(PingHandler, TaskOptions::default())
            .unwrap();
        registry
            .register::<Echo, _>(
                EchoHandler,
                TaskOptions::default()
                    .with_limits(limits)
                    .with_rate_limit(LimitSpec::per_minute(10)),
            )
            .unwrap();

        let echo = registry.options(&TaskType::new("echo")).unwrap();
        assert_eq!(echo.limits, limits);
        assert_eq!(echo.rate_limit, Some(LimitSpec::per_minute(10)));
        assert_eq!(
            registry.registered_types(),
            vec![TaskType::new("echo"), TaskType::new("ping")]
        );
    }
}
