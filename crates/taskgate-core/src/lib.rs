//! taskgate-core
//!
//! Asynchronous task dispatch: submit work, get a handle back immediately,
//! execute it on a pool of workers, and answer status queries by handle.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, state, task, record, view, errors）
//! - **ports**: 抽象化レイヤー（TaskStore, Broker, WorkerInspector, Clock, IdGenerator）
//! - **impls**: in-memory 実装（InMemoryTaskStore, InMemoryBroker, InMemoryFleet）
//! - **limiter**: fixed window の RateLimiter
//! - **typed**: 型付き work function API（Job, Handler<J>, HandlerRegistry）
//! - **app**: アプリケーションロジック（builder, dispatcher, status, pending, worker, gc_loop）

pub mod app;
pub mod domain;
pub mod impls;
pub mod limiter;
pub mod ports;
pub mod typed;

pub use app::{App, AppBuilder, BuildError, SubmitOptions, TaskHandle, WorkerConfig, WorkerGroup};
pub use domain::{
    CoreError, PendingEntry, QueueCategory, TaskId, TaskState, TaskType, TaskView, TimeLimits,
    WorkFault, WorkerName,
};
pub use impls::{Backend, TaskStoreConfig};
pub use limiter::{Admission, LimitSpec, RateLimiter};
pub use typed::{Handler, Job, TaskContext, TaskOptions};
