//! Impls - ports の in-process 実装
//!
//! - **InMemoryTaskStore**: result store（TTL 付き）
//! - **InMemoryBroker**: 配送キュー
//! - **InMemoryFleet**: worker 台帳と WorkerInspector
//! - **Backend**: 上記のひとまとめ

pub mod backend;
pub mod inmem_broker;
pub mod inmem_fleet;
pub mod inmem_store;

pub use self::backend::Backend;
pub use self::inmem_broker::InMemoryBroker;
pub use self::inmem_fleet::{InMemoryFleet, WorkerLedger};
pub use self::inmem_store::{InMemoryTaskStore, TaskStoreConfig};
