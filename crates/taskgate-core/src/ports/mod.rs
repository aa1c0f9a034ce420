//! Ports - 抽象化レイヤー
//!
//! Each trait is the seam to an external system (result store, broker,
//! worker introspection) or to an ambient dependency (clock, id generation).
//! The in-memory implementations live in `impls`.

pub mod broker;
pub mod clock;
pub mod id_generator;
pub mod inspector;
pub mod task_store;

pub use self::broker::Broker;
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::inspector::{WorkerInspector, WorkerTasks};
pub use self::task_store::TaskStore;
