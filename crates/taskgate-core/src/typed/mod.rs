//! Typed - 型付き work function API
//!
//! task_type の typo を型で排除し、payload 型と Handler の対応付けを
//! 静的に保証します。
//!
//! # 二層構造
//! - **表層（Typed）**: `Job` trait, `Handler<J>` trait - 型安全
//! - **内部（Dyn）**: `TaskHandler` trait - object-safe, type erasure

pub mod codec;
pub mod context;
pub mod handler;
pub mod job;
pub mod registry;

pub use self::codec::{decode_payload, encode_job, encode_output};
pub use self::context::TaskContext;
pub use self::handler::{Handler, TaskHandler, TypedHandler};
pub use self::job::Job;
pub use self::registry::{HandlerRegistry, TaskOptions};
