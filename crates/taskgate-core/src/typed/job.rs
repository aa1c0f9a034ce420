//! Job trait - 型付き payload と task_type の対応付け
//!
//! # 学習ポイント
//! - Associated Constants (`const NAME`)
//! - Associated Types (`type Output`)

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::domain::TaskType;

/// A Job is the payload type of one work function.
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Resize { width: u32 }
///
/// impl Job for Resize {
///     const NAME: &'static str = "images.resize";
///     type Output = String;
/// }
/// ```
pub trait Job: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Registered task type; the name clients submit under.
    const NAME: &'static str;

    /// Stored as the SUCCESS result.
    type Output: Serialize + Send + 'static;

    fn task_type() -> TaskType {
        TaskType::new(Self::NAME)
    }
}
