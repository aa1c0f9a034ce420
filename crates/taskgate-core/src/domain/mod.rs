//! Domain model (ids, state machine, records, read models, errors).

pub mod errors;
pub mod ids;
pub mod record;
pub mod state;
pub mod task;
pub mod view;

pub use errors::{CoreError, TransitionError, WorkFault};
pub use ids::{IdParseError, TaskId};
pub use record::{ExecutionMeta, TaskOutcome, TaskRecord};
pub use state::TaskState;
pub use task::{TaskEnvelope, TaskType, TimeLimits, WorkerName};
pub use view::{PENDING_MESSAGE, PendingEntry, QueueCategory, REVOKED_MESSAGE, TaskView};
