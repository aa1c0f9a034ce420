use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::TaskId;
use super::errors::CoreError;

/// Name of a registered work function.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskType(String);

impl TaskType {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identity of a worker in the fleet (`name@host` by convention).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerName(String);

impl WorkerName {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Two-tier execution deadline.
///
/// At `soft` the work function's cancellation token fires so it can wind down
/// and return a partial result. At `hard` execution is aborted and the task
/// fails, whatever the work function is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeLimits {
    pub soft: Duration,
    pub hard: Duration,
}

impl TimeLimits {
    pub const DEFAULT_SOFT: Duration = Duration::from_secs(7100);
    pub const DEFAULT_HARD: Duration = Duration::from_secs(7200);

    pub fn new(soft: Duration, hard: Duration) -> Result<Self, CoreError> {
        if soft >= hard {
            return Err(CoreError::InvalidTimeLimits { soft, hard });
        }
        Ok(Self { soft, hard })
    }

    /// Time between the soft signal and the hard abort.
    pub fn grace(&self) -> Duration {
        self.hard.saturating_sub(self.soft)
    }
}

impl Default for TimeLimits {
    fn default() -> Self {
        Self {
            soft: Self::DEFAULT_SOFT,
            hard: Self::DEFAULT_HARD,
        }
    }
}

/// What travels through the work queue: id + type + payload, plus the
/// scheduling data a worker needs (eta, time limits).
///
/// State is never carried here; the task store is the only place that holds it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEnvelope {
    task_id: TaskId,
    task_type: TaskType,
    payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    eta: Option<DateTime<Utc>>,
    #[serde(default)]
    limits: TimeLimits,
}

impl TaskEnvelope {
    pub fn new(task_id: TaskId, task_type: TaskType, payload: serde_json::Value) -> Self {
        Self {
            task_id,
            task_type,
            payload,
            eta: None,
            limits: TimeLimits::default(),
        }
    }

    pub fn with_eta(mut self, eta: Option<DateTime<Utc>>) -> Self {
        self.eta = eta;
        self
    }

    pub fn with_limits(mut self, limits: TimeLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn task_type(&self) -> &TaskType {
        &self.task_type
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    /// Earliest start time, if the task was submitted with a countdown.
    pub fn eta(&self) -> Option<DateTime<Utc>> {
        self.eta
    }

    pub fn limits(&self) -> TimeLimits {
        self.limits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_limits_require_soft_before_hard() {
        let ok = TimeLimits::new(Duration::from_secs(1), Duration::from_secs(2)).unwrap();
        assert_eq!(ok.grace(), Duration::from_secs(1));

        let err = TimeLimits::new(Duration::from_secs(2), Duration::from_secs(2)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidTimeLimits { .. }));
    }

    #[test]
    fn default_limits_match_background_task() {
        let limits = TimeLimits::default();
        assert_eq!(limits.soft, Duration::from_secs(7100));
        assert_eq!(limits.hard, Duration::from_secs(7200));
    }
}
