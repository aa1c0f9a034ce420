//! Command-line / environment configuration.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use clap::{Parser, ValueEnum};
use taskgate_core::{TaskStoreConfig, TimeLimits, WorkerConfig, WorkerName};

/// TaskGate: HTTP task dispatch with an in-process worker pool.
#[derive(Parser, Debug, Clone)]
#[command(name = "taskgate", version, about)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to.
    #[arg(long, env = "HOST")]
    pub host: String,

    /// Port to bind the HTTP listener to.
    #[arg(long, env = "PORT")]
    pub port: u16,

    /// Number of worker processes to run in-process.
    #[arg(long, env = "TASKGATE_WORKERS", default_value_t = 2)]
    pub workers: usize,

    /// Concurrent executions per worker.
    #[arg(long, env = "TASKGATE_CONCURRENCY", default_value_t = 4)]
    pub concurrency: usize,

    /// Deliveries each worker may hold per execution slot.
    #[arg(long, env = "TASKGATE_PREFETCH", default_value_t = 4)]
    pub prefetch_multiplier: usize,

    /// Node name used in worker names (`worker<N>@<node>`).
    #[arg(long, env = "TASKGATE_NODE", default_value = "localhost")]
    pub node_name: String,

    /// Soft time limit in seconds.
    #[arg(long, env = "TASKGATE_SOFT_TIME_LIMIT", default_value_t = 7100)]
    pub soft_time_limit_secs: u64,

    /// Hard time limit in seconds.
    #[arg(long, env = "TASKGATE_HARD_TIME_LIMIT", default_value_t = 7200)]
    pub hard_time_limit_secs: u64,

    /// How long the demo background job sleeps.
    #[arg(long, env = "TASKGATE_BACKGROUND_JOB_SECS", default_value_t = 10)]
    pub background_job_secs: u64,

    /// Retention of task records after their last update.
    #[arg(long, env = "TASKGATE_RESULT_TTL", default_value_t = 86_400)]
    pub result_ttl_secs: u64,

    /// Retention of per-execution metadata.
    #[arg(long, env = "TASKGATE_META_TTL", default_value_t = 10_800)]
    pub execution_meta_ttl_secs: u64,

    /// Seconds between garbage-collection sweeps.
    #[arg(long, env = "TASKGATE_GC_INTERVAL", default_value_t = 60)]
    pub gc_interval_secs: u64,

    /// Upper bound on a single store / broker call, in seconds.
    #[arg(long, env = "TASKGATE_BACKEND_TIMEOUT", default_value_t = 5)]
    pub backend_timeout_secs: u64,

    /// How API keys are checked.
    #[arg(long, env = "TASKGATE_AUTH_MODE", value_enum, default_value_t = AuthMode::AlwaysAllow)]
    pub auth_mode: AuthMode,

    /// Accepted keys for `key-lookup` mode (comma-separated).
    #[arg(long, env = "TASKGATE_API_KEYS", value_delimiter = ',')]
    pub api_keys: Vec<String>,

    /// Use the first X-Forwarded-For hop as the client identity.
    #[arg(long, env = "TASKGATE_TRUST_FORWARDED_FOR")]
    pub trust_forwarded_for: bool,

    /// Log output format.
    #[arg(long, env = "TASKGATE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AuthMode {
    /// Any non-empty key is accepted.
    AlwaysAllow,
    /// Only keys listed in `--api-keys` are accepted.
    KeyLookup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid HOST '{0}': expected an IP address")]
    InvalidHost(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("soft time limit ({soft}s) must be below hard time limit ({hard}s)")]
    TimeLimits { soft: u64, hard: u64 },

    #[error("auth mode key-lookup requires at least one API key")]
    NoApiKeys,
}

impl ServerConfig {
    /// Check everything that can be checked before binding or spawning.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        for (name, value) in [
            ("workers", self.workers as u64),
            ("concurrency", self.concurrency as u64),
            ("prefetch multiplier", self.prefetch_multiplier as u64),
            ("gc interval", self.gc_interval_secs),
            ("backend timeout", self.backend_timeout_secs),
            ("result ttl", self.result_ttl_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero(name));
            }
        }
        self.time_limits()?;
        if self.auth_mode == AuthMode::KeyLookup && self.api_keys.iter().all(|k| k.is_empty()) {
            return Err(ConfigError::NoApiKeys);
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|_| ConfigError::InvalidHost(self.host.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn time_limits(&self) -> Result<TimeLimits, ConfigError> {
        let (soft, hard) = (self.soft_time_limit_secs, self.hard_time_limit_secs);
        TimeLimits::new(Duration::from_secs(soft), Duration::from_secs(hard))
            .map_err(|_| ConfigError::TimeLimits { soft, hard })
    }

    pub fn store_config(&self) -> TaskStoreConfig {
        TaskStoreConfig {
            result_ttl: Duration::from_secs(self.result_ttl_secs),
            execution_meta_ttl: Duration::from_secs(self.execution_meta_ttl_secs),
        }
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            concurrency: self.concurrency,
            prefetch_multiplier: self.prefetch_multiplier,
            ..WorkerConfig::default()
        }
    }

    pub fn worker_names(&self) -> Vec<WorkerName> {
        (1..=self.workers)
            .map(|i| WorkerName::new(format!("worker{i}@{}", self.node_name)))
            .collect()
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_secs)
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval_secs)
    }

    pub fn background_job_duration(&self) -> Duration {
        Duration::from_secs(self.background_job_secs)
    }
}
