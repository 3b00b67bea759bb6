//! Queue data: creation spec, operational state and snapshots.

use serde::{Deserialize, Serialize};

use super::ids::QueueName;
use super::rate::RateLimits;
use super::retry::RetryConfig;
use crate::observability::QueueStats;

/// Operational state of a queue.
///
/// `Running <-> Paused`, either -> `Deleted`. Nothing leaves `Deleted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueState {
    Running,
    Paused,
    Deleted,
}

impl QueueState {
    pub fn is_terminal(self) -> bool {
        matches!(self, QueueState::Deleted)
    }
}

/// Retry policy as submitted by a client. Unset fields take the service
/// defaults; see [`RetryConfig::from_spec`] for how zeros are read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrySpec {
    #[serde(default)]
    pub max_attempts: Option<i32>,
    /// Seconds.
    #[serde(default)]
    pub min_backoff: Option<f64>,
    /// Seconds.
    #[serde(default)]
    pub max_backoff: Option<f64>,
    #[serde(default)]
    pub max_doublings: Option<i32>,
}

/// Rate policy as submitted by a client. Unset or zero fields take the
/// service defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateSpec {
    #[serde(default)]
    pub max_dispatches_per_second: Option<f64>,
    #[serde(default)]
    pub max_burst_size: Option<i32>,
    #[serde(default)]
    pub max_concurrent_dispatches: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueSpec {
    /// Full queue name.
    pub name: String,
    #[serde(default)]
    pub retry_config: RetrySpec,
    #[serde(default)]
    pub rate_limits: RateSpec,
}

impl QueueSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_retry(mut self, retry: RetrySpec) -> Self {
        self.retry_config = retry;
        self
    }

    pub fn with_rate(mut self, rate: RateSpec) -> Self {
        self.rate_limits = rate;
        self
    }
}

/// Snapshot of a queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueRecord {
    pub name: QueueName,
    pub retry_config: RetryConfig,
    pub rate_limits: RateLimits,
    pub state: QueueState,
    pub stats: QueueStats,
}
