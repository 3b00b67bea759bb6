//! Rate policy of a queue: dispatch rate, burst and concurrency.

use serde::{Deserialize, Serialize};

use super::errors::EmulatorError;
use super::queue::RateSpec;

pub const DEFAULT_MAX_DISPATCHES_PER_SECOND: f64 = 500.0;
pub const DEFAULT_MAX_BURST_SIZE: u32 = 100;
pub const DEFAULT_MAX_CONCURRENT_DISPATCHES: u32 = 1000;

/// Validated rate policy of a queue.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimits {
    pub max_dispatches_per_second: f64,
    /// Token bucket capacity.
    pub max_burst_size: u32,
    pub max_concurrent_dispatches: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            max_dispatches_per_second: DEFAULT_MAX_DISPATCHES_PER_SECOND,
            max_burst_size: DEFAULT_MAX_BURST_SIZE,
            max_concurrent_dispatches: DEFAULT_MAX_CONCURRENT_DISPATCHES,
        }
    }
}

impl RateLimits {
    /// Validate a client policy. Unset or zero fields take the defaults.
    pub fn from_spec(spec: &RateSpec) -> Result<Self, EmulatorError> {
        let defaults = Self::default();

        let max_dispatches_per_second = match spec.max_dispatches_per_second {
            None => defaults.max_dispatches_per_second,
            Some(rate) if !rate.is_finite() || rate < 0.0 => {
                return Err(EmulatorError::InvalidArgument(
                    "max_dispatches_per_second must be a finite, non-negative number".to_string(),
                ));
            }
            Some(rate) if rate == 0.0 => defaults.max_dispatches_per_second,
            Some(rate) => rate,
        };
        let max_burst_size = count("max_burst_size", spec.max_burst_size)?
            .unwrap_or(defaults.max_burst_size);
        let max_concurrent_dispatches =
            count("max_concurrent_dispatches", spec.max_concurrent_dispatches)?
                .unwrap_or(defaults.max_concurrent_dispatches);

        Ok(Self {
            max_dispatches_per_second,
            max_burst_size,
            max_concurrent_dispatches,
        })
    }
}

/// `Ok(None)` for unset or zero.
fn count(field: &str, value: Option<i32>) -> Result<Option<u32>, EmulatorError> {
    match value {
        None | Some(0) => Ok(None),
        Some(n) => u32::try_from(n)
            .map(Some)
            .map_err(|_| EmulatorError::InvalidArgument(format!("{field} must not be negative"))),
    }
}
