//! Retry policy: attempt limits and exponential backoff.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::EmulatorError;
use super::queue::RetrySpec;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 100;
pub const DEFAULT_MIN_BACKOFF: Duration = Duration::from_millis(100);
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(3600);
pub const DEFAULT_MAX_DOUBLINGS: u32 = 16;

/// Validated retry policy of a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// 0 = unbounded.
    pub max_attempts: u32,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
    pub max_doublings: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            min_backoff: DEFAULT_MIN_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            max_doublings: DEFAULT_MAX_DOUBLINGS,
        }
    }
}

impl RetryConfig {
    /// Validate a client policy, filling unset fields.
    ///
    /// Unset fields and zero backoffs take the defaults. `max_attempts: 0`
    /// is unbounded and `max_doublings: 0` keeps the backoff constant.
    pub fn from_spec(spec: &RetrySpec) -> Result<Self, EmulatorError> {
        let defaults = Self::default();

        let max_attempts = match spec.max_attempts {
            None => defaults.max_attempts,
            Some(n) => non_negative("max_attempts", n)?,
        };
        let max_doublings = match spec.max_doublings {
            None => defaults.max_doublings,
            Some(n) => non_negative("max_doublings", n)?,
        };
        let min_backoff = backoff("min_backoff", spec.min_backoff)?.unwrap_or(defaults.min_backoff);
        let max_backoff = backoff("max_backoff", spec.max_backoff)?.unwrap_or(defaults.max_backoff);

        if min_backoff > max_backoff {
            return Err(EmulatorError::InvalidArgument(
                "min_backoff must not be greater than max_backoff".to_string(),
            ));
        }

        Ok(Self {
            max_attempts,
            min_backoff,
            max_backoff,
            max_doublings,
        })
    }

    /// Delay before the next attempt, given the attempts made so far.
    ///
    /// `min_backoff * 2^min(dispatch_count - 1, max_doublings)`, capped at
    /// `max_backoff`. Overflow saturates to `max_backoff`.
    pub fn backoff(&self, dispatch_count: u32) -> Duration {
        let doublings = dispatch_count.saturating_sub(1).min(self.max_doublings);
        let factor = match 1u32.checked_shl(doublings) {
            Some(factor) => factor,
            None => return self.max_backoff,
        };
        self.min_backoff
            .checked_mul(factor)
            .map_or(self.max_backoff, |d| d.min(self.max_backoff))
    }

    /// True when `dispatch_count` attempts use up the policy.
    pub fn is_exhausted(&self, dispatch_count: u32) -> bool {
        self.max_attempts > 0 && dispatch_count >= self.max_attempts
    }
}

fn non_negative(field: &str, value: i32) -> Result<u32, EmulatorError> {
    u32::try_from(value)
        .map_err(|_| EmulatorError::InvalidArgument(format!("{field} must not be negative")))
}

/// `Ok(None)` for unset or zero.
fn backoff(field: &str, secs: Option<f64>) -> Result<Option<Duration>, EmulatorError> {
    match secs {
        None => Ok(None),
        Some(s) if s == 0.0 => Ok(None),
        Some(s) => Duration::try_from_secs_f64(s).map(Some).map_err(|_| {
            EmulatorError::InvalidArgument(format!("{field} must be a finite, non-negative duration"))
        }),
    }
}
