//! Reschedule decision: what a task does after an attempt returns.

use super::retry::RetryConfig;
use super::status::is_success;

/// The next action after an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// 2xx: finalize as succeeded.
    Complete,

    /// Failed out-of-band run: re-arm the timer, schedule time unchanged.
    Stop,

    /// Failed and out of attempts: finalize as exhausted.
    Exhausted,

    /// Failed with attempts left: back off and arm a new timer.
    Retry,
}

impl Decision {
    /// Pure decision over the attempt result.
    ///
    /// `dispatch_count` is the count after the attempt was recorded.
    pub fn decide(
        http_status: i32,
        retry_enabled: bool,
        dispatch_count: u32,
        retry: &RetryConfig,
    ) -> Self {
        if is_success(http_status) {
            Decision::Complete
        } else if !retry_enabled {
            Decision::Stop
        } else if retry.is_exhausted(dispatch_count) {
            Decision::Exhausted
        } else {
            Decision::Retry
        }
    }
}
