//! Attempt record: one execution of a task's dispatch target.

use serde::{Deserialize, Serialize};

use super::status::Status;
use super::time::Timestamp;

/// A single dispatch of a task.
///
/// Written in two steps: `schedule_time`/`dispatch_time` when the call is
/// issued, `response_time`/`response_status` when it returns. Never modified
/// after that.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Attempt {
    /// When this attempt was due.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_time: Option<Timestamp>,

    /// When the call was issued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatch_time: Option<Timestamp>,

    /// When the call returned (or failed).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time: Option<Timestamp>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_status: Option<Status>,
}

impl Attempt {
    /// An attempt that has just been dispatched.
    pub fn dispatched(schedule_time: Timestamp, dispatch_time: Timestamp) -> Self {
        Self {
            schedule_time: Some(schedule_time),
            dispatch_time: Some(dispatch_time),
            response_time: None,
            response_status: None,
        }
    }

    /// Record the result of the call.
    pub fn complete(&mut self, response_time: Timestamp, status: Status) {
        self.response_time = Some(response_time);
        self.response_status = Some(status);
    }

    pub fn is_complete(&self) -> bool {
        self.response_status.is_some()
    }
}
