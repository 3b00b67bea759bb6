//! Status taxonomy: maps HTTP results onto canonical status codes.
//!
//! A dispatch returns a raw HTTP status (or [`DISPATCH_FAILED`]). The task's
//! attempt history does not store that number directly; it stores a canonical
//! [`Code`] plus a message that still mentions the raw status.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Sentinel returned by a dispatcher when no HTTP response was obtained
/// (connection error, timeout, malformed request).
pub const DISPATCH_FAILED: i32 = -1;

/// Canonical status codes.
///
/// Serialized as SCREAMING_SNAKE_CASE names (`OK`, `NOT_FOUND`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Code {
    Ok = 0,
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl Code {
    /// Map an HTTP status (or [`DISPATCH_FAILED`]) to a canonical code.
    pub fn from_http_status(status: i32) -> Self {
        match status {
            200..=299 => Code::Ok,
            400 => Code::InvalidArgument,
            401 => Code::Unauthenticated,
            403 => Code::PermissionDenied,
            404 => Code::NotFound,
            409 => Code::Aborted,
            416 => Code::OutOfRange,
            429 => Code::ResourceExhausted,
            499 => Code::Cancelled,
            501 => Code::Unimplemented,
            503 => Code::Unavailable,
            504 => Code::DeadlineExceeded,
            DISPATCH_FAILED => Code::Unavailable,
            400..=499 => Code::FailedPrecondition,
            500..=599 => Code::Internal,
            _ => Code::Unknown,
        }
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn name(self) -> &'static str {
        match self {
            Code::Ok => "OK",
            Code::Cancelled => "CANCELLED",
            Code::Unknown => "UNKNOWN",
            Code::InvalidArgument => "INVALID_ARGUMENT",
            Code::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Code::NotFound => "NOT_FOUND",
            Code::AlreadyExists => "ALREADY_EXISTS",
            Code::PermissionDenied => "PERMISSION_DENIED",
            Code::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Code::FailedPrecondition => "FAILED_PRECONDITION",
            Code::Aborted => "ABORTED",
            Code::OutOfRange => "OUT_OF_RANGE",
            Code::Unimplemented => "UNIMPLEMENTED",
            Code::Internal => "INTERNAL",
            Code::Unavailable => "UNAVAILABLE",
            Code::DataLoss => "DATA_LOSS",
            Code::Unauthenticated => "UNAUTHENTICATED",
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Response status recorded on an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub code: Code,
    pub message: String,
}

impl Status {
    /// Status for a raw dispatch result, e.g. `NOT_FOUND(5): HTTP status code 404`.
    pub fn from_http_status(status: i32) -> Self {
        let code = Code::from_http_status(status);
        Self {
            code,
            message: format!(
                "{}({}): HTTP status code {}",
                code.name(),
                code.as_i32(),
                status
            ),
        }
    }
}

/// Is `status` in the 2xx success range?
pub fn is_success(status: i32) -> bool {
    (200..=299).contains(&status)
}
