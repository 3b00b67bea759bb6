//! Errors returned by administrative operations.
//!
//! Dispatch failures never show up here: they are retry triggers recorded in a
//! task's attempt history, not errors.

use thiserror::Error;

use super::status::Code;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmulatorError {
    /// Malformed resource name or policy value.
    #[error("{0}")]
    InvalidArgument(String),

    /// A live resource already uses the name.
    #[error("{0}")]
    AlreadyExists(String),

    /// The name was used too recently (tombstoned), or the resource is in a
    /// state that forbids the operation.
    #[error("{0}")]
    FailedPrecondition(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unimplemented(String),
}

impl EmulatorError {
    pub fn code(&self) -> Code {
        match self {
            EmulatorError::InvalidArgument(_) => Code::InvalidArgument,
            EmulatorError::AlreadyExists(_) => Code::AlreadyExists,
            EmulatorError::FailedPrecondition(_) => Code::FailedPrecondition,
            EmulatorError::NotFound(_) => Code::NotFound,
            EmulatorError::Unimplemented(_) => Code::Unimplemented,
        }
    }

    pub(crate) fn not_implemented() -> Self {
        EmulatorError::Unimplemented("Not yet implemented".to_string())
    }
}

/// Malformed configuration values.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}
