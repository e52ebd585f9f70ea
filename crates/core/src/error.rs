// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error kinds shared across the control plane.
//!
//! [`CoreError`] is the single error type workers, the planner, and the
//! stores return. It carries enough structure for `orra-daemon` to map it
//! to an HTTP status + JSON body without string-matching.

use thiserror::Error;

/// The external error classification from the spec's error handling design.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidRequest,
    Unauthorized,
    NotExist,
    Validation,
    ActionNotActionable,
    ActionCannotExecute,
    Unanticipated,
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("{0} not found: {1}")]
    NotExist(&'static str, String),

    #[error("validation failed for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("action is not actionable: {0}")]
    NotActionable(String),

    #[error("action cannot execute: {0}")]
    CannotExecute(String),

    #[error("retryable: {0}")]
    Retryable(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("plan cache error: {0}")]
    Cache(String),

    #[error("unanticipated error: {0}")]
    Unanticipated(String),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            CoreError::Unauthorized => ErrorKind::Unauthorized,
            CoreError::NotExist(..) => ErrorKind::NotExist,
            CoreError::Validation { .. } => ErrorKind::Validation,
            CoreError::NotActionable(_) => ErrorKind::ActionNotActionable,
            CoreError::CannotExecute(_) => ErrorKind::ActionCannotExecute,
            CoreError::Retryable(_) => ErrorKind::Unanticipated,
            CoreError::Transport(_) => ErrorKind::Unanticipated,
            CoreError::Storage(_) => ErrorKind::Unanticipated,
            CoreError::Cache(_) => ErrorKind::Unanticipated,
            CoreError::Unanticipated(_) => ErrorKind::Unanticipated,
        }
    }

    /// Whether a task-execution retry loop should keep retrying on this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Retryable(_) | CoreError::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_actionable_is_permanent_kind() {
        let err = CoreError::NotActionable("final task present".into());
        assert_eq!(err.kind(), ErrorKind::ActionNotActionable);
        assert!(!err.is_retryable());
    }

    #[test]
    fn transport_errors_are_retryable() {
        let err = CoreError::Transport("session missing".into());
        assert!(err.is_retryable());
    }
}
