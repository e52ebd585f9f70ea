// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON error envelope returned by the HTTP API (§7.1).

use orra_core::{CoreError, ErrorKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiErrorBody {
    pub fn code_for(kind: ErrorKind) -> &'static str {
        match kind {
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::NotExist => "not_exist",
            ErrorKind::Validation => "validation",
            ErrorKind::ActionNotActionable => "action_not_actionable",
            ErrorKind::ActionCannotExecute => "action_cannot_execute",
            ErrorKind::Unanticipated => "unanticipated",
        }
    }

    pub fn status_code(kind: ErrorKind) -> u16 {
        match kind {
            ErrorKind::InvalidRequest => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::NotExist => 404,
            ErrorKind::Validation => 400,
            ErrorKind::ActionNotActionable => 400,
            ErrorKind::ActionCannotExecute => 500,
            ErrorKind::Unanticipated => 500,
        }
    }
}

impl From<&CoreError> for ApiErrorBody {
    fn from(err: &CoreError) -> Self {
        ApiErrorBody {
            code: Self::code_for(err.kind()),
            message: err.to_string(),
            details: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_actionable_maps_to_400() {
        let err = CoreError::NotActionable("no capable service".to_string());
        let body = ApiErrorBody::from(&err);
        assert_eq!(body.code, "action_not_actionable");
        assert_eq!(ApiErrorBody::status_code(err.kind()), 400);
    }

    #[test]
    fn cannot_execute_maps_to_500() {
        let err = CoreError::CannotExecute("planner exhausted retries".to_string());
        assert_eq!(ApiErrorBody::status_code(err.kind()), 500);
    }
}
