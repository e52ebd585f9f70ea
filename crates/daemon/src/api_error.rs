// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Maps a [`CoreError`] to an HTTP response in one place (§7.1), so handlers
//! just return `Result<T, ApiError>` and never touch `StatusCode` directly.

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use orra_core::CoreError;
use orra_wire::{ApiErrorBody, CP_VERSION, CP_VERSION_HEADER};

pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody::from(&self.0);
        let status = StatusCode::from_u16(ApiErrorBody::status_code(self.0.kind())).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, Json(body)).into_response();
        response.headers_mut().insert(CP_VERSION_HEADER, HeaderValue::from_static(CP_VERSION));
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_maps_to_401_with_version_header() {
        let response = ApiError(CoreError::Unauthorized).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers().get(CP_VERSION_HEADER).unwrap(), CP_VERSION);
    }

    #[test]
    fn not_exist_maps_to_404() {
        let response = ApiError(CoreError::NotExist("project", "prj-missing".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
