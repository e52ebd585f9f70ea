// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `GET /health` (§6): unauthenticated liveness probe.

use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use axum::Json;
use orra_wire::{CP_VERSION, CP_VERSION_HEADER};
use serde_json::json;

pub async fn health() -> Response {
    let mut response = Json(json!({"status": "ok"})).into_response();
    response.headers_mut().insert(CP_VERSION_HEADER, HeaderValue::from_static(CP_VERSION));
    response
}
