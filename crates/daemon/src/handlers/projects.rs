// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project registration, API keys, and webhook registration (§6).

use crate::api_error::ApiError;
use crate::control_plane::ControlPlane;
use crate::handlers::authenticate;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use orra_core::ProjectId;
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
pub struct RegisterProjectResponse {
    pub id: ProjectId,
    #[serde(rename = "apiKey")]
    pub api_key: String,
}

pub async fn register_project(State(control_plane): State<ControlPlane>) -> Json<RegisterProjectResponse> {
    let project = control_plane.register_project();
    Json(RegisterProjectResponse { id: project.id, api_key: project.primary_api_key })
}

#[derive(Deserialize)]
pub struct CreateApiKeyRequest {
    pub label: Option<String>,
}

pub async fn create_api_key(
    State(control_plane): State<ControlPlane>,
    headers: HeaderMap,
    Json(request): Json<CreateApiKeyRequest>,
) -> Result<(StatusCode, Json<orra_core::ApiKey>), ApiError> {
    let project = authenticate(&control_plane, &headers)?;
    let api_key = control_plane.add_api_key(project.id, request.label)?;
    Ok((StatusCode::CREATED, Json(api_key)))
}

#[derive(Deserialize)]
pub struct RegisterWebhookRequest {
    pub url: String,
}

pub async fn register_webhook(
    State(control_plane): State<ControlPlane>,
    headers: HeaderMap,
    Json(request): Json<RegisterWebhookRequest>,
) -> Result<StatusCode, ApiError> {
    let project = authenticate(&control_plane, &headers)?;
    control_plane.add_webhook(project.id, request.url)?;
    Ok(StatusCode::CREATED)
}
