// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `POST /register/service` and `POST /register/agent` (§6). Both register
//! into the same per-project [`orra_storage::ServiceRegistry`]; only the
//! [`ServiceType`] differs.

use crate::api_error::ApiError;
use crate::control_plane::ControlPlane;
use crate::handlers::authenticate;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use orra_core::{ServiceId, ServiceSchema, ServiceType};
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
pub struct RegisterServiceRequest {
    pub name: String,
    pub description: String,
    pub schema: ServiceSchema,
    #[serde(default)]
    pub revertible: bool,
}

#[derive(Serialize)]
pub struct RegisterServiceResponse {
    pub id: ServiceId,
    pub version: u32,
}

pub async fn register_service(
    State(control_plane): State<ControlPlane>,
    headers: HeaderMap,
    Json(request): Json<RegisterServiceRequest>,
) -> Result<(StatusCode, Json<RegisterServiceResponse>), ApiError> {
    register(control_plane, headers, request, ServiceType::Service).await
}

pub async fn register_agent(
    State(control_plane): State<ControlPlane>,
    headers: HeaderMap,
    Json(request): Json<RegisterServiceRequest>,
) -> Result<(StatusCode, Json<RegisterServiceResponse>), ApiError> {
    register(control_plane, headers, request, ServiceType::Agent).await
}

async fn register(
    control_plane: ControlPlane,
    headers: HeaderMap,
    request: RegisterServiceRequest,
    service_type: ServiceType,
) -> Result<(StatusCode, Json<RegisterServiceResponse>), ApiError> {
    let project = authenticate(&control_plane, &headers)?;
    let (id, outcome) = control_plane.register_service(
        project.id,
        request.name,
        request.description,
        service_type,
        request.schema,
        request.revertible,
    )?;
    let version = match outcome {
        orra_storage::RegisterOutcome::Registered => 1,
        orra_storage::RegisterOutcome::Reregistered { previous_version } => previous_version + 1,
    };
    Ok((StatusCode::CREATED, Json(RegisterServiceResponse { id, version })))
}
