// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Grounding spec registration and lookup (§6, §4.5).

use crate::api_error::ApiError;
use crate::control_plane::ControlPlane;
use crate::handlers::authenticate;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use orra_core::GroundingSpec;

pub async fn register_grounding(
    State(control_plane): State<ControlPlane>,
    headers: HeaderMap,
    Json(spec): Json<GroundingSpec>,
) -> Result<StatusCode, ApiError> {
    let project = authenticate(&control_plane, &headers)?;
    control_plane.register_grounding(project.id, spec)?;
    Ok(StatusCode::CREATED)
}

pub async fn list_groundings(
    State(control_plane): State<ControlPlane>,
    headers: HeaderMap,
) -> Result<Json<Vec<GroundingSpec>>, ApiError> {
    let project = authenticate(&control_plane, &headers)?;
    Ok(Json(control_plane.list_groundings(project.id)))
}

pub async fn delete_grounding(
    State(control_plane): State<ControlPlane>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    let project = authenticate(&control_plane, &headers)?;
    if control_plane.delete_grounding(project.id, &name) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(orra_core::CoreError::NotExist("grounding", name).into())
    }
}

pub async fn delete_all_groundings(
    State(control_plane): State<ControlPlane>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let project = authenticate(&control_plane, &headers)?;
    control_plane.delete_all_groundings(project.id);
    Ok(StatusCode::NO_CONTENT)
}
