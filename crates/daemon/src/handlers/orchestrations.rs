// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestration submission, listing, and inspection (§6).

use crate::api_error::ApiError;
use crate::control_plane::ControlPlane;
use crate::handlers::authenticate;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use orra_core::{Action, ActionParam, CoreError, LogEntry, Orchestration, OrchestrationId, OrchestrationStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Deserialize)]
pub struct SubmitOrchestrationRequest {
    pub action: Action,
    #[serde(default)]
    pub data: Vec<ActionParam>,
    pub webhook: String,
    pub timeout: Option<u64>,
    #[serde(rename = "healthCheckGracePeriod")]
    pub health_check_grace_period: Option<u64>,
}

pub async fn submit_orchestration(
    State(control_plane): State<ControlPlane>,
    headers: HeaderMap,
    Json(request): Json<SubmitOrchestrationRequest>,
) -> Result<(StatusCode, Json<Orchestration>), ApiError> {
    let project = authenticate(&control_plane, &headers)?;
    let orchestration = control_plane
        .submit_orchestration(
            project.id,
            request.action,
            request.data,
            request.webhook,
            request.timeout.map(Duration::from_secs),
            request.health_check_grace_period.map(Duration::from_secs),
        )
        .await?;
    Ok((StatusCode::ACCEPTED, Json(orchestration)))
}

pub async fn list_orchestrations(
    State(control_plane): State<ControlPlane>,
    headers: HeaderMap,
) -> Result<Json<HashMap<String, Vec<Orchestration>>>, ApiError> {
    let project = authenticate(&control_plane, &headers)?;
    let mut grouped: HashMap<String, Vec<Orchestration>> = HashMap::new();
    for orchestration in control_plane.list_orchestrations(project.id) {
        grouped.entry(orchestration.status.to_string()).or_default().push(orchestration);
    }
    for status in [
        OrchestrationStatus::Registered,
        OrchestrationStatus::Pending,
        OrchestrationStatus::Processing,
        OrchestrationStatus::Paused,
        OrchestrationStatus::Completed,
        OrchestrationStatus::Failed,
        OrchestrationStatus::NotActionable,
    ] {
        grouped.entry(status.to_string()).or_default();
    }
    Ok(Json(grouped))
}

#[derive(Serialize)]
pub struct InspectionResponse {
    pub orchestration: Orchestration,
    pub entries: Vec<LogEntry>,
}

pub async fn inspect_orchestration(
    State(control_plane): State<ControlPlane>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<InspectionResponse>, ApiError> {
    let project = authenticate(&control_plane, &headers)?;
    let orchestration_id = OrchestrationId::from_string(&id);
    let (orchestration, entries) = control_plane
        .inspect(&orchestration_id)
        .filter(|(o, _)| o.project_id == project.id)
        .ok_or_else(|| CoreError::NotExist("orchestration", id.clone()))?;
    Ok(Json(InspectionResponse { orchestration, entries }))
}
