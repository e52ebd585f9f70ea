// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the control-plane REST surface (§6).

pub mod groundings;
pub mod health;
pub mod orchestrations;
pub mod projects;
pub mod services;

use crate::control_plane::ControlPlane;
use axum::http::HeaderMap;
use orra_core::{CoreError, Project};

/// Resolves the calling project from an `Authorization: Bearer <apiKey>`
/// header. Every mutating endpoint requires one (§6).
pub fn authenticate(control_plane: &ControlPlane, headers: &HeaderMap) -> Result<Project, CoreError> {
    let header = headers.get(axum::http::header::AUTHORIZATION).ok_or(CoreError::Unauthorized)?;
    let header = header.to_str().map_err(|_| CoreError::Unauthorized)?;
    let api_key = header.strip_prefix("Bearer ").ok_or(CoreError::Unauthorized)?;
    control_plane.project_for_key(api_key).ok_or(CoreError::Unauthorized)
}
