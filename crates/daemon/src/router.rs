// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Assembles the axum [`Router`] (§6): one route per REST endpoint plus the
//! `/ws` upgrade, with HTTP tracing on every request.

use crate::control_plane::ControlPlane;
use crate::handlers::{groundings, health, orchestrations, projects, services};
use crate::ws;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

pub fn build(control_plane: ControlPlane) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/register/project", post(projects::register_project))
        .route("/apikeys", post(projects::create_api_key))
        .route("/webhooks", post(projects::register_webhook))
        .route("/register/service", post(services::register_service))
        .route("/register/agent", post(services::register_agent))
        .route("/orchestrations", post(orchestrations::submit_orchestration).get(orchestrations::list_orchestrations))
        .route("/orchestrations/inspections/:id", get(orchestrations::inspect_orchestration))
        .route("/groundings", post(groundings::register_grounding).get(groundings::list_groundings).delete(groundings::delete_all_groundings))
        .route("/groundings/:name", delete(groundings::delete_grounding))
        .route("/ws", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(control_plane)
}
