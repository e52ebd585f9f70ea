// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tracks the live WebSocket session for each connected service (§6): one
//! outbound channel per `serviceId`, fed by the axum upgrade handler in
//! [`crate::ws`]. [`crate::control_plane::ControlPlane`]'s `TaskDispatch`
//! implementation sends through this registry.

use orra_core::ServiceId;
use orra_engine::DispatchError;
use orra_wire::{Envelope, OutboundPayload};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

pub type OutboundSender = mpsc::Sender<axum::extract::ws::Message>;

#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<ServiceId, OutboundSender>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, service_id: ServiceId, sender: OutboundSender) {
        self.sessions.write().insert(service_id, sender);
    }

    pub fn detach(&self, service_id: &ServiceId) {
        self.sessions.write().remove(service_id);
    }

    pub fn is_connected(&self, service_id: &ServiceId) -> bool {
        self.sessions.read().contains_key(service_id)
    }

    pub async fn send(&self, service_id: &ServiceId, payload: OutboundPayload) -> Result<(), DispatchError> {
        let sender = self
            .sessions
            .read()
            .get(service_id)
            .cloned()
            .ok_or_else(|| DispatchError::NoSession(*service_id))?;

        let envelope = Envelope::new(nanoid::nanoid!(), payload);
        let text = serde_json::to_string(&envelope).map_err(|e| DispatchError::SendFailed(e.to_string()))?;

        sender
            .send(axum::extract::ws::Message::Text(text))
            .await
            .map_err(|e| DispatchError::SendFailed(e.to_string()))
    }
}
