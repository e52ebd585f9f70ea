// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The narrow dispatch interface a [`crate::task_worker::TaskWorker`] needs
//! from the WebSocket transport (§4.3). The transport itself — session
//! bookkeeping, ping/pong, frame (de)serialisation — lives in `orra-daemon`
//! where the axum upgrade handler runs; this crate only depends on the
//! shape of "send a task, maybe fail".

use async_trait::async_trait;
use orra_core::ServiceId;
use orra_wire::TaskRequest;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no live session for service {0}")]
    NoSession(ServiceId),
    #[error("send failed: {0}")]
    SendFailed(String),
}

#[async_trait]
pub trait TaskDispatch: Send + Sync {
    async fn send_task(&self, service_id: &ServiceId, request: &TaskRequest) -> Result<(), DispatchError>;
    async fn send_compensation(&self, service_id: &ServiceId, request: &TaskRequest) -> Result<(), DispatchError>;
}
