// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `/ws` upgrade a connected service speaks the control-plane wire
//! protocol over (§6): one socket per `serviceId`, framed as
//! [`Envelope<InboundPayload>`] / [`Envelope<OutboundPayload>`].

use crate::control_plane::ControlPlane;
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use orra_core::{ExecutionState, IdempotencyKey, ServiceId};
use orra_wire::{CompensationResultStatus, Envelope, InboundPayload, OutboundPayload};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Deserialize)]
pub struct WsQuery {
    #[serde(rename = "apiKey")]
    pub api_key: String,
    #[serde(rename = "serviceId")]
    pub service_id: String,
}

pub async fn ws_handler(State(control_plane): State<ControlPlane>, Query(query): Query<WsQuery>, ws: WebSocketUpgrade) -> Response {
    let Some(project) = control_plane.project_for_key(&query.api_key) else {
        return (axum::http::StatusCode::UNAUTHORIZED, "invalid apiKey").into_response();
    };
    let service_id = ServiceId::from_string(&query.service_id);
    if !control_plane.list_services(project.id).iter().any(|s| s.id == service_id) {
        return (axum::http::StatusCode::UNAUTHORIZED, "serviceId not registered for this project").into_response();
    }

    let max_frame_bytes = control_plane.config().max_frame_bytes;
    ws.max_frame_size(max_frame_bytes).on_upgrade(move |socket| handle_socket(socket, control_plane, service_id))
}

async fn handle_socket(socket: WebSocket, control_plane: ControlPlane, service_id: ServiceId) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(64);

    control_plane.sessions().attach(service_id, tx.clone());
    control_plane.set_service_healthy(service_id, true);
    info!(%service_id, "service connected");

    let write_deadline = control_plane.config().write_deadline;
    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if tokio::time::timeout(write_deadline, sink.send(message)).await.is_err() {
                break;
            }
        }
    });

    let last_pong = Arc::new(parking_lot::Mutex::new(Instant::now()));
    let ping_task = spawn_ping_loop(control_plane.clone(), service_id, tx.clone(), last_pong.clone());

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => handle_frame(&control_plane, &tx, &last_pong, &text).await,
            Message::Close(_) => break,
            _ => {}
        }
    }

    ping_task.abort();
    writer.abort();
    control_plane.sessions().detach(&service_id);
    control_plane.set_service_healthy(service_id, false);
    info!(%service_id, "service disconnected");
}

async fn handle_frame(control_plane: &ControlPlane, tx: &mpsc::Sender<Message>, last_pong: &Arc<parking_lot::Mutex<Instant>>, text: &str) {
    let envelope: Envelope<InboundPayload> = match serde_json::from_str(text) {
        Ok(e) => e,
        Err(err) => {
            warn!(%err, "dropping unparseable inbound frame");
            return;
        }
    };

    if envelope.payload.is_pong() {
        *last_pong.lock() = Instant::now();
        return;
    }

    record_inbound(control_plane, &envelope.payload);

    let ack = Envelope::new(nanoid::nanoid!(), OutboundPayload::Ack { acked_id: envelope.id });
    if let Ok(text) = serde_json::to_string(&ack) {
        let _ = tx.send(Message::Text(text)).await;
    }
}

/// Translates an inbound `task_result` / `compensation_result` frame into
/// the idempotency-store transition the waiting `TaskWorker` /
/// `CompensationWorker` polls for (§4.7, §4.10).
fn record_inbound(control_plane: &ControlPlane, payload: &InboundPayload) {
    match payload {
        InboundPayload::TaskStatus { .. } => {}
        InboundPayload::TaskResult { service_id, idempotency_key, result, error, .. } => {
            let store = control_plane.idempotency_store(service_id);
            let now_ms = control_plane.clock_epoch_ms();
            match error {
                Some(message) => {
                    store.update_result(idempotency_key, ExecutionState::Failed, None, Some(message.clone()), now_ms).ok();
                }
                None => {
                    store.update_result(idempotency_key, ExecutionState::Completed, result.clone(), None, now_ms).ok();
                }
            }
        }
        InboundPayload::CompensationResult { service_id, idempotency_key, status, error, partial, .. } => {
            let store = control_plane.idempotency_store(service_id);
            let now_ms = control_plane.clock_epoch_ms();
            let value = json!({
                "status": status_str(*status),
                "error": error,
                "partial": partial.as_ref().map(|p| json!({"completed": p.completed, "remaining": p.remaining})),
            });
            store.update_result(idempotency_key, ExecutionState::Completed, Some(value), None, now_ms).ok();
        }
        InboundPayload::Pong => {}
    }
}

fn status_str(status: CompensationResultStatus) -> &'static str {
    match status {
        CompensationResultStatus::Completed => "completed",
        CompensationResultStatus::Partial => "partial",
        CompensationResultStatus::Failed => "failed",
    }
}

fn spawn_ping_loop(
    control_plane: ControlPlane,
    service_id: ServiceId,
    tx: mpsc::Sender<Message>,
    last_pong: Arc<parking_lot::Mutex<Instant>>,
) -> tokio::task::JoinHandle<()> {
    let ping_interval = control_plane.config().ping_interval;
    let pong_wait = control_plane.config().pong_wait;

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ping_interval);
        loop {
            ticker.tick().await;

            if last_pong.lock().elapsed() > pong_wait {
                control_plane.set_service_healthy(service_id, false);
                let frame = CloseFrame { code: close_code::POLICY, reason: "pong timeout".into() };
                let _ = tx.send(Message::Close(Some(frame))).await;
                return;
            }

            let envelope = Envelope::new(nanoid::nanoid!(), OutboundPayload::Ping);
            let Ok(text) = serde_json::to_string(&envelope) else { continue };
            if tx.send(Message::Text(text)).await.is_err() {
                return;
            }
        }
    })
}
