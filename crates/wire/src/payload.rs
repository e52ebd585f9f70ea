// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Payload types carried inside a WebSocket [`crate::Envelope`].

use orra_core::{ExecutionId, IdempotencyKey, ServiceId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Header name every HTTP response carries.
pub const CP_VERSION_HEADER: &str = "X-Orra-CP-Version";
/// Control-plane protocol version advertised in that header.
pub const CP_VERSION: &str = "1.0";

/// A task dispatched from the control plane to a service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    pub task_id: String,
    pub execution_id: ExecutionId,
    pub idempotency_key: IdempotencyKey,
    pub input: Value,
}

/// Payload types the control plane sends to a service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundPayload {
    TaskRequest(TaskRequest),
    CompensationRequest(TaskRequest),
    Ping,
    Ack { acked_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompensationResultStatus {
    Completed,
    Partial,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialCompensation {
    pub completed: Vec<String>,
    pub remaining: Vec<String>,
}

/// Payload types a service sends to the control plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundPayload {
    Pong,
    TaskStatus {
        service_id: ServiceId,
        task_id: String,
        execution_id: ExecutionId,
        idempotency_key: IdempotencyKey,
        status: String,
    },
    TaskResult {
        service_id: ServiceId,
        task_id: String,
        execution_id: ExecutionId,
        idempotency_key: IdempotencyKey,
        #[serde(default)]
        result: Option<Value>,
        /// Non-empty on failure (§6 "task_result.error is a non-empty
        /// string on failure").
        #[serde(default)]
        error: Option<String>,
    },
    CompensationResult {
        service_id: ServiceId,
        task_id: String,
        execution_id: ExecutionId,
        idempotency_key: IdempotencyKey,
        status: CompensationResultStatus,
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        partial: Option<PartialCompensation>,
    },
}

impl InboundPayload {
    pub fn is_pong(&self) -> bool {
        matches!(self, InboundPayload::Pong)
    }
}

/// The successful result shape a `task_result` carries once parsed: the
/// task's own output, plus an optional compensation payload the TaskWorker
/// stashes for later rollback (§4.7 step 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResultBody {
    pub task: Value,
    #[serde(default)]
    pub compensation: Option<CompensationPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompensationPayload {
    pub input: Value,
    pub ttl_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn inbound_task_result_requires_nonempty_error_on_failure() {
        let raw = json!({
            "type": "task_result",
            "service_id": "svc-abc",
            "task_id": "task1",
            "execution_id": "exe-abc",
            "idempotency_key": "deadbeef",
            "error": "boom",
        });
        let payload: InboundPayload = serde_json::from_value(raw).expect("parse");
        match payload {
            InboundPayload::TaskResult { error: Some(e), .. } => assert_eq!(e, "boom"),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn outbound_task_request_tag_is_snake_case() {
        let req = OutboundPayload::TaskRequest(TaskRequest {
            task_id: "task1".to_string(),
            execution_id: ExecutionId::new(),
            idempotency_key: IdempotencyKey("key".to_string()),
            input: json!({}),
        });
        let text = serde_json::to_string(&req).expect("serialize");
        assert!(text.contains("\"type\":\"task_request\""));
    }

    #[test]
    fn task_result_body_parses_with_compensation() {
        let raw = json!({
            "task": {"y": "Y"},
            "compensation": {"input": {"x": 1}, "ttl_ms": 60000},
        });
        let body: TaskResultBody = serde_json::from_value(raw).expect("parse");
        assert_eq!(body.task, json!({"y": "Y"}));
        assert_eq!(body.compensation.expect("compensation").ttl_ms, 60_000);
    }
}
