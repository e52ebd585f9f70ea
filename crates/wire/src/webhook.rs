// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The body delivered to an orchestration's registered webhook (§6).

use orra_core::OrchestrationStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const WEBHOOK_USER_AGENT: &str = "Orra/1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub orchestration_id: String,
    pub results: Vec<Value>,
    pub status: OrchestrationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn completed_payload_omits_error_field() {
        let payload = WebhookPayload {
            orchestration_id: "orc-1".to_string(),
            results: vec![json!({"y": "Y"})],
            status: OrchestrationStatus::Completed,
            error: None,
        };
        let value = serde_json::to_value(&payload).expect("serialize");
        assert!(value.get("error").is_none());
        assert_eq!(value["status"], "completed");
    }

    #[test]
    fn failed_payload_includes_error() {
        let payload = WebhookPayload {
            orchestration_id: "orc-1".to_string(),
            results: vec![],
            status: OrchestrationStatus::Failed,
            error: Some("task1 failed".to_string()),
        };
        let value = serde_json::to_value(&payload).expect("serialize");
        assert_eq!(value["error"], "task1 failed");
    }
}
