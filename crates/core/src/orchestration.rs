// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestration identity and status lifecycle.

use crate::plan::ExecutionPlan;
use crate::project::ProjectId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

crate::define_id! {
    /// Unique identifier for a submitted orchestration.
    pub struct OrchestrationId("orc-");
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub action_type: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionParam {
    pub field: String,
    pub value: Value,
}

/// Orchestration status. Marshalled as lowercase-underscored names; decoding
/// accepts any casing/whitespace but rejects anything that doesn't match a
/// known variant (§9 "status marshalling").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestrationStatus {
    Registered,
    Pending,
    Processing,
    Paused,
    Completed,
    Failed,
    NotActionable,
}

impl OrchestrationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrchestrationStatus::Completed
                | OrchestrationStatus::Failed
                | OrchestrationStatus::NotActionable
        )
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "registered" => Some(Self::Registered),
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "paused" => Some(Self::Paused),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "not_actionable" => Some(Self::NotActionable),
            _ => None,
        }
    }
}

crate::simple_display! {
    OrchestrationStatus {
        Registered => "registered",
        Pending => "pending",
        Processing => "processing",
        Paused => "paused",
        Completed => "completed",
        Failed => "failed",
        NotActionable => "not_actionable",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Orchestration {
    pub id: OrchestrationId,
    pub project_id: ProjectId,
    pub action: Action,
    pub params: Vec<ActionParam>,
    pub plan: Option<ExecutionPlan>,
    pub status: OrchestrationStatus,
    pub timestamp_ms: u64,
    pub timeout: Duration,
    pub health_check_grace_period: Duration,
    pub webhook: String,
    pub results: Vec<Value>,
    pub error: Option<String>,
    /// Constant inputs derived from `params`, seeded as `task0`'s output.
    pub task_zero: Value,
}

impl Orchestration {
    pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DEFAULT_HEALTH_GRACE_PERIOD: Duration = Duration::from_secs(30 * 60);

    pub fn param_value(&self, field: &str) -> Option<&Value> {
        self.params.iter().find(|p| p.field == field).map(|p| &p.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parse_is_case_insensitive_and_trims() {
        assert_eq!(OrchestrationStatus::parse(" Not_Actionable "), Some(OrchestrationStatus::NotActionable));
        assert_eq!(OrchestrationStatus::parse("bogus"), None);
    }

    #[test]
    fn status_display_matches_wire_format() {
        assert_eq!(OrchestrationStatus::NotActionable.to_string(), "not_actionable");
        assert_eq!(OrchestrationStatus::Processing.to_string(), "processing");
    }

    #[test]
    fn terminal_statuses() {
        assert!(OrchestrationStatus::Completed.is_terminal());
        assert!(OrchestrationStatus::Failed.is_terminal());
        assert!(OrchestrationStatus::NotActionable.is_terminal());
        assert!(!OrchestrationStatus::Processing.is_terminal());
        assert!(!OrchestrationStatus::Paused.is_terminal());
    }
}
