// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Idempotency keys and the `Execution` state machine guarding at-most-one
//! service invocation per attempt surface.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;

/// Deterministic hash derived from `(orchestrationID, taskID, sorted(deps))`.
/// Same inputs always produce the same key (§8 property 2).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(pub String);

impl IdempotencyKey {
    /// `deps` is `(depTaskId, depValueAsCanonicalJson)` pairs; callers are
    /// responsible for sorting by dep task id before calling — this function
    /// does not re-sort so that the ordering contract is explicit at the
    /// call site (the task worker sorts by dep id; see `orra-engine`).
    pub fn derive(orchestration_id: &str, task_id: &str, sorted_deps: &[(String, Value)]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(orchestration_id.as_bytes());
        hasher.update(b"\0");
        hasher.update(task_id.as_bytes());
        for (dep_id, dep_value) in sorted_deps {
            hasher.update(b"\0");
            hasher.update(dep_id.as_bytes());
            hasher.update(b":");
            // serde_json's map serialization is insertion-ordered by
            // default; the planner always builds dep values as fresh
            // single-field maps so this is deterministic per-call.
            hasher.update(dep_value.to_string().as_bytes());
        }
        IdempotencyKey(format!("{:x}", hasher.finalize()))
    }

    /// Derived key for a compensation dispatch: `SHA256(orchestrationID ‖ taskID)`.
    pub fn derive_compensation(orchestration_id: &str, task_id: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(orchestration_id.as_bytes());
        hasher.update(b"\0compensation\0");
        hasher.update(task_id.as_bytes());
        IdempotencyKey(format!("{:x}", hasher.finalize()))
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

crate::define_id! {
    /// Identifier for a single attempt at executing an idempotency key.
    /// A fresh `ExecutionId` is minted every time a new attempt "takes over"
    /// a key (lease expiry, paused→in_progress promotion, failed→retry).
    pub struct ExecutionId("exe-");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    InProgress,
    Paused,
    Completed,
    Failed,
}

impl ExecutionState {
    /// Allowed transition graph (§3 invariants): `completed` is terminal.
    pub fn can_transition_to(self, next: ExecutionState) -> bool {
        use ExecutionState::*;
        matches!(
            (self, next),
            (InProgress, Completed)
                | (InProgress, Failed)
                | (InProgress, Paused)
                | (Paused, InProgress)
                | (Failed, InProgress)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub execution_id: ExecutionId,
    pub state: ExecutionState,
    pub result: Option<Value>,
    /// Per-attempt failures, indexed by consecutive-error count so the task
    /// retry loop can address a specific attempt's error by index.
    pub failures: Vec<String>,
    pub started_at_ms: u64,
    pub lease_expiry_ms: u64,
    pub timestamp_ms: u64,
}

impl Execution {
    pub fn new_in_progress(execution_id: ExecutionId, now_ms: u64, lease_duration: Duration) -> Self {
        Self {
            execution_id,
            state: ExecutionState::InProgress,
            result: None,
            failures: Vec::new(),
            started_at_ms: now_ms,
            lease_expiry_ms: now_ms + lease_duration.as_millis() as u64,
            timestamp_ms: now_ms,
        }
    }

    pub fn lease_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.lease_expiry_ms
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, ExecutionState::Completed | ExecutionState::Failed)
    }

    /// Transition this execution's state, validating against the allowed
    /// graph. Returns an error string (not `CoreError`, to keep this crate
    /// dependency-light for callers that just want a bool) on violation.
    pub fn transition(&mut self, next: ExecutionState, now_ms: u64) -> Result<(), String> {
        if !self.state.can_transition_to(next) {
            return Err(format!("illegal execution transition {:?} -> {:?}", self.state, next));
        }
        self.state = next;
        self.timestamp_ms = now_ms;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn idempotency_key_is_deterministic() {
        let deps = vec![("task0".to_string(), json!("A"))];
        let k1 = IdempotencyKey::derive("orc-1", "task1", &deps);
        let k2 = IdempotencyKey::derive("orc-1", "task1", &deps);
        assert_eq!(k1, k2);
    }

    #[test]
    fn idempotency_key_changes_with_deps() {
        let k1 = IdempotencyKey::derive("orc-1", "task1", &[("task0".to_string(), json!("A"))]);
        let k2 = IdempotencyKey::derive("orc-1", "task1", &[("task0".to_string(), json!("B"))]);
        assert_ne!(k1, k2);
    }

    #[test]
    fn execution_transition_graph() {
        let mut e = Execution::new_in_progress(ExecutionId::new(), 0, Duration::from_secs(30));
        assert!(e.transition(ExecutionState::Paused, 1).is_ok());
        assert!(e.transition(ExecutionState::InProgress, 2).is_ok());
        assert!(e.transition(ExecutionState::Completed, 3).is_ok());
        // completed is terminal
        assert!(e.transition(ExecutionState::InProgress, 4).is_err());
    }

    #[test]
    fn failed_can_be_reset_to_in_progress() {
        let mut e = Execution::new_in_progress(ExecutionId::new(), 0, Duration::from_secs(30));
        e.transition(ExecutionState::Failed, 1).unwrap();
        assert!(e.transition(ExecutionState::InProgress, 2).is_ok());
    }

    #[test]
    fn lease_expiry_detection() {
        let e = Execution::new_in_progress(ExecutionId::new(), 0, Duration::from_secs(30));
        assert!(!e.lease_expired(29_000));
        assert!(e.lease_expired(30_000));
    }
}
