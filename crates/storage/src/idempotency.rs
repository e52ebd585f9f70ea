// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Idempotency & Lease Store (§3, §4.2). One instance per service;
//! guards at-most-one concurrent attempt per idempotency key.

use orra_core::{Execution, ExecutionId, ExecutionState, IdempotencyKey};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdempotencyError {
    #[error("execution for key {0} not found")]
    NotFound(String),
    #[error("illegal execution transition: {0}")]
    IllegalTransition(String),
    #[error("lease for key {0} not yet expired, held until {1}ms")]
    LeaseHeld(String, u64),
}

#[derive(Clone)]
struct Entry {
    execution: Execution,
    last_touched_ms: u64,
}

/// Per-service idempotency store: `IdempotencyKey -> Execution`.
#[derive(Clone)]
pub struct IdempotencyStore {
    entries: Arc<RwLock<HashMap<IdempotencyKey, Entry>>>,
    lease_duration: Duration,
    ttl: Duration,
}

impl IdempotencyStore {
    pub fn new(lease_duration: Duration, ttl: Duration) -> Self {
        Self { entries: Arc::new(RwLock::new(HashMap::new())), lease_duration, ttl }
    }

    /// Returns the existing execution if one is in progress with an
    /// unexpired lease, a terminal execution (caller treats this as "already
    /// done"), or a paused one. Otherwise mints a fresh `InProgress`
    /// execution with a new `ExecutionId` and a new lease (covers both the
    /// first attempt and the expired-lease-takeover case).
    pub fn initialize_or_get(&self, key: &IdempotencyKey, now_ms: u64) -> Execution {
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get_mut(key) {
            entry.last_touched_ms = now_ms;
            if entry.execution.state == ExecutionState::InProgress && !entry.execution.lease_expired(now_ms) {
                return entry.execution.clone();
            }
            if entry.execution.is_terminal() {
                return entry.execution.clone();
            }
            if entry.execution.state == ExecutionState::Paused {
                return entry.execution.clone();
            }
            // Lease expired while in progress: a fresh attempt takes over.
            entry.execution = Execution::new_in_progress(ExecutionId::new(), now_ms, self.lease_duration);
            return entry.execution.clone();
        }
        let execution = Execution::new_in_progress(ExecutionId::new(), now_ms, self.lease_duration);
        entries.insert(key.clone(), Entry { execution: execution.clone(), last_touched_ms: now_ms });
        execution
    }

    pub fn get(&self, key: &IdempotencyKey) -> Option<Execution> {
        self.entries.read().get(key).map(|e| e.execution.clone())
    }

    pub fn renew_lease(&self, key: &IdempotencyKey, execution_id: &ExecutionId, now_ms: u64) -> Result<(), IdempotencyError> {
        let mut entries = self.entries.write();
        let entry = entries.get_mut(key).ok_or_else(|| IdempotencyError::NotFound(key.0.clone()))?;
        if &entry.execution.execution_id != execution_id {
            return Err(IdempotencyError::NotFound(key.0.clone()));
        }
        entry.execution.lease_expiry_ms = now_ms + self.lease_duration.as_millis() as u64;
        entry.last_touched_ms = now_ms;
        Ok(())
    }

    pub fn pause(&self, key: &IdempotencyKey, now_ms: u64) -> Result<(), IdempotencyError> {
        self.transition(key, ExecutionState::Paused, now_ms)
    }

    pub fn resume(&self, key: &IdempotencyKey, now_ms: u64) -> Result<(), IdempotencyError> {
        self.transition(key, ExecutionState::InProgress, now_ms)
    }

    /// Resets a `Failed` execution back to `InProgress` with a fresh lease,
    /// for a retry attempt (§4.7 retry loop).
    pub fn reset_failed(&self, key: &IdempotencyKey, now_ms: u64) -> Result<Execution, IdempotencyError> {
        let mut entries = self.entries.write();
        let entry = entries.get_mut(key).ok_or_else(|| IdempotencyError::NotFound(key.0.clone()))?;
        entry
            .execution
            .transition(ExecutionState::InProgress, now_ms)
            .map_err(IdempotencyError::IllegalTransition)?;
        entry.execution.lease_expiry_ms = now_ms + self.lease_duration.as_millis() as u64;
        entry.last_touched_ms = now_ms;
        Ok(entry.execution.clone())
    }

    pub fn update_result(
        &self,
        key: &IdempotencyKey,
        state: ExecutionState,
        result: Option<Value>,
        failure: Option<String>,
        now_ms: u64,
    ) -> Result<Execution, IdempotencyError> {
        let mut entries = self.entries.write();
        let entry = entries.get_mut(key).ok_or_else(|| IdempotencyError::NotFound(key.0.clone()))?;
        entry.execution.transition(state, now_ms).map_err(IdempotencyError::IllegalTransition)?;
        if let Some(result) = result {
            entry.execution.result = Some(result);
        }
        if let Some(failure) = failure {
            entry.execution.failures.push(failure);
        }
        entry.last_touched_ms = now_ms;
        Ok(entry.execution.clone())
    }

    pub fn get_with_result(&self, key: &IdempotencyKey) -> Option<(Execution, Option<Value>)> {
        self.entries.read().get(key).map(|e| (e.execution.clone(), e.execution.result.clone()))
    }

    fn transition(&self, key: &IdempotencyKey, next: ExecutionState, now_ms: u64) -> Result<(), IdempotencyError> {
        let mut entries = self.entries.write();
        let entry = entries.get_mut(key).ok_or_else(|| IdempotencyError::NotFound(key.0.clone()))?;
        entry.execution.transition(next, now_ms).map_err(IdempotencyError::IllegalTransition)?;
        entry.last_touched_ms = now_ms;
        Ok(())
    }

    /// Evicts entries untouched for longer than the configured TTL. Returns
    /// the number of entries removed.
    pub fn cleanup_expired(&self, now_ms: u64) -> usize {
        let ttl_ms = self.ttl.as_millis() as u64;
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| now_ms.saturating_sub(entry.last_touched_ms) < ttl_ms);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
