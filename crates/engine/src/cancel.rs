// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `orchestrationId -> workerId -> CancellationToken` registry (§5.1), so
//! cancelling an orchestration's workers is O(workers) with no scan of
//! unrelated orchestrations.

use orra_core::OrchestrationId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(pub u64);

#[derive(Clone, Default)]
pub struct CancelRegistry {
    inner: Arc<RwLock<HashMap<OrchestrationId, HashMap<WorkerId, CancellationToken>>>>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fresh cancellation token for `worker_id` under
    /// `orchestration_id` and returns it.
    pub fn register(&self, orchestration_id: OrchestrationId, worker_id: WorkerId) -> CancellationToken {
        let token = CancellationToken::new();
        self.inner
            .write()
            .entry(orchestration_id)
            .or_default()
            .insert(worker_id, token.clone());
        token
    }

    /// Cancels and drops every worker registered for `orchestration_id`.
    pub fn cancel_all(&self, orchestration_id: &OrchestrationId) {
        if let Some(workers) = self.inner.write().remove(orchestration_id) {
            for token in workers.values() {
                token.cancel();
            }
        }
    }

    pub fn deregister(&self, orchestration_id: &OrchestrationId, worker_id: &WorkerId) {
        if let Some(workers) = self.inner.write().get_mut(orchestration_id) {
            workers.remove(worker_id);
        }
    }

    pub fn worker_count(&self, orchestration_id: &OrchestrationId) -> usize {
        self.inner.read().get(orchestration_id).map(|w| w.len()).unwrap_or(0)
    }
}
