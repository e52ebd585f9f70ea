// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The CompensationWorker (§4.10): walks a reverse-completion-order list of
//! compensation candidates, dispatching a `compensation_request` for each
//! revertible, not-yet-expired task and recording the outcome in the log.

use crate::log_manager::LogAppender;
use crate::transport::TaskDispatch;
use orra_core::{
    Clock, ExecutionState, IdempotencyKey, LogEntry, LogEntryType, OrchestrationId, Service,
    ServiceId, TaskId,
};
use orra_storage::IdempotencyStore;
use orra_wire::TaskRequest;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const MAX_ATTEMPTS: u32 = 10;
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Resolves the per-service idempotency store a compensation candidate's
/// dispatch should use (§4.2 "one per service") — a candidate list can span
/// several revertible services, each with its own store.
pub trait IdempotencyProvider: Send + Sync {
    fn store_for(&self, service_id: &ServiceId) -> Arc<IdempotencyStore>;
}

pub struct CompensationCandidate {
    pub task_id: TaskId,
    pub service: Service,
    pub input: Value,
    pub ttl_ms: u64,
    pub stored_at_ms: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum CompensationStatus {
    Completed,
    Partial,
    Failed,
}

#[derive(Deserialize)]
struct CompensationResult {
    status: CompensationStatus,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    partial: Option<PartialCompensation>,
}

#[derive(Deserialize)]
struct PartialCompensation {
    completed: Vec<String>,
    remaining: Vec<String>,
}

pub struct CompensationWorker<L, D, C: Clock> {
    orchestration_id: OrchestrationId,
    candidates: Vec<CompensationCandidate>,
    log: Arc<L>,
    idempotency: Arc<dyn IdempotencyProvider>,
    dispatch: Arc<D>,
    clock: C,
}

impl<L, D, C> CompensationWorker<L, D, C>
where
    L: LogAppender,
    D: TaskDispatch,
    C: Clock,
{
    pub fn new(orchestration_id: OrchestrationId, candidates: Vec<CompensationCandidate>, log: Arc<L>, idempotency: Arc<dyn IdempotencyProvider>, dispatch: Arc<D>, clock: C) -> Self {
        Self { orchestration_id, candidates, log, idempotency, dispatch, clock }
    }

    pub async fn run(self, cancel: CancellationToken) {
        tokio::select! {
            _ = self.run_inner() => {}
            _ = cancel.cancelled() => {}
        }
    }

    async fn run_inner(self) {
        for candidate in &self.candidates {
            self.process_one(candidate).await;
        }
    }

    async fn process_one(&self, candidate: &CompensationCandidate) {
        let now_ms = self.clock.epoch_ms();
        if now_ms.saturating_sub(candidate.stored_at_ms) > candidate.ttl_ms {
            self.append(candidate, LogEntryType::CompensationExpired, json!({"taskId": candidate.task_id.as_str()}), 0);
            return;
        }

        let key = IdempotencyKey::derive_compensation(&self.orchestration_id.to_string(), candidate.task_id.as_str());
        let store = self.idempotency.store_for(&candidate.service.id);
        let mut delay = Duration::from_secs(2);

        for attempt in 1..=MAX_ATTEMPTS {
            let now_ms = self.clock.epoch_ms();
            let execution = store.initialize_or_get(&key, now_ms);
            if execution.state == ExecutionState::Failed {
                store.reset_failed(&key, now_ms).ok();
            }

            let request = TaskRequest {
                task_id: candidate.task_id.to_string(),
                execution_id: execution.execution_id,
                idempotency_key: key.clone(),
                input: candidate.input.clone(),
            };

            self.append(candidate, LogEntryType::CompensationAttempted, json!({"taskId": candidate.task_id.as_str(), "attempt": attempt}), attempt);

            if self.dispatch.send_compensation(&candidate.service.id, &request).await.is_err() {
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(Duration::from_secs(60));
                continue;
            }

            match self.await_result(&store, &key, now_ms).await {
                Some(result) => {
                    self.record_result(candidate, &result);
                    return;
                }
                None => {
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_secs(60));
                }
            }
        }

        self.append(candidate, LogEntryType::CompensationFailure, json!({"taskId": candidate.task_id.as_str(), "error": "compensation exhausted retries"}), MAX_ATTEMPTS);
    }

    async fn await_result(&self, store: &IdempotencyStore, key: &IdempotencyKey, started_ms: u64) -> Option<CompensationResult> {
        loop {
            let now_ms = self.clock.epoch_ms();
            if now_ms.saturating_sub(started_ms) >= ATTEMPT_TIMEOUT.as_millis() as u64 {
                return None;
            }
            if let Some((execution, result)) = store.get_with_result(key) {
                match execution.state {
                    ExecutionState::Completed => {
                        let value = result?;
                        return serde_json::from_value(value).ok();
                    }
                    ExecutionState::Failed => return None,
                    _ => {}
                }
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    fn record_result(&self, candidate: &CompensationCandidate, result: &CompensationResult) {
        match &result.status {
            CompensationStatus::Completed => {
                self.append(candidate, LogEntryType::CompensationComplete, json!({"taskId": candidate.task_id.as_str()}), 0);
            }
            CompensationStatus::Partial => {
                let partial = result.partial.as_ref();
                self.append(
                    candidate,
                    LogEntryType::CompensationPartial,
                    json!({
                        "taskId": candidate.task_id.as_str(),
                        "completed": partial.map(|p| p.completed.clone()).unwrap_or_default(),
                        "remaining": partial.map(|p| p.remaining.clone()).unwrap_or_default(),
                    }),
                    0,
                );
            }
            CompensationStatus::Failed => {
                self.append(
                    candidate,
                    LogEntryType::CompensationFailure,
                    json!({"taskId": candidate.task_id.as_str(), "error": result.error.clone().unwrap_or_default()}),
                    0,
                );
            }
        }
    }

    fn append(&self, candidate: &CompensationCandidate, entry_type: LogEntryType, value: Value, attempt_num: u32) {
        let now_ms = self.clock.epoch_ms();
        let entry = LogEntry {
            offset: 0,
            entry_type,
            id: format!("{entry_type}-{}-{attempt_num}", candidate.task_id),
            value,
            producer_id: candidate.task_id.to_string(),
            attempt_num,
            timestamp_ms: now_ms,
        };
        self.log.append(self.orchestration_id, entry, now_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use orra_core::{FakeClock, ProjectId, ServiceId, ServiceSchema, ServiceType};
    use orra_storage::LogStore;

    struct InMemoryLog(LogStore<FakeClock>);

    impl LogAppender for InMemoryLog {
        fn append(&self, orchestration_id: OrchestrationId, entry: LogEntry, now_ms: u64) -> u64 {
            self.0.get_or_create(orchestration_id).append(entry, now_ms)
        }
    }

    fn service() -> Service {
        Service {
            id: ServiceId::new(),
            project_id: ProjectId::new(),
            name: "refund-service".to_string(),
            description: "test".to_string(),
            service_type: ServiceType::Service,
            schema: ServiceSchema { input: json!({"type": "object", "properties": {"x": {"type": "string"}}}), output: json!({"type": "object", "properties": {"y": {"type": "string"}}}) },
            revertible: true,
            version: 1,
        }
    }

    struct SingleStoreProvider(Arc<IdempotencyStore>);

    impl IdempotencyProvider for SingleStoreProvider {
        fn store_for(&self, _service_id: &ServiceId) -> Arc<IdempotencyStore> {
            self.0.clone()
        }
    }

    struct CompletingDispatch {
        idempotency: Arc<IdempotencyStore>,
    }

    #[async_trait]
    impl TaskDispatch for CompletingDispatch {
        async fn send_task(&self, _service_id: &ServiceId, _request: &TaskRequest) -> Result<(), crate::transport::DispatchError> {
            Ok(())
        }
        async fn send_compensation(&self, _service_id: &ServiceId, request: &TaskRequest) -> Result<(), crate::transport::DispatchError> {
            self.idempotency.update_result(&request.idempotency_key, ExecutionState::Completed, Some(json!({"status": "completed"})), None, 0).ok();
            Ok(())
        }
    }

    #[tokio::test]
    async fn expired_candidate_is_skipped_without_dispatch() {
        let log = Arc::new(InMemoryLog(LogStore::new(FakeClock::new())));
        let orchestration_id = OrchestrationId::new();
        let idempotency = Arc::new(IdempotencyStore::new(Duration::from_secs(30), Duration::from_secs(3600)));
        let clock = FakeClock::new();
        let candidate = CompensationCandidate { task_id: TaskId::new("task1"), service: service(), input: json!({}), ttl_ms: 1000, stored_at_ms: 0 };
        clock.set_epoch_ms(10_000);
        let dispatch = Arc::new(CompletingDispatch { idempotency: idempotency.clone() });
        let provider: Arc<dyn IdempotencyProvider> = Arc::new(SingleStoreProvider(idempotency));

        let worker = CompensationWorker::new(orchestration_id, vec![candidate], log.clone(), provider, dispatch, clock);
        worker.run(CancellationToken::new()).await;

        let entries = log.0.get_or_create(orchestration_id).read_from(0);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].entry_type, LogEntryType::CompensationExpired);
    }

    #[tokio::test]
    async fn successful_compensation_appends_complete() {
        let log = Arc::new(InMemoryLog(LogStore::new(FakeClock::new())));
        let orchestration_id = OrchestrationId::new();
        let idempotency = Arc::new(IdempotencyStore::new(Duration::from_secs(30), Duration::from_secs(3600)));
        let clock = FakeClock::new();
        clock.set_epoch_ms(1_000);
        let candidate = CompensationCandidate { task_id: TaskId::new("task1"), service: service(), input: json!({}), ttl_ms: 60_000, stored_at_ms: 1_000 };
        let dispatch = Arc::new(CompletingDispatch { idempotency: idempotency.clone() });
        let provider: Arc<dyn IdempotencyProvider> = Arc::new(SingleStoreProvider(idempotency));

        let worker = CompensationWorker::new(orchestration_id, vec![candidate], log.clone(), provider, dispatch, clock);
        worker.run(CancellationToken::new()).await;

        let entries = log.0.get_or_create(orchestration_id).read_from(0);
        assert!(entries.iter().any(|e| e.entry_type == LogEntryType::CompensationAttempted));
        assert!(entries.iter().any(|e| e.entry_type == LogEntryType::CompensationComplete));
    }
}
