// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The TaskWorker (§4.7): one per non-`task0` task. Polls the log for its
//! dependencies, dispatches through the transport under the idempotency and
//! lease store's protection, and records the outcome back into the log.

use crate::backoff::Backoff;
use crate::dependency::{resolve_task_input, DependencyState};
use crate::health::HealthGate;
use crate::log_manager::{LogAppender, LogReader};
use crate::transport::TaskDispatch;
use orra_core::{
    Clock, ExecutionId, ExecutionState, IdempotencyKey, LogEntry, LogEntryType, OrchestrationId,
    Service, SubTask,
};
use orra_storage::IdempotencyStore;
use orra_wire::{CompensationPayload, TaskRequest, TaskResultBody};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const MAX_TASK_RETRIES: u32 = 3;
const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct TaskWorkerConfig {
    pub orchestration_id: OrchestrationId,
    pub task: SubTask,
    pub dependencies: BTreeSet<orra_core::TaskId>,
    pub service: Service,
    pub timeout: Duration,
    pub health_grace: Duration,
}

/// Outcome of a single task worker run, for the aggregator/failure tracker
/// to observe via the log entries it appended.
#[derive(Debug, PartialEq)]
pub enum TaskOutcome {
    Completed,
    Failed,
    Cancelled,
}

/// Distinguishes a target-service health dip from every other attempt
/// failure, so the two can be handled with different retry policies.
enum AttemptError {
    Unhealthy,
    Failed(String),
}

pub struct TaskWorker<L, D, H, C: Clock> {
    config: TaskWorkerConfig,
    log: Arc<L>,
    idempotency: Arc<IdempotencyStore>,
    dispatch: Arc<D>,
    health: Arc<H>,
    clock: C,
}

impl<L, D, H, C> TaskWorker<L, D, H, C>
where
    L: LogReader + LogAppender,
    D: TaskDispatch,
    H: HealthGate,
    C: Clock,
{
    pub fn new(config: TaskWorkerConfig, log: Arc<L>, idempotency: Arc<IdempotencyStore>, dispatch: Arc<D>, health: Arc<H>, clock: C) -> Self {
        Self { config, log, idempotency, dispatch, health, clock }
    }

    pub async fn run(mut self, cancel: CancellationToken) -> TaskOutcome {
        self.health.register_task(self.config.service.id, self.config.orchestration_id, self.config.health_grace);
        let outcome = tokio::select! {
            outcome = self.run_inner() => outcome,
            _ = cancel.cancelled() => TaskOutcome::Cancelled,
        };
        self.health.deregister_task(self.config.service.id, &self.config.orchestration_id);
        outcome
    }

    async fn run_inner(&mut self) -> TaskOutcome {
        let Some((key, input)) = self.wait_for_dependencies().await else {
            return TaskOutcome::Cancelled;
        };

        let backoff = Backoff::new(Duration::from_secs(2), Duration::from_secs(30), 0.1);
        let mut consecutive_errs: u32 = 0;

        loop {
            match self.attempt(&key, &input).await {
                Ok(body) => {
                    self.record_success(&body);
                    return TaskOutcome::Completed;
                }
                // An unhealthy service never counts toward MAX_TASK_RETRIES:
                // the HealthCoordinator's own downtime timer (§4.11) is the
                // sole authority on when a service outage becomes a hard
                // failure, and it already cancels this worker via
                // `cancel_all` if the grace period lapses. Counting these
                // here would fail the task in a few seconds regardless of
                // how long the grace period actually is.
                Err(AttemptError::Unhealthy) => {
                    self.append_status("paused");
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                Err(AttemptError::Failed(reason)) => {
                    consecutive_errs += 1;
                    warn!(task = %self.config.task.id, attempt = consecutive_errs, %reason, "task attempt failed, retrying");
                    if consecutive_errs >= MAX_TASK_RETRIES {
                        self.record_failure(&reason);
                        return TaskOutcome::Failed;
                    }
                    let now_ms = self.clock.epoch_ms();
                    tokio::time::sleep(backoff.delay_for(consecutive_errs - 1, now_ms)).await;
                }
            }
        }
    }

    async fn wait_for_dependencies(&self) -> Option<(IdempotencyKey, serde_json::Value)> {
        let mut state = DependencyState::new();
        let mut offset = 0u64;
        loop {
            for entry in self.log.read_from(&self.config.orchestration_id, offset) {
                offset = offset.max(entry.offset + 1);
                state.observe(&entry, &self.config.dependencies);
            }
            if let Some(pairs) = state.sorted_dep_pairs(&self.config.dependencies) {
                let input = resolve_task_input(&self.config.task, &state)?;
                let key = IdempotencyKey::derive(&self.config.orchestration_id.to_string(), self.config.task.id.as_str(), &pairs);
                return Some((key, input));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn attempt(&self, key: &IdempotencyKey, input: &serde_json::Value) -> Result<TaskResultBody, AttemptError> {
        if !self.health.is_healthy(&self.config.service.id) {
            return Err(AttemptError::Unhealthy);
        }

        let now_ms = self.clock.epoch_ms();
        let execution = self.idempotency.initialize_or_get(key, now_ms);
        match execution.state {
            ExecutionState::Completed => {
                let result = execution.result.clone().unwrap_or(serde_json::Value::Null);
                return serde_json::from_value(result).map_err(|e| AttemptError::Failed(format!("stored result did not parse: {e}")));
            }
            ExecutionState::Failed => {
                self.idempotency.reset_failed(key, now_ms).map_err(|e| AttemptError::Failed(e.to_string()))?;
            }
            _ => {}
        }

        let request = TaskRequest {
            task_id: self.config.task.id.to_string(),
            execution_id: execution.execution_id,
            idempotency_key: key.clone(),
            input: input.clone(),
        };

        if self.dispatch.send_task(&self.config.service.id, &request).await.is_err() {
            self.idempotency.pause(key, now_ms).ok();
            return Err(AttemptError::Failed("failed to send task over transport".to_string()));
        }

        self.poll_for_result(key, execution.execution_id).await
    }

    async fn poll_for_result(&self, key: &IdempotencyKey, execution_id: ExecutionId) -> Result<TaskResultBody, AttemptError> {
        let deadline = self.clock.epoch_ms() + self.config.timeout.as_millis() as u64;
        let lease_renew_every = self.config.timeout / 2;
        let mut last_renew = self.clock.epoch_ms();

        loop {
            let now_ms = self.clock.epoch_ms();
            if now_ms >= deadline {
                self.idempotency.pause(key, now_ms).ok();
                return Err(AttemptError::Failed("timed out waiting for task result".to_string()));
            }
            if !self.health.is_healthy(&self.config.service.id) {
                self.idempotency.pause(key, now_ms).ok();
                return Err(AttemptError::Unhealthy);
            }
            if now_ms.saturating_sub(last_renew) >= lease_renew_every.as_millis() as u64 {
                self.idempotency.renew_lease(key, &execution_id, now_ms).ok();
                last_renew = now_ms;
            }

            if let Some((execution, result)) = self.idempotency.get_with_result(key) {
                match execution.state {
                    ExecutionState::Completed => {
                        let body = result.ok_or_else(|| AttemptError::Failed("completed execution missing result".to_string()))?;
                        return serde_json::from_value(body).map_err(|e| AttemptError::Failed(format!("result did not parse: {e}")));
                    }
                    ExecutionState::Failed => {
                        let reason = execution.failures.last().cloned().unwrap_or_else(|| "task failed".to_string());
                        return Err(AttemptError::Failed(reason));
                    }
                    ExecutionState::Paused => {
                        return Err(AttemptError::Failed("PAUSE_EXECUTION".to_string()));
                    }
                    ExecutionState::InProgress => {}
                }
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    fn record_success(&self, body: &TaskResultBody) {
        let now_ms = self.clock.epoch_ms();
        let entry = LogEntry::new(LogEntryType::TaskOutput, self.config.task.id.to_string(), body.task.clone(), self.config.task.id.to_string(), 0, now_ms);
        self.log.append(self.config.orchestration_id, entry, now_ms);

        if self.config.service.revertible {
            if let Some(CompensationPayload { input, ttl_ms }) = body.compensation.clone() {
                let entry = LogEntry::new(
                    LogEntryType::CompensationStored,
                    format!("compensation-{}", self.config.task.id),
                    json!({"input": input, "ttlMs": ttl_ms, "storedAt": now_ms}),
                    self.config.task.id.to_string(),
                    0,
                    now_ms,
                );
                self.log.append(self.config.orchestration_id, entry, now_ms);
            }
        }
        self.append_status("completed");
    }

    fn record_failure(&self, reason: &str) {
        let now_ms = self.clock.epoch_ms();
        let entry = LogEntry::new(
            LogEntryType::TaskFailure,
            format!("failure-{}", self.config.task.id),
            json!({"id": self.config.task.id.to_string(), "producer": self.config.task.id.to_string(), "orchestration": self.config.orchestration_id.to_string(), "error": reason}),
            self.config.task.id.to_string(),
            0,
            now_ms,
        );
        self.log.append(self.config.orchestration_id, entry, now_ms);
    }

    fn append_status(&self, status: &str) {
        let now_ms = self.clock.epoch_ms();
        let entry = LogEntry::new(
            LogEntryType::TaskStatus,
            format!("status-{}-{now_ms}", self.config.task.id),
            json!({"status": status}),
            self.config.task.id.to_string(),
            0,
            now_ms,
        );
        self.log.append(self.config.orchestration_id, entry, now_ms);
        info!(task = %self.config.task.id, status, "task status");
    }
}
