// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The ResultAggregator (§4.8): one per orchestration, watching every
//! non-`task0` task's output and finalising the orchestration completed once
//! all of them have produced one.

use crate::dependency::DependencyState;
use crate::log_manager::{LogReader, OrchestrationFinalizer};
use orra_core::{ExecutionPlan, OrchestrationId, OrchestrationStatus, TaskId};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct ResultAggregator<L, F> {
    orchestration_id: OrchestrationId,
    deps: BTreeSet<TaskId>,
    log: Arc<L>,
    finalizer: Arc<F>,
}

impl<L, F> ResultAggregator<L, F>
where
    L: LogReader,
    F: OrchestrationFinalizer,
{
    pub fn new(orchestration_id: OrchestrationId, plan: &ExecutionPlan, log: Arc<L>, finalizer: Arc<F>) -> Self {
        let deps = plan.non_task_zero().map(|t| t.id.clone()).collect();
        Self { orchestration_id, deps, log, finalizer }
    }

    pub async fn run(self, cancel: CancellationToken) {
        tokio::select! {
            _ = self.run_inner() => {}
            _ = cancel.cancelled() => {}
        }
    }

    async fn run_inner(self) {
        if self.deps.is_empty() {
            self.finalizer.finalize(self.orchestration_id, OrchestrationStatus::Completed, vec![], None, false).await;
            return;
        }

        let mut state = DependencyState::new();
        let mut offset = 0u64;
        loop {
            for entry in self.log.read_from(&self.orchestration_id, offset) {
                offset = offset.max(entry.offset + 1);
                state.observe(&entry, &self.deps);
            }
            if state.all_ready(&self.deps) {
                let results = self.deps.iter().filter_map(|d| state.output_of(d).cloned()).collect();
                self.finalizer.finalize(self.orchestration_id, OrchestrationStatus::Completed, results, None, false).await;
                return;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use orra_core::{LogEntry, LogEntryType};
    use orra_storage::LogStore;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct InMemoryLog(LogStore<orra_core::FakeClock>);

    impl LogReader for InMemoryLog {
        fn read_from(&self, orchestration_id: &OrchestrationId, from: u64) -> Vec<LogEntry> {
            self.0.get_or_create(*orchestration_id).read_from(from)
        }
    }

    struct RecordingFinalizer {
        calls: AtomicUsize,
        last_results: Mutex<Vec<Value>>,
        last_status: Mutex<Option<OrchestrationStatus>>,
    }

    impl RecordingFinalizer {
        fn new() -> Self {
            Self { calls: AtomicUsize::new(0), last_results: Mutex::new(vec![]), last_status: Mutex::new(None) }
        }
    }

    #[async_trait]
    impl OrchestrationFinalizer for RecordingFinalizer {
        async fn finalize(&self, _id: OrchestrationId, status: OrchestrationStatus, results: Vec<Value>, _error: Option<String>, _skip_webhook: bool) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_results.lock().unwrap() = results;
            *self.last_status.lock().unwrap() = Some(status);
        }
    }

    fn plan_with_tasks(ids: &[&str]) -> ExecutionPlan {
        let mut tasks = vec![orra_core::SubTask { id: TaskId::new("task0"), service: None, input: json!({}), service_name: None, capabilities: vec![], expected_input: None, expected_output: None }];
        for id in ids {
            tasks.push(orra_core::SubTask { id: TaskId::new(*id), service: None, input: json!({}), service_name: None, capabilities: vec![], expected_input: None, expected_output: None });
        }
        ExecutionPlan { tasks, parallel_groups: vec![] }
    }

    #[tokio::test]
    async fn finalizes_completed_once_every_task_output_seen() {
        let log = Arc::new(InMemoryLog(LogStore::new(orra_core::FakeClock::new())));
        let orchestration_id = OrchestrationId::new();
        let plan = plan_with_tasks(&["task1", "task2"]);
        let finalizer = Arc::new(RecordingFinalizer::new());
        let aggregator = ResultAggregator::new(orchestration_id, &plan, log.clone(), finalizer.clone());

        log.0.get_or_create(orchestration_id).append(LogEntry::new(LogEntryType::TaskOutput, "task1", json!({"a": 1}), "w", 0, 0), 0);
        log.0.get_or_create(orchestration_id).append(LogEntry::new(LogEntryType::TaskOutput, "task2", json!({"b": 2}), "w", 0, 0), 0);

        aggregator.run(CancellationToken::new()).await;
        assert_eq!(finalizer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*finalizer.last_status.lock().unwrap(), Some(OrchestrationStatus::Completed));
        assert_eq!(finalizer.last_results.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn waits_for_missing_task_output() {
        tokio::time::pause();
        let log = Arc::new(InMemoryLog(LogStore::new(orra_core::FakeClock::new())));
        let orchestration_id = OrchestrationId::new();
        let plan = plan_with_tasks(&["task1"]);
        let finalizer = Arc::new(RecordingFinalizer::new());
        let aggregator = ResultAggregator::new(orchestration_id, &plan, log.clone(), finalizer.clone());

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(aggregator.run(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(finalizer.calls.load(Ordering::SeqCst), 0);
        cancel.cancel();
        handle.await.unwrap();
    }
}
