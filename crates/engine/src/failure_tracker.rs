// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The FailureTracker (§4.9): one per orchestration, watching for
//! `task_failure` entries and finalising the orchestration failed on the
//! first one seen.

use crate::log_manager::{LogReader, OrchestrationFinalizer};
use orra_core::{LogEntryType, OrchestrationId, OrchestrationStatus};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct FailureTracker<L, F> {
    orchestration_id: OrchestrationId,
    log: Arc<L>,
    finalizer: Arc<F>,
}

impl<L, F> FailureTracker<L, F>
where
    L: LogReader,
    F: OrchestrationFinalizer,
{
    pub fn new(orchestration_id: OrchestrationId, log: Arc<L>, finalizer: Arc<F>) -> Self {
        Self { orchestration_id, log, finalizer }
    }

    pub async fn run(self, cancel: CancellationToken) {
        tokio::select! {
            _ = self.run_inner() => {}
            _ = cancel.cancelled() => {}
        }
    }

    async fn run_inner(self) {
        let mut offset = 0u64;
        loop {
            for entry in self.log.read_from(&self.orchestration_id, offset) {
                offset = offset.max(entry.offset + 1);
                if entry.entry_type != LogEntryType::TaskFailure {
                    continue;
                }
                // The secondary failure entry LogManager appends when
                // webhook delivery itself fails carries `skipWebhook: true`
                // — it must not re-trigger another finalize/dispatch cycle.
                if entry.value.get("skipWebhook").and_then(Value::as_bool).unwrap_or(false) {
                    continue;
                }
                let reason = entry.value.get("error").and_then(Value::as_str).unwrap_or("task failed").to_string();
                self.finalizer.finalize(self.orchestration_id, OrchestrationStatus::Failed, vec![], Some(reason), false).await;
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
    use orra_core::LogEntry;
    use orra_storage::LogStore;
    use serde_json::json;
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
        last_error: Mutex<Option<String>>,
    }

    impl RecordingFinalizer {
        fn new() -> Self {
            Self { calls: AtomicUsize::new(0), last_error: Mutex::new(None) }
        }
    }

    #[async_trait]
    impl OrchestrationFinalizer for RecordingFinalizer {
        async fn finalize(&self, _id: OrchestrationId, status: OrchestrationStatus, _results: Vec<Value>, error: Option<String>, _skip_webhook: bool) {
            assert_eq!(status, OrchestrationStatus::Failed);
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_error.lock().unwrap() = error;
        }
    }

    #[tokio::test]
    async fn first_task_failure_finalizes_failed() {
        let log = Arc::new(InMemoryLog(LogStore::new(orra_core::FakeClock::new())));
        let orchestration_id = OrchestrationId::new();
        let finalizer = Arc::new(RecordingFinalizer::new());
        log.0.get_or_create(orchestration_id).append(LogEntry::new(LogEntryType::TaskFailure, "f1", json!({"error": "boom"}), "task1", 0, 0), 0);

        let tracker = FailureTracker::new(orchestration_id, log, finalizer.clone());
        tracker.run(CancellationToken::new()).await;
        assert_eq!(finalizer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(finalizer.last_error.lock().unwrap().as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn skip_webhook_failure_entries_are_ignored() {
        tokio::time::pause();
        let log = Arc::new(InMemoryLog(LogStore::new(orra_core::FakeClock::new())));
        let orchestration_id = OrchestrationId::new();
        let finalizer = Arc::new(RecordingFinalizer::new());
        log.0.get_or_create(orchestration_id).append(
            LogEntry::new(LogEntryType::TaskFailure, "f1", json!({"error": "webhook gone", "skipWebhook": true}), "log-manager", 0, 0),
            0,
        );

        let tracker = FailureTracker::new(orchestration_id, log, finalizer.clone());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(tracker.run(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(finalizer.calls.load(Ordering::SeqCst), 0);
        cancel.cancel();
        handle.await.unwrap();
    }
}
