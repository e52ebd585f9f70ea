// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Log Manager (§4.12): owns the `orchestrationId -> Log` map and the
//! orchestration store facet workers use, and exposes the narrow
//! `LogReader`/`LogAppender`/`OrchestrationFinalizer` traits rather than the
//! whole Control Plane, so a worker can't reach into state it has no
//! business touching.

use crate::cancel::CancelRegistry;
use crate::webhook::{WebhookDispatcher, WebhookError};
use async_trait::async_trait;
use orra_core::{Clock, LogEntry, Orchestration, OrchestrationId, OrchestrationStatus};
use orra_storage::{Log, LogStore};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

pub trait LogReader: Send + Sync {
    fn read_from(&self, orchestration_id: &OrchestrationId, from: u64) -> Vec<LogEntry>;
}

pub trait LogAppender: Send + Sync {
    fn append(&self, orchestration_id: OrchestrationId, entry: LogEntry, now_ms: u64) -> u64;
}

#[async_trait]
pub trait OrchestrationFinalizer: Send + Sync {
    /// Transitions the orchestration's status, stops its workers, and
    /// (unless `skip_webhook`) delivers the final webhook exactly once.
    async fn finalize(
        &self,
        orchestration_id: OrchestrationId,
        status: OrchestrationStatus,
        results: Vec<Value>,
        error: Option<String>,
        skip_webhook: bool,
    );
}

#[derive(Clone)]
pub struct OrchestrationStore {
    inner: Arc<RwLock<HashMap<OrchestrationId, Orchestration>>>,
}

impl Default for OrchestrationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestrationStore {
    pub fn new() -> Self {
        Self { inner: Arc::new(RwLock::new(HashMap::new())) }
    }

    pub fn insert(&self, orchestration: Orchestration) {
        self.inner.write().insert(orchestration.id, orchestration);
    }

    pub fn get(&self, id: &OrchestrationId) -> Option<Orchestration> {
        self.inner.read().get(id).cloned()
    }

    pub fn update<F: FnOnce(&mut Orchestration)>(&self, id: &OrchestrationId, f: F) -> Option<Orchestration> {
        let mut inner = self.inner.write();
        let orchestration = inner.get_mut(id)?;
        f(orchestration);
        Some(orchestration.clone())
    }
}

pub struct LogManager<C: Clock, W: WebhookDispatcher> {
    logs: LogStore<C>,
    orchestrations: OrchestrationStore,
    cancel: CancelRegistry,
    webhooks: Arc<W>,
    clock: C,
}

impl<C: Clock, W: WebhookDispatcher> LogManager<C, W> {
    pub fn new(clock: C, cancel: CancelRegistry, webhooks: Arc<W>) -> Self {
        Self {
            logs: LogStore::new(clock.clone()),
            orchestrations: OrchestrationStore::new(),
            cancel,
            webhooks,
            clock,
        }
    }

    pub fn orchestrations(&self) -> &OrchestrationStore {
        &self.orchestrations
    }

    pub fn log_for(&self, orchestration_id: OrchestrationId) -> Log {
        self.logs.get_or_create(orchestration_id)
    }
}

impl<C: Clock, W: WebhookDispatcher> LogReader for LogManager<C, W> {
    fn read_from(&self, orchestration_id: &OrchestrationId, from: u64) -> Vec<LogEntry> {
        self.logs.get(orchestration_id).map(|log| log.read_from(from)).unwrap_or_default()
    }
}

impl<C: Clock, W: WebhookDispatcher> LogAppender for LogManager<C, W> {
    fn append(&self, orchestration_id: OrchestrationId, entry: LogEntry, now_ms: u64) -> u64 {
        self.logs.get_or_create(orchestration_id).append(entry, now_ms)
    }
}

#[async_trait]
impl<C: Clock + 'static, W: WebhookDispatcher + 'static> OrchestrationFinalizer for LogManager<C, W> {
    async fn finalize(
        &self,
        orchestration_id: OrchestrationId,
        status: OrchestrationStatus,
        results: Vec<Value>,
        error: Option<String>,
        skip_webhook: bool,
    ) {
        let now_ms = self.clock.epoch_ms();
        let Some(orchestration) = self.orchestrations.update(&orchestration_id, |o| {
            o.status = status;
            o.results = results.clone();
            o.error = error.clone();
            o.timestamp_ms = now_ms;
        }) else {
            warn!(%orchestration_id, "finalize called for unknown orchestration");
            return;
        };

        self.cancel.cancel_all(&orchestration_id);

        if skip_webhook {
            return;
        }

        // `cancel_all` above just cancelled the caller's own token too: both
        // ResultAggregator::run and FailureTracker::run race their
        // `run_inner()` (which is what called us) against `cancel.cancelled()`
        // in a `select!`. Awaiting the dispatch inline here would almost
        // always lose that race on the very next poll and get dropped
        // mid-flight. Detach it onto its own task instead so cancelling this
        // orchestration's workers can never abort its own final webhook.
        let webhooks = self.webhooks.clone();
        let logs = self.logs.clone();
        let clock = self.clock.clone();
        tokio::spawn(async move {
            let payload = orra_wire::WebhookPayload {
                orchestration_id: orchestration_id.to_string(),
                results,
                status,
                error,
            };
            if let Err(err) = webhooks.dispatch(&orchestration.webhook, &payload).await {
                warn!(%orchestration_id, error = %err, "webhook delivery failed, recording a skip-webhook failure entry");
                record_webhook_failure(&logs, &clock, orchestration_id, err);
            }
        });
    }
}

/// §4.9: if webhook delivery itself fails during a failed-orchestration
/// finalize, a secondary `task_failure` entry is appended with
/// `skipWebhook=true` so the FailureTracker doesn't loop retrying delivery
/// forever. This only records the entry; the caller (the FailureTracker) is
/// responsible for observing it and not re-dispatching.
fn record_webhook_failure<C: Clock>(logs: &LogStore<C>, clock: &C, orchestration_id: OrchestrationId, err: WebhookError) {
    let now_ms = clock.epoch_ms();
    let entry = LogEntry::new(
        orra_core::LogEntryType::TaskFailure,
        format!("webhook-failure-{orchestration_id}"),
        serde_json::json!({"skipWebhook": true, "error": err.to_string()}),
        "log-manager",
        0,
        now_ms,
    );
    logs.get_or_create(orchestration_id).append(entry, now_ms);
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait as at;
    use orra_core::{Action, FakeClock, ProjectId};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingDispatcher {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[at]
    impl WebhookDispatcher for RecordingDispatcher {
        async fn dispatch(&self, _url: &str, _payload: &orra_wire::WebhookPayload) -> Result<(), WebhookError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(WebhookError::BadStatus(500));
            }
            Ok(())
        }
    }

    fn orchestration(id: OrchestrationId) -> Orchestration {
        Orchestration {
            id,
            project_id: ProjectId::new(),
            action: Action { action_type: "user".to_string(), content: "refund order".to_string() },
            params: vec![],
            plan: None,
            status: OrchestrationStatus::Processing,
            timestamp_ms: 0,
            timeout: std::time::Duration::from_secs(30),
            health_check_grace_period: std::time::Duration::from_secs(1800),
            webhook: "https://example.com/hook".to_string(),
            results: vec![],
            error: None,
            task_zero: json!({}),
        }
    }

    #[tokio::test]
    async fn finalize_transitions_status_and_dispatches_webhook() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = Arc::new(RecordingDispatcher { calls: calls.clone(), fail: false });
        let manager = LogManager::new(FakeClock::new(), CancelRegistry::new(), dispatcher);
        let id = OrchestrationId::new();
        manager.orchestrations().insert(orchestration(id));

        manager.finalize(id, OrchestrationStatus::Completed, vec![json!({"y": "Y"})], None, false).await;

        let stored = manager.orchestrations().get(&id).expect("present");
        assert_eq!(stored.status, OrchestrationStatus::Completed);
        await_spawned_dispatch(&calls).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn finalize_with_skip_webhook_never_dispatches() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = Arc::new(RecordingDispatcher { calls: calls.clone(), fail: false });
        let manager = LogManager::new(FakeClock::new(), CancelRegistry::new(), dispatcher);
        let id = OrchestrationId::new();
        manager.orchestrations().insert(orchestration(id));

        manager.finalize(id, OrchestrationStatus::Failed, vec![], Some("boom".to_string()), true).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn finalize_cancels_all_registered_workers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = Arc::new(RecordingDispatcher { calls, fail: false });
        let cancel = CancelRegistry::new();
        let manager = LogManager::new(FakeClock::new(), cancel.clone(), dispatcher);
        let id = OrchestrationId::new();
        manager.orchestrations().insert(orchestration(id));
        let token = cancel.register(id, crate::cancel::WorkerId(1));

        manager.finalize(id, OrchestrationStatus::Completed, vec![], None, false).await;
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn failed_webhook_delivery_appends_skip_webhook_entry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = Arc::new(RecordingDispatcher { calls, fail: true });
        let manager = LogManager::new(FakeClock::new(), CancelRegistry::new(), dispatcher);
        let id = OrchestrationId::new();
        manager.orchestrations().insert(orchestration(id));

        manager.finalize(id, OrchestrationStatus::Failed, vec![], Some("boom".to_string()), false).await;
        let entries = await_logged_entry(&manager, &id).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].value["skipWebhook"], json!(true));
    }

    /// The webhook dispatch now runs on its own detached task (see
    /// `finalize`'s comment), so tests have to yield back to the runtime a
    /// few times to give that task a chance to run before asserting on it.
    async fn await_spawned_dispatch(calls: &Arc<AtomicUsize>) {
        for _ in 0..100 {
            if calls.load(Ordering::SeqCst) > 0 {
                return;
            }
            tokio::task::yield_now().await;
        }
    }

    async fn await_logged_entry(manager: &LogManager<FakeClock, RecordingDispatcher>, id: &OrchestrationId) -> Vec<LogEntry> {
        for _ in 0..100 {
            let entries = manager.read_from(id, 0);
            if !entries.is_empty() {
                return entries;
            }
            tokio::task::yield_now().await;
        }
        manager.read_from(id, 0)
    }
}
