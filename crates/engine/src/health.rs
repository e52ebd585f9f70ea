// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Health Coordinator (§4.11): tracks per-service websocket health and,
//! on a healthy->unhealthy transition, starts a `MaxServiceDowntime` timer
//! for every orchestration with a live task on that service, finalising
//! those orchestrations failed if the service doesn't recover in time.

use crate::log_manager::OrchestrationFinalizer;
use orra_core::{OrchestrationId, ServiceId};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Narrow view of the health coordinator a [`crate::task_worker::TaskWorker`]
/// needs, so it doesn't have to be generic over the finalizer type.
pub trait HealthGate: Send + Sync {
    fn is_healthy(&self, service_id: &ServiceId) -> bool;
    fn register_task(&self, service_id: ServiceId, orchestration_id: OrchestrationId, grace_period: Duration);
    fn deregister_task(&self, service_id: ServiceId, orchestration_id: &OrchestrationId);
}

impl<F: OrchestrationFinalizer + 'static> HealthGate for HealthCoordinator<F> {
    fn is_healthy(&self, service_id: &ServiceId) -> bool {
        HealthCoordinator::is_healthy(self, service_id)
    }

    fn register_task(&self, service_id: ServiceId, orchestration_id: OrchestrationId, grace_period: Duration) {
        HealthCoordinator::register_task(self, service_id, orchestration_id, grace_period)
    }

    fn deregister_task(&self, service_id: ServiceId, orchestration_id: &OrchestrationId) {
        HealthCoordinator::deregister_task(self, service_id, orchestration_id)
    }
}

#[derive(Default)]
struct ServiceTracking {
    healthy: bool,
    orchestrations: HashSet<OrchestrationId>,
}

pub struct HealthCoordinator<F: OrchestrationFinalizer + 'static> {
    services: RwLock<HashMap<ServiceId, ServiceTracking>>,
    grace_periods: RwLock<HashMap<OrchestrationId, Duration>>,
    downtime_timers: RwLock<HashMap<(ServiceId, OrchestrationId), CancellationToken>>,
    finalizer: Arc<F>,
}

impl<F: OrchestrationFinalizer + 'static> HealthCoordinator<F> {
    pub fn new(finalizer: Arc<F>) -> Self {
        Self {
            services: RwLock::new(HashMap::new()),
            grace_periods: RwLock::new(HashMap::new()),
            downtime_timers: RwLock::new(HashMap::new()),
            finalizer,
        }
    }

    /// Unknown services are treated as unhealthy: a task worker must not
    /// dispatch before the service has connected at least once.
    pub fn is_healthy(&self, service_id: &ServiceId) -> bool {
        self.services.read().get(service_id).map(|t| t.healthy).unwrap_or(false)
    }

    /// A task worker registers itself while it has a live dispatch on
    /// `service_id`, so the coordinator knows which orchestrations to pause
    /// on a health-down transition.
    pub fn register_task(&self, service_id: ServiceId, orchestration_id: OrchestrationId, grace_period: Duration) {
        self.services.write().entry(service_id).or_default().orchestrations.insert(orchestration_id);
        self.grace_periods.write().entry(orchestration_id).or_insert(grace_period);
    }

    pub fn deregister_task(&self, service_id: ServiceId, orchestration_id: &OrchestrationId) {
        if let Some(tracking) = self.services.write().get_mut(&service_id) {
            tracking.orchestrations.remove(orchestration_id);
        }
    }

    /// Drives a health transition. On healthy->unhealthy, starts a downtime
    /// timer per affected orchestration; on unhealthy->healthy, cancels any
    /// pending timers (§4.11).
    pub fn set_healthy(&self, service_id: ServiceId, healthy: bool) {
        let (was_healthy, affected): (bool, Vec<OrchestrationId>) = {
            let mut services = self.services.write();
            let tracking = services.entry(service_id).or_default();
            let was_healthy = tracking.healthy;
            tracking.healthy = healthy;
            (was_healthy, tracking.orchestrations.iter().copied().collect())
        };

        if was_healthy == healthy {
            return;
        }

        if healthy {
            let mut timers = self.downtime_timers.write();
            for orchestration_id in &affected {
                if let Some(token) = timers.remove(&(service_id, *orchestration_id)) {
                    token.cancel();
                }
            }
            info!(%service_id, "service recovered, cancelled downtime timers");
            return;
        }

        info!(%service_id, count = affected.len(), "service went unhealthy, starting downtime timers");
        for orchestration_id in affected {
            let grace = self.grace_periods.read().get(&orchestration_id).copied().unwrap_or(orra_core::Orchestration::DEFAULT_HEALTH_GRACE_PERIOD);
            let token = CancellationToken::new();
            self.downtime_timers.write().insert((service_id, orchestration_id), token.clone());
            let finalizer = self.finalizer.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(grace) => {
                        finalizer
                            .finalize(
                                orchestration_id,
                                orra_core::OrchestrationStatus::Failed,
                                vec![],
                                Some(format!("service {service_id} did not recover within grace period")),
                                false,
                            )
                            .await;
                    }
                    _ = token.cancelled() => {}
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use orra_core::OrchestrationStatus;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFinalizer(Arc<AtomicUsize>);

    #[async_trait]
    impl OrchestrationFinalizer for CountingFinalizer {
        async fn finalize(&self, _id: OrchestrationId, _status: OrchestrationStatus, _results: Vec<Value>, _error: Option<String>, _skip_webhook: bool) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn unknown_service_is_unhealthy_by_default() {
        let coordinator = HealthCoordinator::new(Arc::new(CountingFinalizer(Arc::new(AtomicUsize::new(0)))));
        assert!(!coordinator.is_healthy(&orra_core::ServiceId::new()));
    }

    #[test]
    fn set_healthy_true_marks_service_healthy() {
        let coordinator = HealthCoordinator::new(Arc::new(CountingFinalizer(Arc::new(AtomicUsize::new(0)))));
        let service_id = orra_core::ServiceId::new();
        coordinator.set_healthy(service_id, true);
        assert!(coordinator.is_healthy(&service_id));
    }

    #[tokio::test]
    async fn recovering_before_grace_period_cancels_the_timer() {
        let calls = Arc::new(AtomicUsize::new(0));
        let coordinator = HealthCoordinator::new(Arc::new(CountingFinalizer(calls.clone())));
        let service_id = orra_core::ServiceId::new();
        let orchestration_id = OrchestrationId::new();
        coordinator.set_healthy(service_id, true);
        coordinator.register_task(service_id, orchestration_id, Duration::from_millis(50));

        coordinator.set_healthy(service_id, false);
        coordinator.set_healthy(service_id, true);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn sustained_downtime_finalizes_affected_orchestrations() {
        let calls = Arc::new(AtomicUsize::new(0));
        let coordinator = HealthCoordinator::new(Arc::new(CountingFinalizer(calls.clone())));
        let service_id = orra_core::ServiceId::new();
        let orchestration_id = OrchestrationId::new();
        coordinator.set_healthy(service_id, true);
        coordinator.register_task(service_id, orchestration_id, Duration::from_millis(20));

        coordinator.set_healthy(service_id, false);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
