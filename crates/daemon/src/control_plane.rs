// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The composition root: owns every collaborator the HTTP/WS layer and the
//! engine workers need, and wires submitted orchestrations through planning,
//! task execution, aggregation, and compensation.

use crate::adapters;
use crate::sessions::SessionRegistry;
use orra_core::{
    Action, ActionParam, Clock, Config, CoreError, ExecutionPlan, GroundingSpec, LogEntry,
    LogEntryType, Orchestration, OrchestrationId, OrchestrationStatus, Project, ProjectId,
    Service, ServiceId, ServiceSchema, ServiceType, SystemClock, TaskId, TASK_ZERO_ID,
};
use orra_engine::{
    CancelRegistry, CompensationCandidate, CompensationWorker, DispatchError, EngineError,
    HealthCoordinator, IdempotencyProvider, LogAppender, LogManager, OrchestrationFinalizer,
    PlannerDeps, ReqwestWebhookDispatcher, TaskDispatch, TaskWorker, TaskWorkerConfig, WorkerId,
};
use orra_storage::{IdempotencyStore, PlanCache, ProjectRegistry, RegisterOutcome, ServiceRegistry};
use orra_wire::{OutboundPayload, TaskRequest};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

type Finalizer = LogManager<SystemClock, ReqwestWebhookDispatcher>;

struct Inner {
    config: Config,
    clock: SystemClock,
    cancel: CancelRegistry,
    projects: ProjectRegistry,
    services: ServiceRegistry,
    idempotency_stores: RwLock<HashMap<ServiceId, Arc<IdempotencyStore>>>,
    plan_cache: Arc<PlanCache>,
    log_manager: Arc<Finalizer>,
    health: Arc<HealthCoordinator<Finalizer>>,
    groundings: RwLock<HashMap<ProjectId, HashMap<String, GroundingSpec>>>,
    orchestration_index: RwLock<HashMap<ProjectId, Vec<OrchestrationId>>>,
    sessions: SessionRegistry,
    reasoner: Arc<dyn orra_engine::Reasoner>,
    embedder: Arc<dyn orra_engine::Embedder>,
    pddl: Arc<dyn orra_engine::PddlValidator>,
}

#[derive(Clone)]
pub struct ControlPlane(Arc<Inner>);

impl ControlPlane {
    pub fn new(config: Config) -> Self {
        let clock = SystemClock::default();
        let cancel = CancelRegistry::new();
        let webhooks = Arc::new(ReqwestWebhookDispatcher::new(config.webhook_timeout));
        let log_manager = Arc::new(LogManager::new(clock.clone(), cancel.clone(), webhooks));
        let health = Arc::new(HealthCoordinator::new(log_manager.clone()));
        let plan_cache = Arc::new(PlanCache::new(
            config.plan_cache_capacity,
            config.plan_cache_ttl,
            config.plan_cache_threshold,
            config.plan_cache_early_exit,
        ));
        let (reasoner, embedder, pddl) = adapters::build(&config);

        Self(Arc::new(Inner {
            config,
            clock,
            cancel,
            projects: ProjectRegistry::new(),
            services: ServiceRegistry::new(),
            idempotency_stores: RwLock::new(HashMap::new()),
            plan_cache,
            log_manager,
            health,
            groundings: RwLock::new(HashMap::new()),
            orchestration_index: RwLock::new(HashMap::new()),
            sessions: SessionRegistry::new(),
            reasoner,
            embedder,
            pddl,
        }))
    }

    pub fn config(&self) -> &Config {
        &self.0.config
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.0.sessions
    }

    pub fn clock_epoch_ms(&self) -> u64 {
        self.0.clock.epoch_ms()
    }

    pub fn set_service_healthy(&self, service_id: ServiceId, healthy: bool) {
        self.0.health.set_healthy(service_id, healthy);
    }

    /// Per-service idempotency store, lazily created on first use. Exposed
    /// so the WebSocket inbound handler can record a `task_result` /
    /// `compensation_result` frame the same way the engine workers do.
    pub fn idempotency_store(&self, service_id: &ServiceId) -> Arc<IdempotencyStore> {
        self.idempotency_store_for(service_id)
    }

    fn idempotency_store_for(&self, service_id: &ServiceId) -> Arc<IdempotencyStore> {
        if let Some(store) = self.0.idempotency_stores.read().get(service_id) {
            return store.clone();
        }
        self.0
            .idempotency_stores
            .write()
            .entry(*service_id)
            .or_insert_with(|| {
                Arc::new(IdempotencyStore::new(self.0.config.lease_duration, self.0.config.idempotency_ttl))
            })
            .clone()
    }

    // -- projects --------------------------------------------------------

    pub fn register_project(&self) -> Project {
        let project = Project::new(format!("key_{}", nanoid::nanoid!(32)));
        self.0.projects.insert(project.clone());
        project
    }

    pub fn project_for_key(&self, api_key: &str) -> Option<Project> {
        self.0.projects.project_for_key(api_key)
    }

    pub fn get_project(&self, project_id: ProjectId) -> Option<Project> {
        self.0.projects.get(project_id)
    }

    pub fn add_api_key(&self, project_id: ProjectId, label: Option<String>) -> Result<orra_core::ApiKey, CoreError> {
        let now_ms = self.0.clock.epoch_ms();
        let api_key = orra_core::ApiKey { key: format!("key_{}", nanoid::nanoid!(32)), project_id, label, created_at_ms: now_ms };
        self.0
            .projects
            .update(project_id, |p| p.additional_api_keys.push(api_key.clone()))
            .ok_or_else(|| CoreError::NotExist("project", project_id.to_string()))?;
        Ok(api_key)
    }

    pub fn add_webhook(&self, project_id: ProjectId, url: String) -> Result<(), CoreError> {
        self.0
            .projects
            .update(project_id, |p| p.add_webhook(url))
            .map(|_| ())
            .ok_or_else(|| CoreError::NotExist("project", project_id.to_string()))
    }

    // -- services ---------------------------------------------------------

    pub fn register_service(
        &self,
        project_id: ProjectId,
        name: String,
        description: String,
        service_type: ServiceType,
        schema: ServiceSchema,
        revertible: bool,
    ) -> Result<(ServiceId, RegisterOutcome), CoreError> {
        let service = Service { id: ServiceId::new(), project_id, name, description, service_type, schema, revertible, version: 1 };
        self.0.services.register(service)
    }

    pub fn list_services(&self, project_id: ProjectId) -> Vec<Service> {
        self.0.services.list(project_id)
    }

    // -- groundings ---------------------------------------------------------

    pub fn register_grounding(&self, project_id: ProjectId, spec: GroundingSpec) -> Result<(), CoreError> {
        spec.validate()?;
        self.0.groundings.write().entry(project_id).or_default().insert(spec.name.clone(), spec);
        Ok(())
    }

    pub fn list_groundings(&self, project_id: ProjectId) -> Vec<GroundingSpec> {
        self.grounding_specs_for(project_id)
    }

    pub fn delete_grounding(&self, project_id: ProjectId, name: &str) -> bool {
        self.0.groundings.write().get_mut(&project_id).map(|m| m.remove(name).is_some()).unwrap_or(false)
    }

    pub fn delete_all_groundings(&self, project_id: ProjectId) {
        self.0.groundings.write().remove(&project_id);
    }

    fn grounding_specs_for(&self, project_id: ProjectId) -> Vec<GroundingSpec> {
        self.0.groundings.read().get(&project_id).map(|m| m.values().cloned().collect()).unwrap_or_default()
    }

    // -- orchestrations ---------------------------------------------------

    pub fn get_orchestration(&self, orchestration_id: &OrchestrationId) -> Option<Orchestration> {
        self.0.log_manager.orchestrations().get(orchestration_id)
    }

    pub fn list_orchestrations(&self, project_id: ProjectId) -> Vec<Orchestration> {
        self.0
            .orchestration_index
            .read()
            .get(&project_id)
            .map(|ids| ids.iter().filter_map(|id| self.0.log_manager.orchestrations().get(id)).collect())
            .unwrap_or_default()
    }

    pub fn inspect(&self, orchestration_id: &OrchestrationId) -> Option<(Orchestration, Vec<LogEntry>)> {
        let orchestration = self.0.log_manager.orchestrations().get(orchestration_id)?;
        let log = self.0.log_manager.log_for(*orchestration_id);
        Some((orchestration, log.read_from(0)))
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn submit_orchestration(
        &self,
        project_id: ProjectId,
        action: Action,
        params: Vec<ActionParam>,
        webhook: String,
        timeout: Option<Duration>,
        health_check_grace_period: Option<Duration>,
    ) -> Result<Orchestration, CoreError> {
        let project = self.0.projects.get(project_id).ok_or_else(|| CoreError::NotExist("project", project_id.to_string()))?;
        if !orra_engine::planner::webhook_is_registered(&project, &webhook) {
            return Err(CoreError::InvalidRequest(format!("webhook {webhook} is not registered for this project")));
        }

        let task_zero: Value = Value::Object(params.iter().map(|p| (p.field.clone(), p.value.clone())).collect());
        let orchestration_id = OrchestrationId::new();
        let now_ms = self.0.clock.epoch_ms();
        let orchestration = Orchestration {
            id: orchestration_id,
            project_id,
            action,
            params,
            plan: None,
            status: OrchestrationStatus::Pending,
            timestamp_ms: now_ms,
            timeout: timeout.unwrap_or(self.0.config.default_task_timeout),
            health_check_grace_period: health_check_grace_period.unwrap_or(self.0.config.default_health_check_grace_period),
            webhook,
            results: Vec::new(),
            error: None,
            task_zero,
        };

        self.0.log_manager.orchestrations().insert(orchestration.clone());
        self.0.orchestration_index.write().entry(project_id).or_default().push(orchestration_id);

        let services = self.0.services.list(project_id);
        let control_plane = self.clone();
        tokio::spawn(async move {
            control_plane.plan_and_run(orchestration_id, services).await;
        });

        Ok(orchestration)
    }

    async fn plan_and_run(&self, orchestration_id: OrchestrationId, services: Vec<Service>) {
        let Some(orchestration) = self.0.log_manager.orchestrations().get(&orchestration_id) else { return };
        let grounding_specs = self.grounding_specs_for(orchestration.project_id);
        let deps = PlannerDeps {
            reasoner: &self.0.reasoner,
            embedder: &self.0.embedder,
            pddl: &self.0.pddl,
            cache: self.0.plan_cache.as_ref(),
            grounding_specs: &grounding_specs,
            grounding_threshold: self.0.config.grounding_match_threshold,
        };

        match orra_engine::planner::prepare(&orchestration, services.clone(), deps, &self.0.clock).await {
            Ok(prepared) => {
                let plan = prepared.plan;
                self.0.log_manager.orchestrations().update(&orchestration_id, |o| {
                    o.plan = Some(plan.clone());
                    o.status = OrchestrationStatus::Processing;
                });
                self.seed_task_zero(orchestration_id, &plan);
                self.spawn_workers(orchestration_id, &plan, services, orchestration.timeout, orchestration.health_check_grace_period);
                self.spawn_compensation_watch(orchestration_id);
            }
            Err(err) => {
                let status = match &err {
                    EngineError::NotActionable(_) => OrchestrationStatus::NotActionable,
                    _ => OrchestrationStatus::Failed,
                };
                self.0.log_manager.finalize(orchestration_id, status, Vec::new(), Some(err.to_string()), false).await;
            }
        }
    }

    fn seed_task_zero(&self, orchestration_id: OrchestrationId, plan: &ExecutionPlan) {
        let Some(task0) = plan.task(TASK_ZERO_ID) else { return };
        let now_ms = self.0.clock.epoch_ms();
        let entry = LogEntry::new(LogEntryType::TaskOutput, TASK_ZERO_ID, task0.input.clone(), "task0", 0, now_ms);
        self.0.log_manager.append(orchestration_id, entry, now_ms);
    }

    fn spawn_workers(&self, orchestration_id: OrchestrationId, plan: &ExecutionPlan, services: Vec<Service>, timeout: Duration, health_grace: Duration) {
        let mut worker_id = 0u64;

        for task in plan.non_task_zero() {
            let Some(service_name) = task.service_name.clone().or_else(|| task.service.clone()) else { continue };
            let Some(service) = services.iter().find(|s| s.name == service_name).cloned() else { continue };
            let service_id = service.id;
            let dependencies = task.dependencies();
            let config = TaskWorkerConfig { orchestration_id, task: task.clone(), dependencies, service, timeout, health_grace };

            let token = self.0.cancel.register(orchestration_id, WorkerId(worker_id));
            worker_id += 1;

            let log_manager = self.0.log_manager.clone();
            let idempotency = self.idempotency_store_for(&service_id);
            let dispatch: Arc<ControlPlane> = Arc::new(self.clone());
            let health = self.0.health.clone();
            let clock = self.0.clock.clone();

            tokio::spawn(async move {
                let worker = TaskWorker::new(config, log_manager, idempotency, dispatch, health, clock);
                worker.run(token).await;
            });
        }

        let aggregator_token = self.0.cancel.register(orchestration_id, WorkerId(worker_id));
        worker_id += 1;
        let aggregator = orra_engine::ResultAggregator::new(orchestration_id, plan, self.0.log_manager.clone(), self.0.log_manager.clone());
        tokio::spawn(async move {
            aggregator.run(aggregator_token).await;
        });

        let failure_token = self.0.cancel.register(orchestration_id, WorkerId(worker_id));
        let failure_tracker = orra_engine::FailureTracker::new(orchestration_id, self.0.log_manager.clone(), self.0.log_manager.clone());
        tokio::spawn(async move {
            failure_tracker.run(failure_token).await;
        });
    }

    fn spawn_compensation_watch(&self, orchestration_id: OrchestrationId) {
        let control_plane = self.clone();
        tokio::spawn(async move {
            control_plane.watch_for_compensation(orchestration_id).await;
        });
    }

    async fn watch_for_compensation(&self, orchestration_id: OrchestrationId) {
        let poll_interval = self.0.config.poll_interval;
        let orchestration = loop {
            match self.0.log_manager.orchestrations().get(&orchestration_id) {
                Some(o) if o.status.is_terminal() => break o,
                Some(_) => tokio::time::sleep(poll_interval).await,
                None => return,
            }
        };

        if orchestration.status != OrchestrationStatus::Failed {
            return;
        }
        let Some(plan) = orchestration.plan.as_ref() else { return };
        let services = self.0.services.list(orchestration.project_id);

        let log = self.0.log_manager.log_for(orchestration_id);
        let entries = log.read_from(0);

        let mut stored: HashMap<TaskId, (Value, u64, u64)> = HashMap::new();
        let mut done: HashSet<TaskId> = HashSet::new();
        for entry in &entries {
            match entry.entry_type {
                LogEntryType::CompensationStored => {
                    if let Some(suffix) = entry.id.strip_prefix("compensation-") {
                        let input = entry.value.get("input").cloned().unwrap_or(Value::Null);
                        let ttl_ms = entry.value.get("ttlMs").and_then(Value::as_u64).unwrap_or(0);
                        let stored_at_ms = entry.value.get("storedAt").and_then(Value::as_u64).unwrap_or(entry.timestamp_ms);
                        stored.insert(TaskId::new(suffix), (input, ttl_ms, stored_at_ms));
                    }
                }
                LogEntryType::CompensationComplete | LogEntryType::CompensationExpired => {
                    done.insert(TaskId::new(entry.producer_id.clone()));
                }
                _ => {}
            }
        }

        let mut candidates = Vec::new();
        for task in plan.non_task_zero().rev() {
            if done.contains(&task.id) {
                continue;
            }
            let Some((input, ttl_ms, stored_at_ms)) = stored.remove(&task.id) else { continue };
            let Some(service_name) = task.service_name.clone().or_else(|| task.service.clone()) else { continue };
            let Some(service) = services.iter().find(|s| s.name == service_name && s.revertible).cloned() else { continue };
            candidates.push(CompensationCandidate { task_id: task.id.clone(), service, input, ttl_ms, stored_at_ms });
        }

        if candidates.is_empty() {
            return;
        }

        let idempotency: Arc<dyn IdempotencyProvider> = Arc::new(self.clone());
        let dispatch = Arc::new(self.clone());
        let worker = CompensationWorker::new(orchestration_id, candidates, self.0.log_manager.clone(), idempotency, dispatch, self.0.clock.clone());
        worker.run(CancellationToken::new()).await;
    }
}

impl IdempotencyProvider for ControlPlane {
    fn store_for(&self, service_id: &ServiceId) -> Arc<IdempotencyStore> {
        self.idempotency_store_for(service_id)
    }
}

#[async_trait::async_trait]
impl TaskDispatch for ControlPlane {
    async fn send_task(&self, service_id: &ServiceId, request: &TaskRequest) -> Result<(), DispatchError> {
        let payload = OutboundPayload::TaskRequest(request.clone());
        self.0.sessions.send(service_id, payload).await
    }

    async fn send_compensation(&self, service_id: &ServiceId, request: &TaskRequest) -> Result<(), DispatchError> {
        let payload = OutboundPayload::CompensationRequest(request.clone());
        self.0.sessions.send(service_id, payload).await
    }
}
