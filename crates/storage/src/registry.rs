// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-project service/agent registry (§4.3). Re-registering an existing
//! name bumps its version in place and keeps its `ServiceId` — the
//! idempotency store keyed by that id is unaffected by a re-registration.

use orra_core::{CoreError, Project, ProjectId, Service, ServiceId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered,
    Reregistered { previous_version: u32 },
}

#[derive(Default, Clone)]
struct ProjectServices {
    by_id: HashMap<ServiceId, Service>,
    id_by_name: HashMap<String, ServiceId>,
}

/// `projectId -> {serviceId -> Service}` with a name index for
/// re-registration lookups.
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    projects: Arc<RwLock<HashMap<ProjectId, ProjectServices>>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `service`. If a service with the same name already exists
    /// in the project, its id and version are reused (version += 1) and the
    /// schema/description/revertible flag are replaced in place; otherwise
    /// `service.id` is used as-is (the caller mints a fresh id beforehand).
    pub fn register(&self, mut service: Service) -> Result<(ServiceId, RegisterOutcome), CoreError> {
        service.validate()?;
        let mut projects = self.projects.write();
        let entry = projects.entry(service.project_id).or_default();

        if let Some(existing_id) = entry.id_by_name.get(&service.name).copied() {
            let previous_version = entry.by_id.get(&existing_id).map(|s| s.version).unwrap_or(0);
            service.id = existing_id;
            service.version = previous_version + 1;
            entry.by_id.insert(existing_id, service);
            return Ok((existing_id, RegisterOutcome::Reregistered { previous_version }));
        }

        let id = service.id;
        entry.id_by_name.insert(service.name.clone(), id);
        entry.by_id.insert(id, service);
        Ok((id, RegisterOutcome::Registered))
    }

    pub fn get(&self, project_id: ProjectId, service_id: &ServiceId) -> Option<Service> {
        self.projects.read().get(&project_id)?.by_id.get(service_id).cloned()
    }

    pub fn list(&self, project_id: ProjectId) -> Vec<Service> {
        self.projects
            .read()
            .get(&project_id)
            .map(|p| p.by_id.values().cloned().collect())
            .unwrap_or_default()
    }

    /// All services healthy-eligible for dispatch: every registered service
    /// in the project, regardless of websocket connection state — connection
    /// liveness is tracked separately by the health coordinator.
    pub fn services_hash_input(&self, project_id: ProjectId) -> Vec<Service> {
        let mut services = self.list(project_id);
        services.sort_by(|a, b| a.id.to_string().cmp(&b.id.to_string()));
        services
    }
}

#[derive(Clone)]
pub struct ProjectRegistry {
    projects: Arc<RwLock<HashMap<ProjectId, Project>>>,
}

impl Default for ProjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectRegistry {
    pub fn new() -> Self {
        Self { projects: Arc::new(RwLock::new(HashMap::new())) }
    }

    pub fn insert(&self, project: Project) {
        self.projects.write().insert(project.id, project);
    }

    pub fn get(&self, project_id: ProjectId) -> Option<Project> {
        self.projects.read().get(&project_id).cloned()
    }

    /// Finds the owning project for an API key, scanning primary and
    /// additional keys (§6 auth).
    pub fn project_for_key(&self, api_key: &str) -> Option<Project> {
        self.projects.read().values().find(|p| p.owns_key(api_key)).cloned()
    }

    pub fn update<F: FnOnce(&mut Project)>(&self, project_id: ProjectId, f: F) -> Option<Project> {
        let mut projects = self.projects.write();
        let project = projects.get_mut(&project_id)?;
        f(project);
        Some(project.clone())
    }
}
