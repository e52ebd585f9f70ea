// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Planner (§4.6): turns an orchestration's action + params into a
//! validated [`ExecutionPlan`], consulting the plan cache, the grounding
//! specs, the reasoner, and (on a cache miss with grounding) the PDDL
//! validator.

use crate::backoff::Backoff;
use crate::embedder::{cache_embedding_text, l2_normalize, strip_placeholders, Embedder};
use crate::error::EngineError;
use crate::pddl::{generate_domain, generate_problem, PddlValidator};
use crate::reasoner::{extract_json_block, Reasoner};
use orra_core::{
    Action, ActionParam, Clock, ExecutionPlan, GroundingSpec, Orchestration, Project, Service,
    ServiceId,
};
use orra_storage::{CacheEntry, PlanCache};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

const MAX_PREPARE_RETRIES: u32 = 2;

/// Stable-ordered projection of a [`Service`] fed into prompts and hashed
/// into `servicesHash` (GLOSSARY).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDescription {
    pub id: ServiceId,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub service_type: String,
    pub schema: orra_core::ServiceSchema,
    pub revertible: bool,
}

impl ServiceDescription {
    pub fn from_service(service: &Service) -> Self {
        Self {
            id: service.id,
            name: service.name.clone(),
            description: service.description.clone(),
            service_type: service.service_type.to_string(),
            schema: service.schema.clone(),
            revertible: service.revertible,
        }
    }
}

pub fn service_descriptions(mut services: Vec<Service>) -> Vec<ServiceDescription> {
    services.sort_by(|a, b| a.id.to_string().cmp(&b.id.to_string()));
    services.iter().map(ServiceDescription::from_service).collect()
}

pub fn services_hash(descriptions: &[ServiceDescription]) -> String {
    let canonical = serde_json::to_string(descriptions).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMapping {
    pub field: String,
    pub action_field: String,
    pub value: Value,
}

/// Discovers cache mappings by matching each action param's value against
/// `task0_input`'s values (string equality only), sorted by task0 field for
/// determinism (§4.5 step 6).
pub fn discover_mappings(params: &[ActionParam], task0_input: &Value) -> Vec<CacheMapping> {
    let mut mappings = Vec::new();
    let Some(obj) = task0_input.as_object() else { return mappings };
    let mut fields: Vec<&String> = obj.keys().collect();
    fields.sort();
    for field in fields {
        let Some(t0_str) = obj[field].as_str() else { continue };
        if let Some(param) = params.iter().find(|p| p.value.as_str() == Some(t0_str)) {
            mappings.push(CacheMapping { field: field.clone(), action_field: param.field.clone(), value: param.value.clone() });
        }
    }
    mappings
}

/// Rebuilds `task0.input` from the new params using `mappings`. Returns
/// `None` (forcing a miss) if any `mapping.action_field` doesn't resolve in
/// `new_params` (§4.5 step 5).
pub fn remap_task0_input(cached_task0_input: &Value, mappings: &[CacheMapping], new_params: &[ActionParam]) -> Option<Value> {
    let mut obj = cached_task0_input.as_object()?.clone();
    for mapping in mappings {
        let new_value = new_params.iter().find(|p| p.field == mapping.action_field)?.value.clone();
        obj.insert(mapping.field.clone(), new_value);
    }
    Some(Value::Object(obj))
}

fn substitute_task0(plan: &mut ExecutionPlan, task0_input: Value) {
    if let Some(task0) = plan.tasks.iter_mut().find(|t| t.id.is_task_zero()) {
        task0.input = task0_input;
    }
}

fn params_field_list(params: &[ActionParam]) -> Vec<String> {
    params.iter().map(|p| p.field.clone()).collect()
}

/// First use-case whose action (placeholder-stripped) matches the
/// orchestration's action (placeholder-stripped) by embedding cosine
/// similarity >= threshold (§4.6 step 4).
pub async fn match_grounding<E: Embedder>(
    embedder: &E,
    action: &str,
    specs: &[GroundingSpec],
    threshold: f32,
) -> Result<Option<String>, EngineError> {
    let mut action_embedding = embedder.embed(&strip_placeholders(action)).await.map_err(|e| EngineError::Embedder(e.to_string()))?;
    l2_normalize(&mut action_embedding);

    for spec in specs {
        for use_case in &spec.use_cases {
            let mut uc_embedding = embedder
                .embed(&strip_placeholders(&use_case.action))
                .await
                .map_err(|e| EngineError::Embedder(e.to_string()))?;
            l2_normalize(&mut uc_embedding);
            let sim: f32 = action_embedding.iter().zip(&uc_embedding).map(|(a, b)| a * b).sum();
            if sim >= threshold {
                return Ok(Some(use_case.action.clone()));
            }
        }
    }
    Ok(None)
}

pub struct PlannerDeps<'a, R: Reasoner, E: Embedder, P: PddlValidator> {
    pub reasoner: &'a R,
    pub embedder: &'a E,
    pub pddl: &'a P,
    pub cache: &'a PlanCache,
    pub grounding_specs: &'a [GroundingSpec],
    pub grounding_threshold: f32,
}

pub struct PreparedPlan {
    pub plan: ExecutionPlan,
    pub from_cache: bool,
}

/// Runs the full preparation pipeline for an already-stored, webhook-
/// validated orchestration (steps 3-5 of §4.6 — steps 1-2 are the Control
/// Plane's job before calling in).
pub async fn prepare<R: Reasoner, E: Embedder, P: PddlValidator>(
    orchestration: &Orchestration,
    services: Vec<Service>,
    deps: PlannerDeps<'_, R, E, P>,
    clock: &impl Clock,
) -> Result<PreparedPlan, EngineError> {
    let descriptions = service_descriptions(services);
    let hash = services_hash(&descriptions);
    let action_text = orchestration.action.content.as_str();

    let grounding_hit = match_grounding(deps.embedder, action_text, deps.grounding_specs, deps.grounding_threshold).await?;

    let backoff = Backoff::new(Duration::from_millis(200), Duration::from_secs(2), 0.1);
    let mut error_feedback: Option<String> = None;

    for attempt in 0..=MAX_PREPARE_RETRIES {
        match try_prepare_once(orchestration, &descriptions, &hash, grounding_hit.as_deref(), error_feedback.as_deref(), &deps, clock).await {
            Ok(prepared) => return Ok(prepared),
            Err(EngineError::NotActionable(msg)) => return Err(EngineError::NotActionable(msg)),
            Err(err) if attempt < MAX_PREPARE_RETRIES => {
                warn!(attempt, error = %err, "plan preparation attempt failed, retrying");
                error_feedback = Some(err.to_string());
                tokio::time::sleep(backoff.delay_for(attempt, clock.epoch_ms())).await;
            }
            Err(err) => return Err(EngineError::Permanent(err.to_string())),
        }
    }
    unreachable!("loop always returns within MAX_PREPARE_RETRIES + 1 iterations")
}

async fn try_prepare_once<R: Reasoner, E: Embedder, P: PddlValidator>(
    orchestration: &Orchestration,
    descriptions: &[ServiceDescription],
    hash: &str,
    grounding_hit: Option<&str>,
    error_feedback: Option<&str>,
    deps: &PlannerDeps<'_, R, E, P>,
    clock: &impl Clock,
) -> Result<PreparedPlan, EngineError> {
    let now_ms = clock.epoch_ms();
    let field_list = params_field_list(&orchestration.params);
    let mut embedding = deps
        .embedder
        .embed(&cache_embedding_text(&orchestration.action.content, &field_list))
        .await
        .map_err(|e| EngineError::Embedder(e.to_string()))?;
    l2_normalize(&mut embedding);

    if let Some(hit) = deps.cache.lookup(orchestration.project_id, hash, &embedding, now_ms) {
        let mappings: Vec<CacheMapping> = hit
            .entry
            .cache_mappings
            .get("mappings")
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default();

        let cached_task0_input = hit.entry.plan.task(orra_core::TASK_ZERO_ID).map(|t| t.input.clone()).unwrap_or(Value::Null);
        if let Some(task0_input) = remap_task0_input(&cached_task0_input, &mappings, &orchestration.params) {
            let mut plan = hit.entry.plan.clone();
            substitute_task0(&mut plan, task0_input);
            return finish_plan(plan, true);
        }
        // Remap failed: every mapping's action_field must resolve; force a miss.
    }

    let prompt = build_prompt(orchestration, descriptions, grounding_hit, error_feedback);
    let response = deps.reasoner.generate(&prompt).await.map_err(|e| EngineError::Reasoner(e.to_string()))?;
    let json_block = extract_json_block(&response).map_err(|e| EngineError::Reasoner(e.to_string()))?;
    let mut plan: ExecutionPlan = serde_json::from_str(json_block).map_err(|e| EngineError::Permanent(format!("plan did not parse: {e}")))?;

    if plan.task(orra_core::plan::FINAL_TASK_ID).is_some() {
        return Err(EngineError::NotActionable("planner returned a final task: no capable service".to_string()));
    }
    if !plan.is_well_formed() {
        return Err(EngineError::Retryable("plan is not well-formed (missing task0, cycle, or unknown dependency)".to_string()));
    }

    let task0_input = plan.task(orra_core::TASK_ZERO_ID).map(|t| t.input.clone()).unwrap_or(Value::Null);

    validate_service_task_inputs(&plan, descriptions)?;

    if grounding_hit.is_some() {
        let domain = generate_domain("orra-domain", &plan);
        let problem = generate_problem("orra-domain", "orra-problem", &plan);
        deps.pddl.validate(&domain, &problem).await.map_err(|e| EngineError::PddlValidation(e.to_string()))?;
    }

    let mappings = discover_mappings(&orchestration.params, &task0_input);
    let mut cache_mappings = HashMap::new();
    cache_mappings.insert("mappings".to_string(), serde_json::to_string(&mappings).unwrap_or_default());

    deps.cache.insert(
        orchestration.project_id,
        CacheEntry {
            id: nanoid::nanoid!(12),
            services_hash: hash.to_string(),
            action: orchestration.action.content.clone(),
            embedding,
            plan: plan.clone(),
            cache_mappings,
            created_at_ms: now_ms,
            last_hit_ms: now_ms,
        },
    );

    finish_plan(plan, false)
}

fn finish_plan(plan: ExecutionPlan, from_cache: bool) -> Result<PreparedPlan, EngineError> {
    Ok(PreparedPlan { plan, from_cache })
}

fn validate_service_task_inputs(plan: &ExecutionPlan, descriptions: &[ServiceDescription]) -> Result<(), EngineError> {
    for task in plan.non_task_zero() {
        let Some(service_name) = &task.service_name.clone().or_else(|| task.service.clone()) else { continue };
        let Some(description) = descriptions.iter().find(|d| &d.name == service_name) else { continue };
        let declared: std::collections::BTreeSet<String> = description.schema.input_keys().into_iter().collect();
        let Some(provided) = task.input.as_object() else {
            return Err(EngineError::Retryable(format!("task {} input must be an object", task.id)));
        };
        let provided_keys: std::collections::BTreeSet<String> = provided.keys().cloned().collect();
        if declared != provided_keys {
            return Err(EngineError::Retryable(format!(
                "task {} input keys {:?} do not exactly match service {:?} declared keys {:?}",
                task.id, provided_keys, service_name, declared
            )));
        }
    }
    Ok(())
}

fn build_prompt(orchestration: &Orchestration, descriptions: &[ServiceDescription], grounding_hit: Option<&str>, error_feedback: Option<&str>) -> String {
    let services_json = serde_json::to_string_pretty(descriptions).unwrap_or_default();
    let params_json = serde_json::to_string_pretty(&orchestration.params).unwrap_or_default();
    let mut prompt = format!(
        "Produce a JSON execution plan for action {:?} with params:\n{params_json}\n\nAvailable services:\n{services_json}\n",
        orchestration.action.content
    );
    if let Some(hit) = grounding_hit {
        prompt.push_str(&format!("\nMatched grounding use case: {hit}\n"));
    }
    if let Some(feedback) = error_feedback {
        prompt.push_str(&format!("\nThe previous attempt failed: {feedback}\nPlease correct it.\n"));
    }
    prompt
}

pub fn webhook_is_registered(project: &Project, orchestration_webhook: &str) -> bool {
    project.has_webhook(orchestration_webhook)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn discover_mappings_matches_string_equal_param_values() {
        let params = vec![
            ActionParam { field: "orderId".to_string(), value: json!("ord-1") },
            ActionParam { field: "reason".to_string(), value: json!("damaged") },
        ];
        let task0_input = json!({"order": "ord-1", "constant": "unrelated"});
        let mappings = discover_mappings(&params, &task0_input);
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].field, "order");
        assert_eq!(mappings[0].action_field, "orderId");
    }

    #[test]
    fn remap_fails_when_action_field_missing_from_new_params() {
        let cached = json!({"order": "ord-1", "constant": "x"});
        let mappings = vec![CacheMapping { field: "order".to_string(), action_field: "orderId".to_string(), value: json!("ord-1") }];
        let new_params = vec![ActionParam { field: "somethingElse".to_string(), value: json!("ord-2") }];
        assert!(remap_task0_input(&cached, &mappings, &new_params).is_none());
    }

    #[test]
    fn remap_substitutes_mapped_fields_and_keeps_constants() {
        let cached = json!({"order": "ord-1", "constant": "x"});
        let mappings = vec![CacheMapping { field: "order".to_string(), action_field: "orderId".to_string(), value: json!("ord-1") }];
        let new_params = vec![ActionParam { field: "orderId".to_string(), value: json!("ord-2") }];
        let rebuilt = remap_task0_input(&cached, &mappings, &new_params).expect("remap");
        assert_eq!(rebuilt["order"], json!("ord-2"));
        assert_eq!(rebuilt["constant"], json!("x"));
    }

    #[test]
    fn services_hash_is_stable_across_identical_inputs() {
        let service = Service {
            id: ServiceId::new(),
            project_id: orra_core::ProjectId::new(),
            name: "refund-service".to_string(),
            description: "d".to_string(),
            service_type: orra_core::ServiceType::Service,
            schema: orra_core::ServiceSchema { input: json!({"type":"object","properties":{"a":{"type":"string"}}}), output: json!({"type":"object","properties":{"b":{"type":"string"}}}) },
            revertible: false,
            version: 1,
        };
        let descriptions = service_descriptions(vec![service.clone()]);
        assert_eq!(services_hash(&descriptions), services_hash(&service_descriptions(vec![service])));
    }
}
