// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dependency tracking for a single [`orra_core::SubTask`] (§4.7 steps 1-3):
//! scans `task_output` log entries for the task's declared dependencies,
//! and once every dependency has produced output, projects them through the
//! task's `$depId.field` references to compute its input.

use orra_core::{LogEntry, LogEntryType, SubTask, TaskId};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

#[derive(Default)]
pub struct DependencyState {
    outputs: HashMap<TaskId, Value>,
    processed_entry_ids: BTreeSet<String>,
}

impl DependencyState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds `entry` in if it's a not-yet-processed `task_output` for one
    /// of `deps`. Returns `true` if this call made progress.
    pub fn observe(&mut self, entry: &LogEntry, deps: &BTreeSet<TaskId>) -> bool {
        if entry.entry_type != LogEntryType::TaskOutput {
            return false;
        }
        if self.processed_entry_ids.contains(&entry.id) {
            return false;
        }
        let Some(dep_id) = deps.iter().find(|d| d.as_str() == entry.id) else { return false };
        self.outputs.insert(dep_id.clone(), entry.value.clone());
        self.processed_entry_ids.insert(entry.id.clone());
        true
    }

    pub fn all_ready(&self, deps: &BTreeSet<TaskId>) -> bool {
        deps.iter().all(|d| self.outputs.contains_key(d))
    }

    pub fn output_of(&self, dep: &TaskId) -> Option<&Value> {
        self.outputs.get(dep)
    }

    /// `(depId, depOutput)` pairs sorted by dep id, for idempotency key
    /// derivation (§4.7 step 3). `None` until every dep is ready.
    pub fn sorted_dep_pairs(&self, deps: &BTreeSet<TaskId>) -> Option<Vec<(String, Value)>> {
        if !self.all_ready(deps) {
            return None;
        }
        Some(deps.iter().map(|d| (d.as_str().to_string(), self.outputs[d].clone())).collect())
    }
}

/// Projects `task`'s input through the resolved dependency outputs,
/// replacing every `$depId.field[.field...]` string leaf with the looked-up
/// value. Returns `None` if any referenced path isn't resolvable yet.
pub fn resolve_task_input(task: &SubTask, state: &DependencyState) -> Option<Value> {
    resolve_value(&task.input, state)
}

fn resolve_value(value: &Value, state: &DependencyState) -> Option<Value> {
    match value {
        Value::String(s) => {
            let Some(dep_id) = orra_core::plan::dependency_of(value) else { return Some(value.clone()) };
            let prefix = format!("${}.", dep_id.as_str());
            let rest = s.strip_prefix(&prefix)?;
            let mut current = state.output_of(&dep_id)?;
            for part in rest.split('.') {
                current = current.get(part)?;
            }
            Some(current.clone())
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(resolve_value(item, state)?);
            }
            Some(Value::Array(out))
        }
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), resolve_value(v, state)?);
            }
            Some(Value::Object(out))
        }
        other => Some(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orra_core::TaskId;
    use serde_json::json;

    fn output_entry(id: &str, value: Value) -> LogEntry {
        LogEntry::new(LogEntryType::TaskOutput, id, value, "worker", 0, 0)
    }

    fn task(id: &str, input: Value) -> SubTask {
        SubTask {
            id: TaskId::new(id),
            service: None,
            input,
            service_name: None,
            capabilities: vec![],
            expected_input: None,
            expected_output: None,
        }
    }

    #[test]
    fn observe_ignores_entries_outside_dependency_set() {
        let mut state = DependencyState::new();
        let deps: BTreeSet<TaskId> = [TaskId::new("task0")].into_iter().collect();
        assert!(!state.observe(&output_entry("other", json!({})), &deps));
    }

    #[test]
    fn observe_deduplicates_by_entry_id() {
        let mut state = DependencyState::new();
        let deps: BTreeSet<TaskId> = [TaskId::new("task0")].into_iter().collect();
        assert!(state.observe(&output_entry("task0", json!({"orderId": "A"})), &deps));
        assert!(!state.observe(&output_entry("task0", json!({"orderId": "B"})), &deps));
        assert_eq!(state.output_of(&TaskId::new("task0")), Some(&json!({"orderId": "A"})));
    }

    #[test]
    fn resolve_task_input_waits_for_all_deps() {
        let mut state = DependencyState::new();
        let deps: BTreeSet<TaskId> = [TaskId::new("task0")].into_iter().collect();
        let t = task("task1", json!({"order": "$task0.orderId"}));
        assert!(resolve_task_input(&t, &state).is_none());
        state.observe(&output_entry("task0", json!({"orderId": "ord-1"})), &deps);
        let resolved = resolve_task_input(&t, &state).expect("resolved");
        assert_eq!(resolved, json!({"order": "ord-1"}));
    }

    #[test]
    fn resolve_task_input_supports_nested_field_paths() {
        let mut state = DependencyState::new();
        let deps: BTreeSet<TaskId> = [TaskId::new("task0")].into_iter().collect();
        state.observe(&output_entry("task0", json!({"customer": {"id": "cust-1"}})), &deps);
        let t = task("task1", json!({"customerId": "$task0.customer.id"}));
        let resolved = resolve_task_input(&t, &state).expect("resolved");
        assert_eq!(resolved, json!({"customerId": "cust-1"}));
    }

    #[test]
    fn sorted_dep_pairs_is_none_until_every_dep_ready() {
        let mut state = DependencyState::new();
        let deps: BTreeSet<TaskId> = [TaskId::new("task0"), TaskId::new("task1")].into_iter().collect();
        state.observe(&output_entry("task0", json!("a")), &deps);
        assert!(state.sorted_dep_pairs(&deps).is_none());
        state.observe(&output_entry("task1", json!("b")), &deps);
        let pairs = state.sorted_dep_pairs(&deps).expect("ready");
        assert_eq!(pairs, vec![("task0".to_string(), json!("a")), ("task1".to_string(), json!("b"))]);
    }
}
