// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution plans: the DAG of sub-tasks an orchestration is compiled into.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Borrow;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

/// Task identifier, e.g. `"task0"`, `"task1"`, or a planner-assigned name.
/// Unlike the UUID-backed ids in [`crate::id`], task ids are short strings
/// supplied by the LLM-produced plan, so this is a plain newtype.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

/// The reserved id of the constant-input seed task every plan is rooted at.
pub const TASK_ZERO_ID: &str = "task0";

/// The reserved id a planner output uses to signal "no capable service" —
/// its presence makes the whole plan permanently not-actionable.
pub const FINAL_TASK_ID: &str = "final";

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_task_zero(&self) -> bool {
        self.0 == TASK_ZERO_ID
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Borrow<str> for TaskId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for TaskId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

/// A single node in an [`ExecutionPlan`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubTask {
    pub id: TaskId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<Value>,
}

impl SubTask {
    /// The set of parent task ids this task's inputs reference, derived by
    /// scanning every string value for `$<taskID>.<field>`.
    pub fn dependencies(&self) -> BTreeSet<TaskId> {
        let mut deps = BTreeSet::new();
        collect_dependencies(&self.input, &mut deps);
        deps
    }
}

fn dependency_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"^\$([^.]+)\.").expect("static regex is valid"))
}

/// Total function: non-string or non-matching values contribute no
/// dependency (§9 "dependency extraction").
pub fn dependency_of(value: &Value) -> Option<TaskId> {
    let s = value.as_str()?;
    let caps = dependency_regex().captures(s)?;
    Some(TaskId::new(caps.get(1)?.as_str()))
}

fn collect_dependencies(value: &Value, out: &mut BTreeSet<TaskId>) {
    match value {
        Value::String(_) => {
            if let Some(dep) = dependency_of(value) {
                out.insert(dep);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_dependencies(item, out);
            }
        }
        Value::Object(map) => {
            for v in map.values() {
                collect_dependencies(v, out);
            }
        }
        _ => {}
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub tasks: Vec<SubTask>,
    #[serde(default)]
    pub parallel_groups: Vec<Vec<TaskId>>,
}

impl ExecutionPlan {
    pub fn task(&self, id: &str) -> Option<&SubTask> {
        self.tasks.iter().find(|t| t.id.as_str() == id)
    }

    pub fn non_task_zero(&self) -> impl Iterator<Item = &SubTask> {
        self.tasks.iter().filter(|t| !t.id.is_task_zero())
    }

    /// True iff the plan is acyclic and every dependency resolves to a task
    /// present in the plan (rooted at `task0`).
    pub fn is_well_formed(&self) -> bool {
        let ids: BTreeSet<&str> = self.tasks.iter().map(|t| t.id.as_str()).collect();
        if !ids.contains(TASK_ZERO_ID) {
            return false;
        }
        for task in &self.tasks {
            for dep in task.dependencies() {
                if !ids.contains(dep.as_str()) {
                    return false;
                }
            }
        }
        !has_cycle(&self.tasks)
    }
}

fn has_cycle(tasks: &[SubTask]) -> bool {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }

    fn visit<'a>(
        id: &'a str,
        tasks: &'a [SubTask],
        marks: &mut std::collections::HashMap<&'a str, Mark>,
    ) -> bool {
        match marks.get(id) {
            Some(Mark::Done) => return false,
            Some(Mark::InProgress) => return true,
            _ => {}
        }
        marks.insert(id, Mark::InProgress);
        if let Some(task) = tasks.iter().find(|t| t.id.as_str() == id) {
            for dep in task.dependencies() {
                if visit(dep.as_str(), tasks, marks) {
                    return true;
                }
            }
        }
        marks.insert(id, Mark::Done);
        false
    }

    let mut marks = std::collections::HashMap::new();
    tasks.iter().any(|t| visit(t.id.as_str(), tasks, &mut marks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

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
    fn dependency_of_matches_total_function_contract() {
        assert_eq!(dependency_of(&json!("$task0.orderId")), Some(TaskId::new("task0")));
        assert_eq!(dependency_of(&json!("plain string")), None);
        assert_eq!(dependency_of(&json!(42)), None);
        assert_eq!(dependency_of(&json!(null)), None);
    }

    #[test]
    fn subtask_dependencies_scan_nested_values() {
        let t = task(
            "task1",
            json!({"order": "$task0.orderId", "meta": {"note": "$task0.note"}, "tags": ["$task0.tag", "literal"]}),
        );
        let deps = t.dependencies();
        assert_eq!(deps.len(), 1);
        assert!(deps.contains(&TaskId::new("task0")));
    }

    #[test]
    fn plan_well_formed_requires_task_zero_and_acyclic_deps() {
        let plan = ExecutionPlan {
            tasks: vec![
                task("task0", json!({"orderId": "A"})),
                task("task1", json!({"order": "$task0.orderId"})),
            ],
            parallel_groups: vec![],
        };
        assert!(plan.is_well_formed());

        let missing_root = ExecutionPlan {
            tasks: vec![task("task1", json!({"order": "literal"}))],
            parallel_groups: vec![],
        };
        assert!(!missing_root.is_well_formed());
    }

    #[test]
    fn plan_rejects_cycles() {
        let plan = ExecutionPlan {
            tasks: vec![
                task("task0", json!({})),
                task("task1", json!({"x": "$task2.y"})),
                task("task2", json!({"y": "$task1.x"})),
            ],
            parallel_groups: vec![],
        };
        assert!(!plan.is_well_formed());
    }

    #[test]
    fn plan_rejects_unknown_dependency() {
        let plan = ExecutionPlan {
            tasks: vec![
                task("task0", json!({})),
                task("task1", json!({"x": "$missing.y"})),
            ],
            parallel_groups: vec![],
        };
        assert!(!plan.is_well_formed());
    }
}
