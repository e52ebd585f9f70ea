// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PDDL generation and the external validator interface (§1, §4.6 step 5).
//! Generation of the domain/problem text is in-scope; the validator that
//! checks them is an out-of-scope external collaborator.

use async_trait::async_trait;
use orra_core::ExecutionPlan;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PddlError {
    #[error("pddl validation failed: {0}")]
    Invalid(String),
}

#[async_trait]
pub trait PddlValidator: Send + Sync {
    async fn validate(&self, domain: &str, problem: &str) -> Result<(), PddlError>;
}

/// Renders a minimal STRIPS-style domain describing one action per
/// non-`task0` task, parameterised by its declared capabilities.
pub fn generate_domain(domain_name: &str, plan: &ExecutionPlan) -> String {
    let mut out = format!("(define (domain {domain_name})\n  (:requirements :strips :typing)\n");
    for task in plan.non_task_zero() {
        out.push_str(&format!("  (:action {}\n", task.id));
        out.push_str("    :parameters ()\n");
        let preconditions: Vec<String> = task.dependencies().into_iter().map(|d| format!("(done-{d})")).collect();
        if preconditions.is_empty() {
            out.push_str("    :precondition ()\n");
        } else {
            out.push_str(&format!("    :precondition (and {})\n", preconditions.join(" ")));
        }
        out.push_str(&format!("    :effect (done-{})\n", task.id));
        out.push_str("  )\n");
    }
    out.push(')');
    out
}

/// Renders the matching problem file: the goal is every non-`task0` task
/// marked done.
pub fn generate_problem(domain_name: &str, problem_name: &str, plan: &ExecutionPlan) -> String {
    let goals: Vec<String> = plan.non_task_zero().map(|t| format!("(done-{})", t.id)).collect();
    format!(
        "(define (problem {problem_name})\n  (:domain {domain_name})\n  (:goal (and {}))\n)",
        goals.join(" ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use orra_core::{SubTask, TaskId};
    use serde_json::json;

    fn plan() -> ExecutionPlan {
        ExecutionPlan {
            tasks: vec![
                SubTask {
                    id: TaskId::new("task0"),
                    service: None,
                    input: json!({}),
                    service_name: None,
                    capabilities: vec![],
                    expected_input: None,
                    expected_output: None,
                },
                SubTask {
                    id: TaskId::new("task1"),
                    service: Some("refund-service".to_string()),
                    input: json!({"order": "$task0.orderId"}),
                    service_name: None,
                    capabilities: vec![],
                    expected_input: None,
                    expected_output: None,
                },
            ],
            parallel_groups: vec![],
        }
    }

    #[test]
    fn generated_domain_declares_one_action_per_task() {
        let domain = generate_domain("refund-domain", &plan());
        assert!(domain.contains("(:action task1"));
        assert!(!domain.contains("(:action task0"));
    }

    #[test]
    fn generated_problem_goals_cover_every_non_root_task() {
        let problem = generate_problem("refund-domain", "refund-problem", &plan());
        assert!(problem.contains("(done-task1)"));
    }
}
