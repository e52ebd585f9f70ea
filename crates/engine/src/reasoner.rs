// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The LLM collaborator: out of scope beyond this interface (§1). The
//! planner hands it a prompt and expects a response containing a fenced
//! ` ```json ` block describing an [`orra_core::ExecutionPlan`].

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReasonerError {
    #[error("reasoner call failed: {0}")]
    CallFailed(String),
}

#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ReasonerError>;
}

/// Extracts the first ` ```json ... ``` ` fenced block from a reasoner
/// response. Errors if none is present (§4.6 step 5 "extract the first
/// json block; error out otherwise").
pub fn extract_json_block(response: &str) -> Result<&str, ReasonerError> {
    let start_fence = response
        .find("```json")
        .ok_or_else(|| ReasonerError::CallFailed("no ```json block in reasoner response".to_string()))?;
    let after_fence = start_fence + "```json".len();
    let rest = &response[after_fence..];
    let end = rest
        .find("```")
        .ok_or_else(|| ReasonerError::CallFailed("unterminated ```json block in reasoner response".to_string()))?;
    Ok(rest[..end].trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_fenced_block() {
        let response = "here is the plan:\n```json\n{\"tasks\": []}\n```\nthanks";
        assert_eq!(extract_json_block(response).unwrap(), "{\"tasks\": []}");
    }

    #[test]
    fn errors_when_no_fence_present() {
        assert!(extract_json_block("just prose, no plan").is_err());
    }

    #[test]
    fn errors_when_fence_unterminated() {
        assert!(extract_json_block("```json\n{\"tasks\": []}").is_err());
    }
}
