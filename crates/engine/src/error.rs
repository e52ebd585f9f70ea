// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution-time errors. Distinguishes retryable conditions (the caller's
//! backoff loop should sleep and try again) from permanent ones (the
//! orchestration is finalised failed or not_actionable).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("retryable: {0}")]
    Retryable(String),
    #[error("not_actionable: {0}")]
    NotActionable(String),
    #[error("permanent failure: {0}")]
    Permanent(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("reasoner error: {0}")]
    Reasoner(String),
    #[error("embedder error: {0}")]
    Embedder(String),
    #[error("pddl validation failed: {0}")]
    PddlValidation(String),
}

impl EngineError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Retryable(_) | EngineError::Transport(_))
    }
}

impl From<orra_storage::IdempotencyError> for EngineError {
    fn from(err: orra_storage::IdempotencyError) -> Self {
        EngineError::Storage(err.to_string())
    }
}
