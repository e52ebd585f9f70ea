// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Selects the reasoner/embedder/PDDL-validator collaborators from config
//! (§6.1): an HTTP adapter when a base URL is configured, otherwise a
//! fail-closed stub that rejects every call. None of the three is allowed to
//! silently no-op — an unconfigured collaborator should surface as a loud
//! planning failure, not a plan that pretends to have succeeded.

use async_trait::async_trait;
use orra_core::Config;
use orra_engine::pddl::PddlError;
use orra_engine::{Embedder, EmbedderError, PddlValidator, Reasoner, ReasonerError};
use std::sync::Arc;

pub fn build(config: &Config) -> (Arc<dyn Reasoner>, Arc<dyn Embedder>, Arc<dyn PddlValidator>) {
    let reasoner: Arc<dyn Reasoner> = match &config.reasoner_url {
        Some(url) => Arc::new(HttpReasoner { client: reqwest::Client::new(), base_url: url.clone() }),
        None => Arc::new(NullReasoner),
    };
    let embedder: Arc<dyn Embedder> = match &config.embedder_url {
        Some(url) => Arc::new(HttpEmbedder { client: reqwest::Client::new(), base_url: url.clone() }),
        None => Arc::new(NullEmbedder),
    };
    let pddl: Arc<dyn PddlValidator> = match &config.pddl_validator_url {
        Some(url) => Arc::new(HttpPddlValidator { client: reqwest::Client::new(), base_url: url.clone() }),
        None => Arc::new(NullPddlValidator),
    };
    (reasoner, embedder, pddl)
}

#[async_trait]
impl Reasoner for Arc<dyn Reasoner> {
    async fn generate(&self, prompt: &str) -> Result<String, ReasonerError> {
        self.as_ref().generate(prompt).await
    }
}

#[async_trait]
impl Embedder for Arc<dyn Embedder> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        self.as_ref().embed(text).await
    }
}

#[async_trait]
impl PddlValidator for Arc<dyn PddlValidator> {
    async fn validate(&self, domain: &str, problem: &str) -> Result<(), PddlError> {
        self.as_ref().validate(domain, problem).await
    }
}

struct HttpReasoner {
    client: reqwest::Client,
    base_url: String,
}

#[derive(serde::Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
}

#[derive(serde::Deserialize)]
struct GenerateResponse {
    response: String,
}

#[async_trait]
impl Reasoner for HttpReasoner {
    async fn generate(&self, prompt: &str) -> Result<String, ReasonerError> {
        let response = self
            .client
            .post(format!("{}/generate", self.base_url))
            .json(&GenerateRequest { prompt })
            .send()
            .await
            .map_err(|e| ReasonerError::CallFailed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ReasonerError::CallFailed(format!("reasoner responded with status {}", response.status())));
        }
        let body: GenerateResponse = response.json().await.map_err(|e| ReasonerError::CallFailed(e.to_string()))?;
        Ok(body.response)
    }
}

struct HttpEmbedder {
    client: reqwest::Client,
    base_url: String,
}

#[derive(serde::Serialize)]
struct EmbedRequest<'a> {
    text: &'a str,
}

#[derive(serde::Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let response = self
            .client
            .post(format!("{}/embed", self.base_url))
            .json(&EmbedRequest { text })
            .send()
            .await
            .map_err(|e| EmbedderError::CallFailed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(EmbedderError::CallFailed(format!("embedder responded with status {}", response.status())));
        }
        let body: EmbedResponse = response.json().await.map_err(|e| EmbedderError::CallFailed(e.to_string()))?;
        Ok(body.embedding)
    }
}

struct HttpPddlValidator {
    client: reqwest::Client,
    base_url: String,
}

#[derive(serde::Serialize)]
struct ValidateRequest<'a> {
    domain: &'a str,
    problem: &'a str,
}

#[async_trait]
impl PddlValidator for HttpPddlValidator {
    async fn validate(&self, domain: &str, problem: &str) -> Result<(), PddlError> {
        let response = self
            .client
            .post(format!("{}/validate", self.base_url))
            .json(&ValidateRequest { domain, problem })
            .send()
            .await
            .map_err(|e| PddlError::Invalid(e.to_string()))?;
        if !response.status().is_success() {
            return Err(PddlError::Invalid(format!("validator responded with status {}", response.status())));
        }
        Ok(())
    }
}

struct NullReasoner;

#[async_trait]
impl Reasoner for NullReasoner {
    async fn generate(&self, _prompt: &str) -> Result<String, ReasonerError> {
        Err(ReasonerError::CallFailed("no reasoner configured".to_string()))
    }
}

struct NullEmbedder;

#[async_trait]
impl Embedder for NullEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedderError> {
        Err(EmbedderError::CallFailed("no embedder configured".to_string()))
    }
}

struct NullPddlValidator;

#[async_trait]
impl PddlValidator for NullPddlValidator {
    async fn validate(&self, _domain: &str, _problem: &str) -> Result<(), PddlError> {
        Err(PddlError::Invalid("no pddl validator configured".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_reasoner_rejects_every_request() {
        let reasoner = NullReasoner;
        assert!(reasoner.generate("plan a refund").await.is_err());
    }

    #[tokio::test]
    async fn null_embedder_rejects_every_request() {
        let embedder = NullEmbedder;
        assert!(embedder.embed("refund order").await.is_err());
    }

    #[tokio::test]
    async fn null_pddl_validator_rejects_every_request() {
        let validator = NullPddlValidator;
        assert!(validator.validate("(define (domain d))", "(define (problem p))").await.is_err());
    }

    #[test]
    fn build_chooses_null_adapters_when_urls_are_unset() {
        let config = Config::default();
        let (_reasoner, _embedder, _pddl) = build(&config);
    }
}
