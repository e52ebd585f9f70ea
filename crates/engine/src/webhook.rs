// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Webhook delivery (§6): a single POST of the final orchestration result,
//! 10 s timeout, no retry — failure is reported to the caller so
//! `FinalizeOrchestration` can decide how to react (§4.9's `skipWebhook`
//! loop-avoidance path).

use async_trait::async_trait;
use orra_wire::WebhookPayload;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("webhook delivery failed: {0}")]
    DeliveryFailed(String),
    #[error("webhook responded with status {0}")]
    BadStatus(u16),
}

#[async_trait]
pub trait WebhookDispatcher: Send + Sync {
    async fn dispatch(&self, url: &str, payload: &WebhookPayload) -> Result<(), WebhookError>;
}

pub struct ReqwestWebhookDispatcher {
    client: reqwest::Client,
}

impl ReqwestWebhookDispatcher {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client with a fixed timeout always builds");
        Self { client }
    }
}

#[async_trait]
impl WebhookDispatcher for ReqwestWebhookDispatcher {
    async fn dispatch(&self, url: &str, payload: &WebhookPayload) -> Result<(), WebhookError> {
        let response = self
            .client
            .post(url)
            .header("User-Agent", orra_wire::WEBHOOK_USER_AGENT)
            .json(payload)
            .send()
            .await
            .map_err(|e| WebhookError::DeliveryFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(WebhookError::BadStatus(response.status().as_u16()));
        }
        Ok(())
    }
}
