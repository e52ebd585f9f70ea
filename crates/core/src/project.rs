// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project identity, API keys, and webhook registration.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

crate::define_id! {
    /// Unique identifier for a project.
    pub struct ProjectId("prj-");
}

/// A bearer token minted for a project. The primary key is generated at
/// registration; additional keys are minted via `POST /apikeys` and all
/// resolve to the same project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    pub key: String,
    pub project_id: ProjectId,
    pub label: Option<String>,
    pub created_at_ms: u64,
}

/// A webhook URL registered against a project. An orchestration's `webhook`
/// field must match one of a project's registered webhooks verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct Webhook {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub primary_api_key: String,
    pub additional_api_keys: Vec<ApiKey>,
    pub webhooks: HashSet<String>,
}

impl Project {
    pub fn new(primary_api_key: impl Into<String>) -> Self {
        Self {
            id: ProjectId::new(),
            primary_api_key: primary_api_key.into(),
            additional_api_keys: Vec::new(),
            webhooks: HashSet::new(),
        }
    }

    /// True if `key` is the primary key or one of the minted additional keys.
    pub fn owns_key(&self, key: &str) -> bool {
        self.primary_api_key == key || self.additional_api_keys.iter().any(|k| k.key == key)
    }

    pub fn add_webhook(&mut self, url: impl Into<String>) {
        self.webhooks.insert(url.into());
    }

    pub fn has_webhook(&self, url: &str) -> bool {
        self.webhooks.contains(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owns_key_matches_primary_and_additional() {
        let mut project = Project::new("primary-key");
        project.additional_api_keys.push(ApiKey {
            key: "extra-key".into(),
            project_id: project.id.clone(),
            label: Some("ci".into()),
            created_at_ms: 0,
        });
        assert!(project.owns_key("primary-key"));
        assert!(project.owns_key("extra-key"));
        assert!(!project.owns_key("unknown-key"));
    }

    #[test]
    fn webhook_must_be_registered() {
        let mut project = Project::new("k");
        project.add_webhook("https://example.com/hook");
        assert!(project.has_webhook("https://example.com/hook"));
        assert!(!project.has_webhook("https://evil.example.com/hook"));
    }
}
