// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The durable store boundary (§1, §6). Orra's control plane is an
//! in-memory system of record backed by an external durable key-value
//! store for crash recovery; this crate only defines the trait interface
//! and the key format callers must use, plus an in-memory double for tests.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DurableError {
    #[error("durable store unavailable: {0}")]
    Unavailable(String),
}

/// External collaborator: a durable, crash-surviving key-value store.
/// Orra's own storage crate holds the authoritative in-memory state; this
/// trait exists so a real backend can be plugged in for recovery without
/// any other crate depending on its implementation.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, DurableError>;
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), DurableError>;
    async fn delete(&self, key: &str) -> Result<(), DurableError>;
    /// Keys with the given prefix, in lexicographic order.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, DurableError>;
}

pub mod keys {
    pub fn orchestration_state(orchestration_id: &str) -> String {
        format!("orchestration:{orchestration_id}:state")
    }

    /// Zero-padded to 20 digits so lexicographic and numeric order agree.
    pub fn orchestration_entry(orchestration_id: &str, offset: u64) -> String {
        format!("orchestration:{orchestration_id}:entry:{offset:020}")
    }

    pub fn orchestration_entry_prefix(orchestration_id: &str) -> String {
        format!("orchestration:{orchestration_id}:entry:")
    }

    pub fn project(project_id: &str) -> String {
        format!("project:{project_id}")
    }

    pub fn api_key(key: &str) -> String {
        format!("apikey:{key}")
    }

    pub fn service_info(service_id: &str) -> String {
        format!("service:info:{service_id}")
    }

    pub fn service_project(project_id: &str, service_id: &str) -> String {
        format!("service:project:{project_id}:{service_id}")
    }

    pub fn grounding_info(project_id: &str, name: &str) -> String {
        format!("grounding:info:{project_id}:{name}")
    }

    pub fn grounding_project(project_id: &str, name: &str) -> String {
        format!("grounding:project:{project_id}:{name}")
    }
}

/// In-memory `DurableStore` double, for tests and for running without a
/// real backend configured.
#[derive(Clone, Default)]
pub struct InMemoryDurableStore {
    data: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl InMemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableStore for InMemoryDurableStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, DurableError> {
        Ok(self.data.read().get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), DurableError> {
        self.data.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), DurableError> {
        self.data.write().remove(key);
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, DurableError> {
        let ordered: BTreeMap<String, Vec<u8>> = self.data.read().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        Ok(ordered.range(prefix.to_string()..).take_while(|(k, _)| k.starts_with(prefix)).map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = InMemoryDurableStore::new();
        store.put("project:prj-1", b"payload".to_vec()).await.expect("put");
        let value = store.get("project:prj-1").await.expect("get");
        assert_eq!(value, Some(b"payload".to_vec()));
    }

    #[tokio::test]
    async fn scan_prefix_returns_matching_keys_in_order() {
        let store = InMemoryDurableStore::new();
        store.put(&keys::orchestration_entry("orc-1", 2), b"c".to_vec()).await.unwrap();
        store.put(&keys::orchestration_entry("orc-1", 0), b"a".to_vec()).await.unwrap();
        store.put(&keys::orchestration_entry("orc-1", 1), b"b".to_vec()).await.unwrap();
        store.put(&keys::project("prj-1"), b"other".to_vec()).await.unwrap();

        let entries = store.scan_prefix(&keys::orchestration_entry_prefix("orc-1")).await.expect("scan");
        let values: Vec<u8> = entries.iter().map(|(_, v)| v[0]).collect();
        assert_eq!(values, vec![b'a', b'b', b'c']);
    }

    #[tokio::test]
    async fn delete_removes_key() {
        let store = InMemoryDurableStore::new();
        store.put("k", b"v".to_vec()).await.unwrap();
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
