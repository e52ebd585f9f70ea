// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The embedding-indexed plan cache (§4.5). Keyed per project by
//! `servicesHash` so a cached plan can never be served against a different
//! set of registered services; within a `servicesHash` bucket, entries are
//! matched by cosine similarity against the requested action's embedding.

use orra_core::{ExecutionPlan, ProjectId};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub id: String,
    pub services_hash: String,
    pub action: String,
    pub embedding: Vec<f32>,
    pub plan: ExecutionPlan,
    /// Maps a placeholder in the cached plan's inputs to the field path in
    /// the new request's action/params that should replace it on a hit.
    pub cache_mappings: HashMap<String, String>,
    pub created_at_ms: u64,
    pub last_hit_ms: u64,
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

pub struct CacheHit {
    pub entry: CacheEntry,
    pub similarity: f32,
}

#[derive(Default)]
struct ProjectCache {
    /// Insertion order preserved for FIFO eviction.
    entries: Vec<CacheEntry>,
}

/// Per-project, embedding-indexed execution plan cache with FIFO eviction
/// and a single-flight gate per `(projectId, action)`.
pub struct PlanCache {
    projects: RwLock<HashMap<ProjectId, ProjectCache>>,
    in_flight: Mutex<HashSet<(ProjectId, String)>>,
    capacity_per_project: usize,
    ttl: Duration,
    hit_threshold: f32,
    early_exit: f32,
}

impl PlanCache {
    pub fn new(capacity_per_project: usize, ttl: Duration, hit_threshold: f32, early_exit: f32) -> Self {
        Self {
            projects: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
            capacity_per_project,
            ttl,
            hit_threshold,
            early_exit,
        }
    }

    /// Scans the `services_hash` bucket for the best cosine-similarity match
    /// to `embedding`, early-exiting on the first entry at or above
    /// `early_exit`. Entries past their TTL are ignored (and lazily dropped).
    pub fn lookup(
        &self,
        project_id: ProjectId,
        services_hash: &str,
        embedding: &[f32],
        now_ms: u64,
    ) -> Option<CacheHit> {
        let mut projects = self.projects.write();
        let cache = projects.entry(project_id).or_default();
        cache.entries.retain(|e| now_ms.saturating_sub(e.created_at_ms) < self.ttl.as_millis() as u64);

        let mut best: Option<(usize, f32)> = None;
        for (idx, entry) in cache.entries.iter().enumerate() {
            if entry.services_hash != services_hash {
                continue;
            }
            let sim = cosine_similarity(&entry.embedding, embedding);
            if sim >= self.early_exit {
                let mut hit_entry = entry.clone();
                hit_entry.last_hit_ms = now_ms;
                cache.entries[idx].last_hit_ms = now_ms;
                return Some(CacheHit { entry: hit_entry, similarity: sim });
            }
            if best.map(|(_, best_sim)| sim > best_sim).unwrap_or(true) {
                best = Some((idx, sim));
            }
        }

        let (idx, sim) = best?;
        if sim < self.hit_threshold {
            return None;
        }
        cache.entries[idx].last_hit_ms = now_ms;
        Some(CacheHit { entry: cache.entries[idx].clone(), similarity: sim })
    }

    /// Inserts a fresh entry, evicting the oldest entry in the project's
    /// bucket (FIFO) if it is already at capacity.
    pub fn insert(&self, project_id: ProjectId, entry: CacheEntry) {
        let mut projects = self.projects.write();
        let cache = projects.entry(project_id).or_default();
        if cache.entries.len() >= self.capacity_per_project {
            cache.entries.remove(0);
        }
        cache.entries.push(entry);
    }

    /// Explicit invalidation by entry id, used when a forced remap makes a
    /// cached plan unusable going forward.
    pub fn invalidate(&self, project_id: ProjectId, entry_id: &str) -> bool {
        let mut projects = self.projects.write();
        let Some(cache) = projects.get_mut(&project_id) else { return false };
        let before = cache.entries.len();
        cache.entries.retain(|e| e.id != entry_id);
        cache.entries.len() != before
    }

    /// Sweeps every project's bucket for TTL-expired entries. Intended to
    /// run on a `ttl / 2` interval.
    pub fn cleanup_expired(&self, now_ms: u64) -> usize {
        let ttl_ms = self.ttl.as_millis() as u64;
        let mut projects = self.projects.write();
        let mut removed = 0;
        for cache in projects.values_mut() {
            let before = cache.entries.len();
            cache.entries.retain(|e| now_ms.saturating_sub(e.created_at_ms) < ttl_ms);
            removed += before - cache.entries.len();
        }
        removed
    }

    /// Attempts to acquire the single-flight gate for `(project_id, action)`.
    /// Returns `true` if this caller now holds it (must call `release` when
    /// done); `false` if another caller already holds it.
    pub fn try_acquire(&self, project_id: ProjectId, action: &str) -> bool {
        self.in_flight.lock().insert((project_id, action.to_string()))
    }

    pub fn release(&self, project_id: ProjectId, action: &str) {
        self.in_flight.lock().remove(&(project_id, action.to_string()));
    }

    pub fn len(&self, project_id: ProjectId) -> usize {
        self.projects.read().get(&project_id).map(|c| c.entries.len()).unwrap_or(0)
    }
}

pub type SharedPlanCache = Arc<PlanCache>;
