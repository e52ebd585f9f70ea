// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The append-only per-orchestration log (§4.1). The sole coordination
//! primitive between workers — they never talk to each other directly.

use orra_core::{Clock, LogEntry, OrchestrationId};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

struct Inner {
    entries: Vec<LogEntry>,
    seen_ids: HashSet<String>,
    next_offset: u64,
    last_accessed_ms: u64,
}

/// Append-only sequence of entries for a single orchestration. Cheaply
/// cloneable (shares an `Arc` with its siblings) so every worker can hold
/// its own handle.
#[derive(Clone)]
pub struct Log {
    inner: Arc<RwLock<Inner>>,
}

impl Log {
    pub fn new(now_ms: u64) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                entries: Vec::new(),
                seen_ids: HashSet::new(),
                next_offset: 0,
                last_accessed_ms: now_ms,
            })),
        }
    }

    /// Append `entry`. No-op if `entry.id` has already been appended —
    /// the entry's assigned offset (old or new) is always returned so
    /// callers can log it without caring which case fired.
    pub fn append(&self, mut entry: LogEntry, now_ms: u64) -> u64 {
        let mut inner = self.inner.write();
        if let Some(existing) = inner.entries.iter().find(|e| e.id == entry.id) {
            return existing.offset;
        }
        let offset = inner.next_offset;
        entry.offset = offset;
        inner.next_offset += 1;
        inner.last_accessed_ms = now_ms;
        inner.seen_ids.insert(entry.id.clone());
        inner.entries.push(entry);
        offset
    }

    /// Defensive copy of every entry with `offset >= from`.
    pub fn read_from(&self, from: u64) -> Vec<LogEntry> {
        let inner = self.inner.read();
        inner.entries.iter().filter(|e| e.offset >= from).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last_accessed_ms(&self) -> u64 {
        self.inner.read().last_accessed_ms
    }
}

/// `orchestrationId -> Log` registry owned by the Log Manager.
#[derive(Clone)]
pub struct LogStore<C: Clock> {
    logs: Arc<RwLock<HashMap<OrchestrationId, Log>>>,
    clock: C,
}

impl<C: Clock> LogStore<C> {
    pub fn new(clock: C) -> Self {
        Self { logs: Arc::new(RwLock::new(HashMap::new())), clock }
    }

    pub fn get_or_create(&self, orchestration_id: OrchestrationId) -> Log {
        if let Some(log) = self.logs.read().get(&orchestration_id) {
            return log.clone();
        }
        let mut logs = self.logs.write();
        logs.entry(orchestration_id)
            .or_insert_with(|| Log::new(self.clock.epoch_ms()))
            .clone()
    }

    pub fn get(&self, orchestration_id: &OrchestrationId) -> Option<Log> {
        self.logs.read().get(orchestration_id).cloned()
    }

    pub fn remove(&self, orchestration_id: &OrchestrationId) {
        self.logs.write().remove(orchestration_id);
    }
}
