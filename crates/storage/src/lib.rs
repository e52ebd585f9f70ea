// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! orra-storage: in-process, lock-guarded storage for the Orra control
//! plane — the append-only per-orchestration log, the idempotency & lease
//! store, the service/project registries, and the embedding-indexed plan
//! cache. The durable store is an external collaborator reached only
//! through the [`durable::DurableStore`] trait.

pub mod durable;
pub mod idempotency;
pub mod log;
pub mod plan_cache;
pub mod registry;

pub use durable::{DurableError, DurableStore, InMemoryDurableStore};
pub use idempotency::{IdempotencyError, IdempotencyStore};
pub use log::{Log, LogStore};
pub use plan_cache::{CacheEntry, CacheHit, PlanCache, SharedPlanCache};
pub use registry::{ProjectRegistry, RegisterOutcome, ServiceRegistry};
