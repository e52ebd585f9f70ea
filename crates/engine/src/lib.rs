// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! orra-engine: the execution substrate driving a submitted orchestration —
//! the planner, the per-task workers, the result aggregator, the failure
//! tracker, the compensation worker, and the health coordinator that pauses
//! and fails them in response to transport health. Everything here talks to
//! `orra-storage` and `orra-wire` through narrow traits so a worker only
//! ever sees the slice of state it needs.

pub mod aggregator;
pub mod backoff;
pub mod cancel;
pub mod compensation;
pub mod dependency;
pub mod embedder;
pub mod error;
pub mod failure_tracker;
pub mod health;
pub mod log_manager;
pub mod pddl;
pub mod planner;
pub mod reasoner;
pub mod task_worker;
pub mod transport;
pub mod webhook;

pub use aggregator::ResultAggregator;
pub use backoff::Backoff;
pub use cancel::{CancelRegistry, WorkerId};
pub use compensation::{CompensationCandidate, CompensationWorker, IdempotencyProvider};
pub use dependency::{resolve_task_input, DependencyState};
pub use embedder::{Embedder, EmbedderError};
pub use error::EngineError;
pub use failure_tracker::FailureTracker;
pub use health::{HealthCoordinator, HealthGate};
pub use log_manager::{LogAppender, LogReader, OrchestrationFinalizer, OrchestrationStore};
pub use pddl::PddlValidator;
pub use planner::{prepare, PlannerDeps, PreparedPlan};
pub use reasoner::{Reasoner, ReasonerError};
pub use task_worker::{TaskOutcome, TaskWorker, TaskWorkerConfig};
pub use transport::{DispatchError, TaskDispatch};
pub use webhook::{ReqwestWebhookDispatcher, WebhookDispatcher, WebhookError};
