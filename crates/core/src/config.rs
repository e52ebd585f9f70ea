// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-plane configuration. Defaults mirror the constants named
//! throughout the design (§3-§5); every field is overridable from a TOML
//! file or environment for operators who need to tune retry/health timings.

use serde::{Deserialize, Serialize};
use std::time::Duration;

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP/WS API binds to.
    pub bind_addr: String,

    /// Default per-task timeout when an orchestration doesn't specify one.
    #[serde(with = "duration_secs")]
    pub default_task_timeout: Duration,

    /// Default health-check grace period before a paused orchestration is
    /// permanently failed.
    #[serde(with = "duration_secs")]
    pub default_health_check_grace_period: Duration,

    /// How long an idempotency-store execution may sit before TTL cleanup.
    #[serde(with = "duration_secs")]
    pub idempotency_ttl: Duration,

    /// Lease duration granted to a fresh execution attempt.
    #[serde(with = "duration_secs")]
    pub lease_duration: Duration,

    /// Plan cache capacity per project (FIFO eviction beyond this).
    pub plan_cache_capacity: usize,

    /// Plan cache entry time-to-live.
    #[serde(with = "duration_secs")]
    pub plan_cache_ttl: Duration,

    /// Minimum cosine similarity for a plan cache hit.
    pub plan_cache_threshold: f32,

    /// Cosine similarity at or above which the cache scan early-exits.
    pub plan_cache_early_exit: f32,

    /// Minimum embedding similarity for a grounding use-case match.
    pub grounding_match_threshold: f32,

    /// WebSocket ping interval.
    #[serde(with = "duration_millis")]
    pub ping_interval: Duration,

    /// Maximum time to wait for a pong before marking a service unhealthy.
    #[serde(with = "duration_millis")]
    pub pong_wait: Duration,

    /// Maximum accepted WebSocket frame size, in bytes.
    pub max_frame_bytes: usize,

    /// WebSocket write deadline.
    #[serde(with = "duration_secs")]
    pub write_deadline: Duration,

    /// Interval at which workers poll the log / idempotency store.
    #[serde(with = "duration_millis")]
    pub poll_interval: Duration,

    /// Webhook delivery timeout.
    #[serde(with = "duration_secs")]
    pub webhook_timeout: Duration,

    /// Maximum consecutive task retries before permanent failure.
    pub max_task_retries: u32,

    /// Maximum compensation attempts before `compensation_failure`.
    pub max_compensation_attempts: u32,

    /// Base URL of an HTTP-backed reasoner collaborator. `None` runs with a
    /// fail-closed stub that rejects every planning request.
    pub reasoner_url: Option<String>,

    /// Base URL of an HTTP-backed embedder collaborator.
    pub embedder_url: Option<String>,

    /// Base URL of an HTTP-backed PDDL validator collaborator.
    pub pddl_validator_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8070".to_string(),
            default_task_timeout: secs(30),
            default_health_check_grace_period: secs(30 * 60),
            idempotency_ttl: secs(24 * 60 * 60),
            lease_duration: secs(30),
            plan_cache_capacity: 512,
            plan_cache_ttl: secs(24 * 60 * 60),
            plan_cache_threshold: 0.95,
            plan_cache_early_exit: 0.999,
            grounding_match_threshold: 0.85,
            ping_interval: millis(20_000),
            pong_wait: millis(25_000),
            max_frame_bytes: 10 * 1024,
            write_deadline: secs(120),
            poll_interval: millis(100),
            webhook_timeout: secs(10),
            max_task_retries: 3,
            max_compensation_attempts: 10,
            reasoner_url: None,
            embedder_url: None,
            pddl_validator_url: None,
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let cfg = Config::default();
        assert_eq!(cfg.default_task_timeout, Duration::from_secs(30));
        assert_eq!(cfg.lease_duration, Duration::from_secs(30));
        assert_eq!(cfg.max_task_retries, 3);
        assert_eq!(cfg.max_compensation_attempts, 10);
        assert_eq!(cfg.plan_cache_threshold, 0.95);
    }

    #[test]
    fn roundtrips_through_toml() {
        let cfg = Config::default();
        let toml_str = toml::to_string(&cfg).expect("serialize");
        let parsed: Config = toml::from_str(&toml_str).expect("parse");
        assert_eq!(parsed.bind_addr, cfg.bind_addr);
        assert_eq!(parsed.ping_interval, cfg.ping_interval);
    }
}
