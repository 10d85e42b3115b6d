//! Rate Limiter
//!
//! Sliding-window counts per `(subject, operation)` kept as scored members
//! in the cache adapter's rate-limit slot. The window is pruned and counted
//! on every decision; the timestamp is appended only when the request is
//! allowed, so a denied request never consumes quota.
//!
//! Fail-closed by default: when the control store is unreachable the
//! decision is a 503-flavoured `RateLimited` error unless
//! `RATE_LIMIT_FAIL_OPEN=true`, in which case the request passes with a
//! bypass header.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::cache::CacheStore;
use crate::config::{Config, RateLimitTier};
use crate::error::{Result, VesperError};

/// Sliding window width
const WINDOW: Duration = Duration::from_secs(60);

/// Retry hint when the control store is unreachable
const STORE_DOWN_RETRY: Duration = Duration::from_secs(5);

/// Write operations get the lower per-tier limit
const WRITE_OPS: &[&str] = &[
    "store_memory",
    "delete_memory",
    "share_context",
    "store_decision",
    "record_skill_outcome",
];

/// A rate-limit decision with the headers to surface
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Unix seconds when the window frees up
    pub reset_at: i64,
    pub headers: Vec<(String, String)>,
}

/// Sliding-window limiter over the cache adapter
pub struct RateLimiter {
    cache: Arc<dyn CacheStore>,
    tier: RateLimitTier,
    fail_open: bool,
}

fn counter_key(subject: &str, operation: &str) -> String {
    format!("rl:{subject}:{operation}")
}

impl RateLimiter {
    pub fn new(cache: Arc<dyn CacheStore>, config: &Config) -> Self {
        Self {
            cache,
            tier: config.rate_limit_tier,
            fail_open: config.rate_limit_fail_open,
        }
    }

    /// Per-operation limit for the configured tier, environment override
    /// (`RATE_LIMIT_<OP>`) first
    pub fn limit_for(&self, operation: &str) -> u32 {
        if let Some(value) = Config::rate_limit_override(operation) {
            return value;
        }
        let is_write = WRITE_OPS.contains(&operation);
        match self.tier {
            RateLimitTier::Standard => {
                if is_write {
                    100
                } else {
                    300
                }
            }
            RateLimitTier::Premium => {
                if is_write {
                    500
                } else {
                    1000
                }
            }
            RateLimitTier::Unlimited => 1_000_000,
        }
    }

    /// Decide whether `subject` may run `operation` now. Exhausted windows
    /// return `allowed = false`; only an unreachable control store raises.
    pub async fn check_limit(&self, subject: &str, operation: &str) -> Result<RateLimitDecision> {
        let limit = self.limit_for(operation);
        match self.sliding_window(subject, operation, limit).await {
            Ok(decision) => Ok(decision),
            Err(err @ (VesperError::Cache(_) | VesperError::Timeout(..))) => {
                if self.fail_open {
                    tracing::warn!(%subject, operation, error = %err, "rate limiter bypassed (fail-open)");
                    Ok(RateLimitDecision {
                        allowed: true,
                        limit,
                        remaining: limit,
                        reset_at: Utc::now().timestamp() + WINDOW.as_secs() as i64,
                        headers: vec![
                            ("X-RateLimit-Limit".into(), limit.to_string()),
                            ("X-RateLimit-Remaining".into(), limit.to_string()),
                            ("X-RateLimit-Bypass".into(), "true".into()),
                        ],
                    })
                } else {
                    tracing::error!(%subject, operation, error = %err, "rate limiter store unreachable, failing closed");
                    Err(VesperError::RateLimited {
                        status_code: 503,
                        retry_after: STORE_DOWN_RETRY,
                        headers: vec![(
                            "Retry-After".into(),
                            STORE_DOWN_RETRY.as_secs().to_string(),
                        )],
                    })
                }
            }
            Err(other) => Err(other),
        }
    }

    async fn sliding_window(
        &self,
        subject: &str,
        operation: &str,
        limit: u32,
    ) -> Result<RateLimitDecision> {
        let key = counter_key(subject, operation);
        let now_ms = Utc::now().timestamp_millis();
        let window_ms = WINDOW.as_millis() as i64;
        let window_start = (now_ms - window_ms) as f64;

        self.cache.sorted_remove_below(&key, window_start).await?;
        let count = self
            .cache
            .sorted_count_range(&key, window_start, now_ms as f64)
            .await? as u32;

        if count >= limit {
            // Window frees when the oldest surviving entry ages out
            let oldest = self
                .cache
                .sorted_range_desc(&key, count as usize)
                .await?
                .last()
                .map(|(_, score)| *score as i64)
                .unwrap_or(now_ms);
            let reset_ms = oldest + window_ms;
            let retry_after =
                Duration::from_millis(((reset_ms - now_ms).max(1)) as u64);

            return Ok(RateLimitDecision {
                allowed: false,
                limit,
                remaining: 0,
                reset_at: reset_ms / 1000,
                headers: vec![
                    ("X-RateLimit-Limit".into(), limit.to_string()),
                    ("X-RateLimit-Remaining".into(), "0".into()),
                    ("X-RateLimit-Reset".into(), (reset_ms / 1000).to_string()),
                    ("Retry-After".into(), retry_after.as_secs().max(1).to_string()),
                ],
            });
        }

        // The append happens after the allowance decision; a request that
        // fails later never burns quota retroactively.
        let member = format!("{now_ms}-{}", Uuid::new_v4());
        self.cache.sorted_add(&key, &member, now_ms as f64).await?;
        self.cache.expire(&key, WINDOW).await?;

        let remaining = limit.saturating_sub(count + 1);
        let reset_at = (now_ms + window_ms) / 1000;
        Ok(RateLimitDecision {
            allowed: true,
            limit,
            remaining,
            reset_at,
            headers: vec![
                ("X-RateLimit-Limit".into(), limit.to_string()),
                ("X-RateLimit-Remaining".into(), remaining.to_string()),
                ("X-RateLimit-Reset".into(), reset_at.to_string()),
            ],
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
