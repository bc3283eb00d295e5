/*!
 * Retry/backoff computation
 *
 * The orchestrator never blocks a thread waiting to retry: a failed
 * chunk is re-enqueued with an absolute `retry_after` timestamp, and the
 * admission loop defers it until that time arrives. This module only
 * computes the delay.
 */

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base_secs: u64,
    pub multiplier: f64,
    pub max_delay_secs: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_secs: 2,
            multiplier: 2.0,
            max_delay_secs: 300,
        }
    }
}

impl BackoffPolicy {
    /// `delay = min(max_delay, base * multiplier^(retry_count - 1))`.
    /// `retry_count` is the count *after* incrementing for this failure,
    /// so the first retry (retry_count == 1) waits exactly `base_secs`.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        debug_assert!(retry_count >= 1);
        let exponent = (retry_count - 1) as i32;
        let scaled = self.base_secs as f64 * self.multiplier.powi(exponent);
        let capped = scaled.min(self.max_delay_secs as f64);
        Duration::from_secs_f64(capped)
    }

    pub fn retry_after(&self, retry_count: u32, now: Instant) -> Instant {
        now + self.delay_for(retry_count)
    }
}

/// Outcome of evaluating a chunk's completion against its retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAt,
    GiveUp,
}

pub fn decide(retry_count: u32, max_retries: u32) -> RetryDecision {
    if retry_count < max_retries {
        RetryDecision::RetryAt
    } else {
        RetryDecision::GiveUp
    }
}
