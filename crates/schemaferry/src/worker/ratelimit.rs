//! Token-bucket rate limiting for external calls
//!
//! Three independent buckets (source registry, target registry, LLM) so
//! the three provider quotas never starve each other. Burst is 1: permits
//! are spaced evenly at the configured rate. Acquisition blocks
//! cooperatively and observes cancellation.

use crate::error::{MigrateError, MigrateResult};
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A token bucket with burst 1: at `rate` tokens/sec, permits are handed
/// out at most every `1/rate` seconds
pub struct RateLimiter {
    /// Minimum spacing between permits; zero means unlimited
    interval: Duration,
    /// Next instant a permit may be issued
    next_permit: Mutex<Instant>,
}

impl RateLimiter {
    /// `rate` is tokens per second; 0 disables limiting
    pub fn new(rate: u32) -> Self {
        let interval = if rate == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(1.0 / rate as f64)
        };
        Self {
            interval,
            next_permit: Mutex::new(Instant::now()),
        }
    }

    /// Acquire one token, waiting as needed; returns `Cancelled` if the run
    /// is cancelled while waiting
    pub async fn acquire(&self, cancel: &CancellationToken) -> MigrateResult<()> {
        if self.interval.is_zero() {
            return Ok(());
        }

        let slot = {
            let mut next = self.next_permit.lock();
            let now = Instant::now();
            let slot = if *next <= now { now } else { *next };
            *next = slot + self.interval;
            slot
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(MigrateError::Cancelled),
            _ = tokio::time::sleep_until(slot) => Ok(()),
        }
    }
}

/// The three buckets used by a migration run
pub struct RateLimiters {
    /// Source-registry calls (Glue)
    pub source: RateLimiter,
    /// Target-registry calls (Confluent Cloud)
    pub target: RateLimiter,
    /// LLM provider calls
    pub llm: RateLimiter,
}

impl RateLimiters {
    pub fn new(source_rate: u32, target_rate: u32, llm_rate: u32) -> Self {
        Self {
            source: RateLimiter::new(source_rate),
            target: RateLimiter::new(target_rate),
            llm: RateLimiter::new(llm_rate),
        }
    }
}
