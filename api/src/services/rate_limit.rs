//! Per-user rate limiting for the generation endpoints
//!
//! Token bucket per user id, kept in memory. Tokens refill over time.

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex, PoisonError};
use std::time::{Duration, Instant};

use uuid::Uuid;

/// Rate limiter configuration
pub struct RateLimitConfig {
    /// Maximum tokens (burst capacity)
    pub max_tokens: u32,
    /// Tokens added per second
    pub refill_rate: f64,
}

struct UserBucket {
    tokens: f64,
    last_update: Instant,
}

pub struct UserRateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<Uuid, UserBucket>>,
}

impl UserRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Returns true if allowed, false if rate limited.
    pub fn check(&self, user_id: Uuid) -> bool {
        self.check_at(user_id, Instant::now())
    }

    fn check_at(&self, user_id: Uuid, now: Instant) -> bool {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);

        let max = f64::from(self.config.max_tokens);
        let bucket = buckets.entry(user_id).or_insert_with(|| UserBucket {
            tokens: max,
            last_update: now,
        });

        let elapsed = now.saturating_duration_since(bucket.last_update);
        bucket.tokens = (bucket.tokens + elapsed.as_secs_f64() * self.config.refill_rate).min(max);
        bucket.last_update = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Drop buckets idle for longer than `max_age`.
    pub fn cleanup(&self, max_age: Duration) {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        buckets.retain(|_, bucket| now.saturating_duration_since(bucket.last_update) < max_age);
    }
}

/// Summary, podcast, presentation and test generation.
/// Burst of 10, then one request every 6 seconds.
pub static GENERATION_RATE_LIMITER: LazyLock<UserRateLimiter> = LazyLock::new(|| {
    UserRateLimiter::new(RateLimitConfig {
        max_tokens: 10,
        refill_rate: 1.0 / 6.0,
    })
});
