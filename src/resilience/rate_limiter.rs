//! Token-bucket rate limiter.

use crate::config::RateLimiterConfig;
use parking_lot::Mutex;
use std::time::Instant;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket with fixed capacity and refill rate (tokens per second).
/// Starts full.
#[derive(Debug)]
pub struct RateLimiter {
    capacity: f64,
    refill_rate: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(capacity: u32, refill_rate: f64) -> Self {
        let capacity = f64::from(capacity);
        Self {
            capacity,
            refill_rate: refill_rate.max(0.0),
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn from_config(config: &RateLimiterConfig) -> Self {
        Self::new(config.capacity, config.refill_rate)
    }

    /// Admit one operation if a token is available
    pub fn allow(&self) -> bool {
        self.allow_at(Instant::now())
    }

    pub(crate) fn allow_at(&self, now: Instant) -> bool {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket, now);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Tokens currently in the bucket, after refilling
    pub fn available_tokens(&self) -> f64 {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket, Instant::now());
        bucket.tokens
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    fn refill(&self, bucket: &mut Bucket, now: Instant) {
        // Clock readings older than the last refill add nothing
        if now <= bucket.last_refill {
            return;
        }
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_rate).min(self.capacity);
        bucket.last_refill = now;
    }
}
