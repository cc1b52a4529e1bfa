//! Instrumented cache with hit-ratio driven TTL tuning.

use super::config_cache::ConfigCache;
use crate::config::CacheConfig;
use crate::constants::ttl_tuning;
use crate::models::McpConfig;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Nudges a TTL up when the hit ratio is high and down when it is low,
/// clamped to `[base / 4, base * 4]`.
#[derive(Debug, Clone, PartialEq)]
pub struct TtlOptimizer {
    pub min_ttl: Duration,
    pub max_ttl: Duration,
    pub high_hit_ratio: f64,
    pub low_hit_ratio: f64,
    pub step: f64,
}

impl TtlOptimizer {
    pub fn for_base_ttl(base: Duration) -> Self {
        Self {
            min_ttl: base / ttl_tuning::MIN_DIVISOR,
            max_ttl: base * ttl_tuning::MAX_MULTIPLIER,
            high_hit_ratio: ttl_tuning::HIGH_HIT_RATIO,
            low_hit_ratio: ttl_tuning::LOW_HIT_RATIO,
            step: ttl_tuning::STEP,
        }
    }

    pub fn next_ttl(&self, current: Duration, hit_ratio: f64) -> Duration {
        let proposed = if hit_ratio > self.high_hit_ratio {
            current.mul_f64(1.0 + self.step)
        } else if hit_ratio < self.low_hit_ratio {
            current.mul_f64(1.0 - self.step)
        } else {
            current
        };
        proposed.clamp(self.min_ttl, self.max_ttl)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EnhancedCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub total_operations: u64,
    pub hit_ratio: f64,
    pub entries: usize,
    #[serde(serialize_with = "serialize_millis")]
    pub ttl: Duration,
}

fn serialize_millis<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
}

/// [`ConfigCache`] plus hit/miss accounting and a TTL optimizer
#[derive(Debug)]
pub struct EnhancedConfigCache {
    cache: ConfigCache,
    optimizer: TtlOptimizer,
    hits: AtomicU64,
    misses: AtomicU64,
    total_operations: AtomicU64,
}

impl EnhancedConfigCache {
    pub fn new(ttl: Duration, max_size: usize, lru_enabled: bool) -> Self {
        Self {
            cache: ConfigCache::new(ttl, max_size, lru_enabled),
            optimizer: TtlOptimizer::for_base_ttl(ttl),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            total_operations: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.ttl(), config.max_size, config.enable_lru)
    }

    pub fn get(&self, key: &str) -> Option<Arc<McpConfig>> {
        self.total_operations.fetch_add(1, Ordering::Relaxed);
        let found = self.cache.get(key);
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    pub fn set(&self, key: &str, config: Arc<McpConfig>) {
        self.total_operations.fetch_add(1, Ordering::Relaxed);
        self.cache.set(key, config);
    }

    pub fn delete(&self, key: &str) -> bool {
        self.cache.delete(key)
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    pub fn ttl(&self) -> Duration {
        self.cache.ttl()
    }

    /// Hits over lookups; zero before the first lookup
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let lookups = hits + self.misses.load(Ordering::Relaxed);
        if lookups == 0 {
            0.0
        } else {
            hits as f64 / lookups as f64
        }
    }

    /// Retune the TTL from the observed hit ratio. Returns the new TTL when it changed.
    pub fn optimize_ttl(&self) -> Option<Duration> {
        let lookups = self.hits.load(Ordering::Relaxed) + self.misses.load(Ordering::Relaxed);
        if lookups == 0 {
            return None;
        }

        let ratio = self.hit_ratio();
        let current = self.cache.ttl();
        let next = self.optimizer.next_ttl(current, ratio);
        if next == current {
            debug!(hit_ratio = ratio, ttl_ms = current.as_millis() as u64, "Cache TTL unchanged");
            return None;
        }

        self.cache.set_ttl(next);
        info!(
            hit_ratio = ratio,
            old_ttl_ms = current.as_millis() as u64,
            new_ttl_ms = next.as_millis() as u64,
            "📈 Cache TTL retuned"
        );
        Some(next)
    }

    pub fn stats(&self) -> EnhancedCacheStats {
        let inner = self.cache.stats();
        EnhancedCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: inner.evictions,
            total_operations: self.total_operations.load(Ordering::Relaxed),
            hit_ratio: self.hit_ratio(),
            entries: inner.entries,
            ttl: self.cache.ttl(),
        }
    }
}
