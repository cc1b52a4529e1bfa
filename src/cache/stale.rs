//! Last-known-good configurations used when a live fetch fails.

use crate::config::ConfigSource;
use crate::models::McpConfig;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct StaleEntry {
    config: Arc<McpConfig>,
    stored_at: Instant,
}

/// Fallback cache keyed by `source:reference`.
///
/// Entries expire `max_age` after they were stored, independently of any
/// provider cache, which bounds how stale a fallback answer can be. Writes
/// sweep expired entries at most once per `max_age`.
#[derive(Debug)]
pub struct StaleCache {
    max_age: Duration,
    entries: DashMap<String, StaleEntry>,
    last_sweep: Mutex<Instant>,
}

impl StaleCache {
    pub fn new(max_age: Duration) -> Self {
        Self {
            max_age,
            entries: DashMap::new(),
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    pub fn key(source: &ConfigSource, config_ref: &str) -> String {
        format!("{source}:{config_ref}")
    }

    pub fn set(&self, source: &ConfigSource, config_ref: &str, config: Arc<McpConfig>) {
        self.sweep_if_due();
        self.entries.insert(
            Self::key(source, config_ref),
            StaleEntry {
                config,
                stored_at: Instant::now(),
            },
        );
    }

    /// The stored value if it is younger than `max_age`; expired entries are dropped
    pub fn get(&self, source: &ConfigSource, config_ref: &str) -> Option<Arc<McpConfig>> {
        let key = Self::key(source, config_ref);
        {
            let entry = self.entries.get(&key)?;
            if entry.stored_at.elapsed() <= self.max_age {
                return Some(Arc::clone(&entry.config));
            }
        }
        self.entries
            .remove_if(&key, |_, entry| entry.stored_at.elapsed() > self.max_age);
        None
    }

    pub fn remove(&self, source: &ConfigSource, config_ref: &str) -> bool {
        self.entries.remove(&Self::key(source, config_ref)).is_some()
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.stored_at.elapsed() <= self.max_age);
        before.saturating_sub(self.entries.len())
    }

    fn sweep_if_due(&self) {
        {
            let mut last_sweep = self.last_sweep.lock();
            if last_sweep.elapsed() < self.max_age {
                return;
            }
            *last_sweep = Instant::now();
        }
        let removed = self.purge_expired();
        if removed > 0 {
            tracing::debug!(removed, "Swept expired stale entries");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LoadBalanceMode, McpInstance};

    fn config() -> Arc<McpConfig> {
        Arc::new(
            McpConfig::new(
                vec![McpInstance::new("stale.example.com", 80, 10, 0)],
                LoadBalanceMode::Random,
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_keyed_by_source_and_reference() {
        let cache = StaleCache::new(Duration::from_secs(60));
        cache.set(&ConfigSource::ConfigMap, "routes", config());

        assert!(cache.get(&ConfigSource::ConfigMap, "routes").is_some());
        assert!(cache.get(&ConfigSource::Secret, "routes").is_none());
        assert_eq!(StaleCache::key(&ConfigSource::Secret, "x"), "secret:x");
    }

    #[test]
    fn test_expired_entries_are_not_served() {
        let cache = StaleCache::new(Duration::from_millis(20));
        cache.set(&ConfigSource::ConfigMap, "routes", config());
        std::thread::sleep(Duration::from_millis(40));

        assert!(cache.get(&ConfigSource::ConfigMap, "routes").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_purge_expired() {
        let cache = StaleCache::new(Duration::from_millis(20));
        cache.set(&ConfigSource::ConfigMap, "a", config());
        cache.set(&ConfigSource::ConfigMap, "b", config());
        std::thread::sleep(Duration::from_millis(40));

        assert_eq!(cache.purge_expired(), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_writes_sweep_unread_expired_entries() {
        let cache = StaleCache::new(Duration::from_millis(1));
        for i in 0..1_000 {
            cache.set(&ConfigSource::ConfigMap, &format!("ref-{i}"), config());
        }
        std::thread::sleep(Duration::from_millis(20));

        cache.set(&ConfigSource::Secret, "fresh", config());
        assert_eq!(cache.len(), 1);
        assert!(cache.remove(&ConfigSource::Secret, "fresh"));
    }
}
