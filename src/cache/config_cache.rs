//! LRU + TTL cache for resolved configurations.
//!
//! Recency is tracked in a `VecDeque` of keys (front = least recently used)
//! with a side index from key to position. Positions are stored as absolute
//! sequence numbers offset by `head`, so popping the LRU end never touches the
//! index and promoting a key only patches the entries behind it.

use crate::config::CacheConfig;
use crate::models::McpConfig;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

#[derive(Debug, Clone)]
struct CacheItem {
    config: Arc<McpConfig>,
    expires_at: Instant,
    accessed_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub evictions: u64,
    pub expirations: u64,
}

#[derive(Debug)]
struct CacheInner {
    items: HashMap<String, CacheItem>,
    order: VecDeque<String>,
    /// Absolute position of each key; `index[k] - head` is its offset in `order`
    index: HashMap<String, u64>,
    head: u64,
    ttl: Duration,
    evictions: u64,
    expirations: u64,
}

impl CacheInner {
    fn position(&self, key: &str) -> Option<usize> {
        self.index
            .get(key)
            .map(|absolute| (absolute - self.head) as usize)
    }

    fn push_back(&mut self, key: &str) {
        let absolute = self.head + self.order.len() as u64;
        self.order.push_back(key.to_string());
        self.index.insert(key.to_string(), absolute);
    }

    /// Splice `key` out of the ordering, patching every shifted position
    fn unlink(&mut self, key: &str) {
        let Some(position) = self.position(key) else {
            return;
        };
        self.index.remove(key);

        if position == 0 {
            self.order.pop_front();
            self.head += 1;
            return;
        }

        self.order.remove(position);
        for shifted in self.order.iter().skip(position) {
            if let Some(absolute) = self.index.get_mut(shifted) {
                *absolute -= 1;
            }
        }
    }

    fn promote(&mut self, key: &str) {
        if self.position(key) == Some(self.order.len().saturating_sub(1)) {
            return;
        }
        self.unlink(key);
        self.push_back(key);
    }

    fn remove(&mut self, key: &str) -> bool {
        self.unlink(key);
        self.items.remove(key).is_some()
    }

    fn pop_lru(&mut self) -> Option<String> {
        let key = self.order.pop_front()?;
        self.index.remove(&key);
        self.head += 1;
        self.items.remove(&key);
        Some(key)
    }
}

/// Thread-safe LRU + TTL cache keyed by configuration reference.
///
/// Expiry is lazy: an expired entry is purged when it is next read. With LRU
/// disabled, entries are evicted in insertion order and reads do not reorder.
#[derive(Debug)]
pub struct ConfigCache {
    max_size: usize,
    lru_enabled: bool,
    inner: Mutex<CacheInner>,
}

impl ConfigCache {
    /// `max_size` of zero leaves the cache unbounded
    pub fn new(ttl: Duration, max_size: usize, lru_enabled: bool) -> Self {
        Self {
            max_size,
            lru_enabled,
            inner: Mutex::new(CacheInner {
                items: HashMap::new(),
                order: VecDeque::new(),
                index: HashMap::new(),
                head: 0,
                ttl,
                evictions: 0,
                expirations: 0,
            }),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.ttl(), config.max_size, config.enable_lru)
    }

    pub fn get(&self, key: &str) -> Option<Arc<McpConfig>> {
        self.get_at(key, Instant::now())
    }

    pub(crate) fn get_at(&self, key: &str, now: Instant) -> Option<Arc<McpConfig>> {
        let mut inner = self.inner.lock();

        let expired = match inner.items.get_mut(key) {
            None => return None,
            Some(item) if now >= item.expires_at => true,
            Some(item) => {
                if self.lru_enabled {
                    item.accessed_at = now;
                }
                false
            }
        };

        if expired {
            trace!(key, "Cache entry expired");
            inner.remove(key);
            inner.expirations += 1;
            return None;
        }

        if self.lru_enabled {
            inner.promote(key);
        }
        inner.items.get(key).map(|item| Arc::clone(&item.config))
    }

    pub fn set(&self, key: &str, config: Arc<McpConfig>) {
        self.set_at(key, config, Instant::now());
    }

    pub(crate) fn set_at(&self, key: &str, config: Arc<McpConfig>, now: Instant) {
        let mut inner = self.inner.lock();
        let item = CacheItem {
            config,
            expires_at: now + inner.ttl,
            accessed_at: now,
        };

        let existed = inner.items.insert(key.to_string(), item).is_some();
        if !existed {
            inner.push_back(key);
        } else if self.lru_enabled {
            inner.promote(key);
        }

        while self.max_size > 0 && inner.items.len() > self.max_size {
            match inner.pop_lru() {
                Some(evicted) => {
                    trace!(key = %evicted, "Evicted least recently used entry");
                    inner.evictions += 1;
                }
                None => break,
            }
        }
    }

    pub fn delete(&self, key: &str) -> bool {
        self.inner.lock().remove(key)
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.items.clear();
        inner.order.clear();
        inner.index.clear();
        inner.head = 0;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ttl(&self) -> Duration {
        self.inner.lock().ttl
    }

    /// Applies to entries written after the change
    pub fn set_ttl(&self, ttl: Duration) {
        self.inner.lock().ttl = ttl;
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            entries: inner.items.len(),
            evictions: inner.evictions,
            expirations: inner.expirations,
        }
    }

    /// Keys from least to most recently used
    pub fn keys_by_recency(&self) -> Vec<String> {
        self.inner.lock().order.iter().cloned().collect()
    }

    /// Last access time of `key`, if cached
    pub fn last_access(&self, key: &str) -> Option<Instant> {
        self.inner.lock().items.get(key).map(|item| item.accessed_at)
    }

    /// Verify the ordering, the position index and the item map agree
    pub fn check_consistency(&self) -> Result<(), String> {
        let inner = self.inner.lock();

        if inner.order.len() != inner.index.len() {
            return Err(format!(
                "order has {} keys but index has {}",
                inner.order.len(),
                inner.index.len()
            ));
        }
        if inner.order.len() != inner.items.len() {
            return Err(format!(
                "order has {} keys but cache holds {} items",
                inner.order.len(),
                inner.items.len()
            ));
        }
        for (offset, key) in inner.order.iter().enumerate() {
            match inner.position(key) {
                Some(position) if position == offset => {}
                Some(position) => {
                    return Err(format!(
                        "key '{key}' is at {offset} but indexed at {position}"
                    ))
                }
                None => return Err(format!("key '{key}' missing from index")),
            }
            if !inner.items.contains_key(key) {
                return Err(format!("key '{key}' ordered but not cached"));
            }
        }
        Ok(())
    }
}
