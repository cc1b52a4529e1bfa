//! # Configuration Caching
//!
//! ## Architecture
//!
//! ```text
//! EnhancedProvider ── EnhancedConfigCache ──┐
//!                      (hit/miss counters,  │
//!                       TTL tuning)         ├── ConfigCache (LRU + TTL)
//! StoreProvider ────────────────────────────┘
//!
//! ProviderManager ── StaleCache (fallback, independently expiring)
//! ```
//!
//! Every cache instance is owned by exactly one provider (or the manager) and
//! is mutated only through its own operations. Cached configurations are
//! handed out as `Arc<McpConfig>` and are read-only for callers.

pub mod config_cache;
pub mod enhanced;
pub mod stale;

pub use config_cache::{CacheStats, ConfigCache};
pub use enhanced::{EnhancedCacheStats, EnhancedConfigCache, TtlOptimizer};
pub use stale::StaleCache;
