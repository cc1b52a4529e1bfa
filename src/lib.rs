#![allow(clippy::doc_markdown)] // Allow technical terms like ConfigMap, LRU in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # MCP Config
//!
//! Resilient retrieval of MCP configuration (weighted backend instances plus a
//! load-balancing mode) from cluster-native configuration stores.
//!
//! ## Overview
//!
//! A caller asks the [`ProviderManager`] for configuration by source and
//! reference. The manager delegates to the provider registered for that
//! source, which serves from its LRU+TTL cache or fetches from the store with
//! bounded exponential backoff, then parses and validates the record. For
//! change notification every provider runs a watch loop over the store's
//! change feed and invokes a caller-supplied update handler.
//!
//! ## Module Organization
//!
//! - [`models`] - Configuration records, payload parsing and validation
//! - [`store`] - The configuration store seam and an in-memory implementation
//! - [`cache`] - LRU+TTL cache, stale fallback cache, self-tuning cache
//! - [`resilience`] - Circuit breaker and token-bucket rate limiter
//! - [`providers`] - Provider contract, store-backed and enhanced providers
//! - [`registry`] - Provider factories keyed by source
//! - [`manager`] - Multi-provider orchestration with fallback and aggregation
//! - [`config`] - Policies, validation and settings loading
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mcp_config::{
//!     ConfigSource, InMemoryStore, ManagerConfig, ProviderConfig, ProviderFactoryRegistry,
//!     ProviderManager,
//! };
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(InMemoryStore::new());
//! let registry = ProviderFactoryRegistry::with_store_factories(store);
//! let manager = ProviderManager::setup(
//!     &registry,
//!     &[ProviderConfig::for_source(ConfigSource::ConfigMap, "gateway")],
//!     ManagerConfig::default(),
//! )?;
//!
//! let cancel = CancellationToken::new();
//! let config = manager
//!     .get_mcp_config_with_fallback(&cancel, &ConfigSource::ConfigMap, "routes")
//!     .await?;
//! println!("{} instances", config.instances.len());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod manager;
pub mod models;
pub mod providers;
pub mod registry;
pub mod resilience;
pub mod store;

pub use cache::{ConfigCache, EnhancedConfigCache, StaleCache};
pub use config::{
    CacheConfig, CircuitBreakerConfig, ConfigManager, ConfigSource, ManagerConfig, McpSettings,
    ProviderConfig, RateLimiterConfig, RetryConfig, WatchConfig,
};
pub use error::{
    AggregateError, ErrorClass, ManagerError, ProviderError, ProviderResult, SourceError,
};
pub use logging::init_structured_logging;
pub use manager::{ManagerStats, ProviderManager, WatchPassStats};
pub use models::{LoadBalanceMode, McpConfig, McpInstance};
pub use providers::{
    update_handler, ConfigEventType, ConfigMapProvider, ConfigProvider, ConfigUpdateHandler,
    EnhancedProvider, ProviderMetrics, SecretProvider, StoreProvider, WatchStatus,
};
pub use registry::{ProviderFactory, ProviderFactoryRegistry, RegistryError};
pub use resilience::{CircuitBreaker, CircuitState, RateLimiter};
pub use store::{ConfigStore, InMemoryStore, LabelSelector, StoreError, StoreObject};
