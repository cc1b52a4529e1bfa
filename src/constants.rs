//! # System Constants
//!
//! Wire keys, store labels, environment variable names and default policy
//! values shared by providers, the manager and the configuration loader.

/// Label that marks a store object as MCP-managed. Watch subscriptions only
/// observe objects carrying this label with [`MANAGED_LABEL_VALUE`].
pub const MANAGED_LABEL_KEY: &str = "app.higress.io/mcp-config";
pub const MANAGED_LABEL_VALUE: &str = "true";

/// Payload keys inside a store object's data map
pub mod payload {
    /// Structured `McpConfig` JSON document
    pub const CONFIG_KEY: &str = "config";
    /// Legacy bare JSON array of instances
    pub const INSTANCES_KEY: &str = "instances";

    pub const ALL_KEYS: [&str; 2] = [CONFIG_KEY, INSTANCES_KEY];
}

/// Environment variable names consulted at startup
pub mod env {
    pub const ENVIRONMENT: &str = "MCP_CONFIG_ENV";
    pub const APP_ENVIRONMENT: &str = "APP_ENV";
    /// Prefix for configuration overrides, e.g. `MCP_CONFIG__NAMESPACE=gateway`
    pub const OVERRIDE_PREFIX: &str = "MCP_CONFIG";
    pub const OVERRIDE_SEPARATOR: &str = "__";
}

/// Default provider policy values, expressed in milliseconds where temporal
pub mod defaults {
    pub const NAMESPACE: &str = "default";

    pub const RETRY_MAX_RETRIES: u32 = 3;
    pub const RETRY_BASE_DELAY_MS: u64 = 1_000;
    pub const RETRY_MAX_DELAY_MS: u64 = 60_000;
    pub const RETRY_BACKOFF_FACTOR: f64 = 2.0;

    pub const CACHE_TTL_MS: u64 = 5 * 60_000;
    pub const CACHE_MAX_SIZE: usize = 1_000;
    pub const CACHE_OPTIMIZATION_INTERVAL_MS: u64 = 5 * 60_000;

    pub const WATCH_RESYNC_PERIOD_MS: u64 = 5 * 60_000;
    pub const WATCH_RETRY_INTERVAL_MS: u64 = 5_000;

    pub const BREAKER_MAX_FAILURES: u32 = 5;
    pub const BREAKER_RESET_TIMEOUT_MS: u64 = 2 * 60_000;

    pub const LIMITER_CAPACITY: u32 = 100;
    pub const LIMITER_REFILL_RATE: f64 = 10.0;

    pub const ETCD_CACHE_TTL_MS: u64 = 10 * 60_000;
    pub const ETCD_BREAKER_MAX_FAILURES: u32 = 3;
    pub const CONSUL_CACHE_TTL_MS: u64 = 3 * 60_000;
    pub const CONSUL_RESYNC_PERIOD_MS: u64 = 2 * 60_000;
}

/// Manager-level defaults for watch gating, stale fallback and retry pacing
pub mod manager {
    pub const WATCH_FAILURE_THRESHOLD: u32 = 3;
    pub const WATCH_RECOVERY_TIMEOUT_MS: u64 = 30_000;
    pub const STALE_MAX_AGE_MS: u64 = 5 * 60_000;
    pub const WATCH_RETRY_DELAY_MS: u64 = 1_000;
}

/// Hit-ratio thresholds driving TTL tuning in the enhanced cache
pub mod ttl_tuning {
    pub const HIGH_HIT_RATIO: f64 = 0.8;
    pub const LOW_HIT_RATIO: f64 = 0.5;
    pub const STEP: f64 = 0.1;
    /// Bounds relative to the configured base TTL
    pub const MIN_DIVISOR: u32 = 4;
    pub const MAX_MULTIPLIER: u32 = 4;
}
