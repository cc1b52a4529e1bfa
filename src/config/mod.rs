//! # Configuration
//!
//! Provider policies (retry, cache, watch, circuit breaker, rate limiter), the
//! manager's own settings and the top-level [`McpSettings`] document loaded by
//! [`ConfigManager`].
//!
//! Durations are stored as integer milliseconds so they map cleanly onto
//! TOML/YAML files and environment overrides; accessor methods expose them as
//! [`Duration`]. Range validation is applied when settings are loaded, not
//! when components are constructed, so tests can run with sub-second policies.

pub mod error;
pub mod loader;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

use crate::constants::{defaults, manager};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Kind of backing store a provider reads from
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ConfigSource {
    ConfigMap,
    Secret,
    Etcd,
    Consul,
    /// Store kinds contributed through a custom provider factory
    Custom(String),
}

impl ConfigSource {
    pub fn as_str(&self) -> &str {
        match self {
            ConfigSource::ConfigMap => "configmap",
            ConfigSource::Secret => "secret",
            ConfigSource::Etcd => "etcd",
            ConfigSource::Consul => "consul",
            ConfigSource::Custom(name) => name,
        }
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigSource {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Ok(match normalized.as_str() {
            "" => {
                return Err(ConfigurationError::invalid_value(
                    "source",
                    s,
                    "source cannot be empty",
                ))
            }
            "configmap" => ConfigSource::ConfigMap,
            "secret" => ConfigSource::Secret,
            "etcd" => ConfigSource::Etcd,
            "consul" => ConfigSource::Consul,
            _ => ConfigSource::Custom(normalized),
        })
    }
}

impl TryFrom<String> for ConfigSource {
    type Error = ConfigurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ConfigSource> for String {
    fn from(source: ConfigSource) -> Self {
        source.as_str().to_string()
    }
}

/// Exponential backoff for store fetches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: defaults::RETRY_MAX_RETRIES,
            base_delay_ms: defaults::RETRY_BASE_DELAY_MS,
            max_delay_ms: defaults::RETRY_MAX_DELAY_MS,
            backoff_factor: defaults::RETRY_BACKOFF_FACTOR,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// `min(max_delay, base_delay * backoff_factor^attempt)`, attempt counted from zero
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let millis = self.base_delay_ms as f64 * self.backoff_factor.powi(exponent);
        if !millis.is_finite() || millis >= self.max_delay_ms as f64 {
            return self.max_delay();
        }
        Duration::from_millis(millis.max(0.0) as u64)
    }

    fn validate(&self, errors: &mut Vec<String>) {
        check_range(errors, "retry.max_retries", self.max_retries, 0, 10);
        check_duration(errors, "retry.base_delay", self.base_delay(), ms(100), secs(10));
        check_duration(errors, "retry.max_delay", self.max_delay(), secs(1), mins(5));
        check_range(errors, "retry.backoff_factor", self.backoff_factor, 1.0, 5.0);
        if self.base_delay_ms > self.max_delay_ms {
            errors.push(format!(
                "retry.base_delay ({:?}) cannot exceed retry.max_delay ({:?})",
                self.base_delay(),
                self.max_delay()
            ));
        }
    }
}

/// Provider-local cache policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_ms: u64,
    /// Zero disables the size bound
    pub max_size: usize,
    pub enable_lru: bool,
    pub optimization_interval_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_ms: defaults::CACHE_TTL_MS,
            max_size: defaults::CACHE_MAX_SIZE,
            enable_lru: true,
            optimization_interval_ms: defaults::CACHE_OPTIMIZATION_INTERVAL_MS,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn optimization_interval(&self) -> Duration {
        Duration::from_millis(self.optimization_interval_ms)
    }

    fn validate(&self, errors: &mut Vec<String>) {
        if !self.enabled {
            return;
        }
        check_duration(errors, "cache.ttl", self.ttl(), mins(1), mins(60));
        check_range(errors, "cache.max_size", self.max_size, 0, 10_000);
        check_duration(
            errors,
            "cache.optimization_interval",
            self.optimization_interval(),
            mins(1),
            mins(60),
        );
    }
}

/// Change-feed subscription policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub enabled: bool,
    pub resync_period_ms: u64,
    pub retry_interval_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            resync_period_ms: defaults::WATCH_RESYNC_PERIOD_MS,
            retry_interval_ms: defaults::WATCH_RETRY_INTERVAL_MS,
        }
    }
}

impl WatchConfig {
    pub fn resync_period(&self) -> Duration {
        Duration::from_millis(self.resync_period_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    fn validate(&self, errors: &mut Vec<String>) {
        if !self.enabled {
            return;
        }
        check_duration(errors, "watch.resync_period", self.resync_period(), mins(1), mins(60));
        check_duration(errors, "watch.retry_interval", self.retry_interval(), secs(1), mins(5));
    }
}

/// Circuit breaker policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub max_failures: u32,
    pub reset_timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: defaults::BREAKER_MAX_FAILURES,
            reset_timeout_ms: defaults::BREAKER_RESET_TIMEOUT_MS,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new(max_failures: u32, reset_timeout: Duration) -> Self {
        Self {
            max_failures,
            reset_timeout_ms: u64::try_from(reset_timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    fn validate(&self, errors: &mut Vec<String>) {
        check_range(errors, "circuit_breaker.max_failures", self.max_failures, 1, 100);
        check_duration(
            errors,
            "circuit_breaker.reset_timeout",
            self.reset_timeout(),
            secs(10),
            mins(30),
        );
    }
}

/// Token-bucket policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    pub capacity: u32,
    /// Tokens per second
    pub refill_rate: f64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            capacity: defaults::LIMITER_CAPACITY,
            refill_rate: defaults::LIMITER_REFILL_RATE,
        }
    }
}

impl RateLimiterConfig {
    fn validate(&self, errors: &mut Vec<String>) {
        check_range(errors, "rate_limiter.capacity", self.capacity, 1, 10_000);
        check_range(errors, "rate_limiter.refill_rate", self.refill_rate, 0.1, 1_000.0);
    }
}

/// Immutable configuration for one provider instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub source: ConfigSource,
    pub namespace: String,
    pub retry: RetryConfig,
    pub cache: CacheConfig,
    pub watch: WatchConfig,
    /// When present the provider is wrapped with a breaker-guarded enhanced
    /// layer. Present by default; clear it with
    /// [`without_resilience`](Self::without_resilience) for a bare provider.
    pub circuit_breaker: Option<CircuitBreakerConfig>,
    /// When present the provider is wrapped with rate limiting. Present by default.
    pub rate_limiter: Option<RateLimiterConfig>,
    /// Setup fails outright when a critical provider cannot be created.
    /// Unset means ConfigMap and Secret providers are critical.
    pub critical: Option<bool>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::for_source(ConfigSource::ConfigMap, defaults::NAMESPACE)
    }
}

impl ProviderConfig {
    /// Defaults tuned per store kind
    pub fn for_source(source: ConfigSource, namespace: impl Into<String>) -> Self {
        let mut config = Self {
            critical: None,
            source: source.clone(),
            namespace: namespace.into(),
            retry: RetryConfig::default(),
            cache: CacheConfig::default(),
            watch: WatchConfig::default(),
            circuit_breaker: Some(CircuitBreakerConfig::default()),
            rate_limiter: Some(RateLimiterConfig::default()),
        };

        match source {
            ConfigSource::Etcd => {
                config.cache.ttl_ms = defaults::ETCD_CACHE_TTL_MS;
                config.circuit_breaker = Some(CircuitBreakerConfig {
                    max_failures: defaults::ETCD_BREAKER_MAX_FAILURES,
                    ..CircuitBreakerConfig::default()
                });
            }
            ConfigSource::Consul => {
                config.cache.ttl_ms = defaults::CONSUL_CACHE_TTL_MS;
                config.watch.resync_period_ms = defaults::CONSUL_RESYNC_PERIOD_MS;
            }
            _ => {}
        }

        config
    }

    pub fn with_circuit_breaker(mut self, breaker: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = Some(breaker);
        self
    }

    pub fn with_rate_limiter(mut self, limiter: RateLimiterConfig) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Drop breaker and limiter policy so the provider is used unwrapped
    pub fn without_resilience(mut self) -> Self {
        self.circuit_breaker = None;
        self.rate_limiter = None;
        self
    }

    pub fn is_critical(&self) -> bool {
        self.critical.unwrap_or(matches!(
            self.source,
            ConfigSource::ConfigMap | ConfigSource::Secret
        ))
    }

    /// Whether the provider should be wrapped with breaker, limiter and tuned cache
    pub fn is_enhanced(&self) -> bool {
        self.circuit_breaker.is_some() || self.rate_limiter.is_some()
    }

    /// Check every policy range, reporting all violations together
    pub fn validate(&self) -> ConfigResult<()> {
        let errors = self.violations();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigurationError::validation(errors))
        }
    }

    fn violations(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.namespace.trim().is_empty() {
            errors.push("namespace cannot be empty".to_string());
        }
        self.retry.validate(&mut errors);
        self.cache.validate(&mut errors);
        self.watch.validate(&mut errors);
        if let Some(breaker) = &self.circuit_breaker {
            breaker.validate(&mut errors);
        }
        if let Some(limiter) = &self.rate_limiter {
            limiter.validate(&mut errors);
        }
        errors
    }
}

/// Manager-level watch gating, stale fallback and retry pacing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Consecutive failed watch starts before a source is skipped
    pub watch_failure_threshold: u32,
    pub watch_recovery_timeout_ms: u64,
    pub stale_max_age_ms: u64,
    /// Fixed pause between `start_watching_with_retry` passes
    pub watch_retry_delay_ms: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            watch_failure_threshold: manager::WATCH_FAILURE_THRESHOLD,
            watch_recovery_timeout_ms: manager::WATCH_RECOVERY_TIMEOUT_MS,
            stale_max_age_ms: manager::STALE_MAX_AGE_MS,
            watch_retry_delay_ms: manager::WATCH_RETRY_DELAY_MS,
        }
    }
}

impl ManagerConfig {
    pub fn watch_recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.watch_recovery_timeout_ms)
    }

    pub fn stale_max_age(&self) -> Duration {
        Duration::from_millis(self.stale_max_age_ms)
    }

    pub fn watch_retry_delay(&self) -> Duration {
        Duration::from_millis(self.watch_retry_delay_ms)
    }

    pub fn watch_breaker(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            max_failures: self.watch_failure_threshold,
            reset_timeout_ms: self.watch_recovery_timeout_ms,
        }
    }

    fn validate(&self, errors: &mut Vec<String>) {
        if self.watch_failure_threshold == 0 {
            errors.push("manager.watch_failure_threshold must be at least 1".to_string());
        }
        if self.stale_max_age_ms == 0 {
            errors.push("manager.stale_max_age must be positive".to_string());
        }
    }
}

/// Logging output settings
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive; `RUST_LOG` still takes precedence
    pub level: Option<String>,
    /// Directory for JSON log files; console only when unset
    pub log_dir: Option<PathBuf>,
    pub json_console: bool,
}

/// Top-level settings document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct McpSettings {
    pub environment: String,
    pub logging: LoggingConfig,
    pub manager: ManagerConfig,
    pub providers: Vec<ProviderConfig>,
}

impl Default for McpSettings {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            logging: LoggingConfig::default(),
            manager: ManagerConfig::default(),
            providers: vec![ProviderConfig::default()],
        }
    }
}

impl McpSettings {
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();
        self.manager.validate(&mut errors);

        let mut seen = std::collections::BTreeSet::new();
        for provider in &self.providers {
            if !seen.insert(provider.source.clone()) {
                errors.push(format!("provider source {} configured more than once", provider.source));
            }
            errors.extend(
                provider
                    .violations()
                    .into_iter()
                    .map(|e| format!("{}: {e}", provider.source)),
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigurationError::validation(errors))
        }
    }
}

fn check_range<T: PartialOrd + fmt::Display>(
    errors: &mut Vec<String>,
    field: &str,
    value: T,
    min: T,
    max: T,
) {
    if value < min || value > max {
        errors.push(format!("{field} must be between {min} and {max}, got {value}"));
    }
}

fn check_duration(errors: &mut Vec<String>, field: &str, value: Duration, min: Duration, max: Duration) {
    if value < min || value > max {
        errors.push(format!("{field} must be between {min:?} and {max:?}, got {value:?}"));
    }
}

const fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

const fn secs(value: u64) -> Duration {
    Duration::from_secs(value)
}

const fn mins(value: u64) -> Duration {
    Duration::from_secs(value * 60)
}
