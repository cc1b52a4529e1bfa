//! Provider decorator adding admission control, failure isolation and an
//! instrumented cache whose TTL follows the observed hit ratio.

use super::{dispatch, ConfigProvider, ConfigUpdateHandler, WatchStatus};
use crate::cache::EnhancedConfigCache;
use crate::config::{CacheConfig, CircuitBreakerConfig, ProviderConfig, RateLimiterConfig};
use crate::error::{ProviderError, ProviderResult};
use crate::models::McpConfig;
use crate::resilience::{CircuitBreaker, CircuitBreakerError, CircuitState, RateLimiter};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Snapshot of an enhanced provider's cache and breaker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderMetrics {
    pub provider: String,
    pub cache_hit_ratio: f64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_evictions: u64,
    pub total_operations: u64,
    pub circuit_state: CircuitState,
    pub current_ttl_ms: u64,
}

#[derive(Debug)]
pub struct EnhancedProvider {
    name: String,
    base: Arc<dyn ConfigProvider>,
    cache: Arc<EnhancedConfigCache>,
    breaker: CircuitBreaker,
    limiter: RateLimiter,
    optimization_interval: Duration,
    /// Cancelled and replaced by `stop` to end running optimization loops
    shutdown: Mutex<CancellationToken>,
}

impl EnhancedProvider {
    pub fn new(
        base: Arc<dyn ConfigProvider>,
        cache: &CacheConfig,
        breaker: &CircuitBreakerConfig,
        limiter: &RateLimiterConfig,
    ) -> Self {
        let name = base.name().to_string();
        info!(
            provider = %name,
            capacity = limiter.capacity,
            refill_rate = limiter.refill_rate,
            max_failures = breaker.max_failures,
            "Enhanced provider created"
        );

        Self {
            breaker: CircuitBreaker::from_config(format!("provider:{name}"), breaker),
            limiter: RateLimiter::from_config(limiter),
            cache: Arc::new(EnhancedConfigCache::from_config(cache)),
            optimization_interval: cache.optimization_interval(),
            shutdown: Mutex::new(CancellationToken::new()),
            name,
            base,
        }
    }

    /// Wrap `base` using the policies in `config`; absent policies take defaults
    pub fn from_config(base: Arc<dyn ConfigProvider>, config: &ProviderConfig) -> Self {
        Self::new(
            base,
            &config.cache,
            &config.circuit_breaker.clone().unwrap_or_default(),
            &config.rate_limiter.clone().unwrap_or_default(),
        )
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn cache(&self) -> &EnhancedConfigCache {
        &self.cache
    }

    pub fn metrics(&self) -> ProviderMetrics {
        let stats = self.cache.stats();
        ProviderMetrics {
            provider: self.name.clone(),
            cache_hit_ratio: stats.hit_ratio,
            cache_hits: stats.hits,
            cache_misses: stats.misses,
            cache_evictions: stats.evictions,
            total_operations: stats.total_operations,
            circuit_state: self.breaker.state(),
            current_ttl_ms: u64::try_from(stats.ttl.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Periodically retune the cache TTL until `cancel` fires or the provider stops
    pub fn start_optimization_loop(&self, cancel: &CancellationToken) -> JoinHandle<()> {
        let cache = Arc::clone(&self.cache);
        let name = self.name.clone();
        let period = self.optimization_interval;
        let cancel = cancel.clone();
        let shutdown = self.shutdown.lock().clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Some(ttl) = cache.optimize_ttl() {
                            debug!(provider = %name, ttl_ms = ttl.as_millis() as u64, "Optimization pass applied");
                        }
                    }
                }
            }
            debug!(provider = %name, "Optimization loop stopped");
        })
    }
}

#[async_trait]
impl ConfigProvider for EnhancedProvider {
    async fn get_mcp_config(
        &self,
        cancel: &CancellationToken,
        config_ref: &str,
    ) -> ProviderResult<Arc<McpConfig>> {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        if !self.limiter.allow() {
            warn!(provider = %self.name, config_ref, "Rate limit exceeded");
            return Err(ProviderError::RateLimited {
                provider: self.name.clone(),
            });
        }

        if let Some(cached) = self.cache.get(config_ref) {
            return Ok(cached);
        }

        let result = self
            .breaker
            .execute(|| self.base.get_mcp_config(cancel, config_ref))
            .await;

        match result {
            Ok(config) => {
                self.cache.set(config_ref, Arc::clone(&config));
                Ok(config)
            }
            Err(CircuitBreakerError::CircuitOpen { component }) => {
                Err(ProviderError::CircuitOpen { component })
            }
            Err(CircuitBreakerError::OperationFailed(error)) => Err(error),
        }
    }

    /// Watches through the wrapped provider, keeping this layer's cache in step
    async fn watch(
        &self,
        cancel: &CancellationToken,
        handler: ConfigUpdateHandler,
    ) -> ProviderResult<WatchStatus> {
        let cache = Arc::clone(&self.cache);
        let name = self.name.clone();
        let forwarding: ConfigUpdateHandler = super::update_handler(move |config_ref, config, event| {
            match &config {
                Some(config) => cache.set(config_ref, Arc::clone(config)),
                None => {
                    cache.delete(config_ref);
                }
            }
            dispatch(&name, &handler, config_ref, config, event);
            Ok(())
        });

        self.base.watch(cancel, forwarding).await
    }

    async fn stop(&self) -> ProviderResult<()> {
        {
            let mut shutdown = self.shutdown.lock();
            shutdown.cancel();
            *shutdown = CancellationToken::new();
        }
        self.cache.clear();
        self.base.stop().await
    }

    fn name(&self) -> &str {
        &self.name
    }
}
