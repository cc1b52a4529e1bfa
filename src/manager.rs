//! # Provider Manager
//!
//! Owns one provider per configuration source and orchestrates them:
//!
//! - lookups dispatched by source, with an optional stale fallback
//! - watch start across every provider with per-source failure aggregation
//! - a per-source circuit breaker that stops hammering sources whose watch
//!   keeps failing to start
//! - retrying watch start with a fixed pause between passes
//!
//! Multi-provider operations never fail fast. Every provider is attempted and
//! the failures come back together in one [`AggregateError`].

use crate::cache::StaleCache;
use crate::config::{ConfigSource, ManagerConfig, ProviderConfig};
use crate::error::{AggregateError, ManagerError, ProviderError, SourceError};
use crate::logging::log_provider_operation;
use crate::models::McpConfig;
use crate::providers::{ConfigProvider, ConfigUpdateHandler, WatchStatus};
use crate::registry::ProviderFactoryRegistry;
use crate::resilience::{CircuitBreakerManager, CircuitBreakerMetrics};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Outcome counts for one `start_watching` pass
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct WatchPassStats {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Sources skipped because their watch breaker was open
    pub skipped: usize,
    /// Succeeded over attempted; 1.0 when nothing was attempted
    pub success_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManagerStats {
    pub sources: Vec<ConfigSource>,
    pub stale_entries: usize,
    pub watch_passes: u64,
    pub last_watch_pass: Option<WatchPassStats>,
    pub watch_breakers: HashMap<String, CircuitBreakerMetrics>,
}

#[derive(Debug, Default)]
struct WatchHistory {
    passes: u64,
    last: Option<WatchPassStats>,
}

type ProviderMap = BTreeMap<ConfigSource, Arc<dyn ConfigProvider>>;

#[derive(Debug)]
pub struct ProviderManager {
    settings: ManagerConfig,
    providers: RwLock<ProviderMap>,
    stale: StaleCache,
    watch_breakers: CircuitBreakerManager,
    history: Mutex<WatchHistory>,
}

impl Default for ProviderManager {
    fn default() -> Self {
        Self::new(ManagerConfig::default())
    }
}

impl ProviderManager {
    pub fn new(settings: ManagerConfig) -> Self {
        Self {
            stale: StaleCache::new(settings.stale_max_age()),
            watch_breakers: CircuitBreakerManager::new(settings.watch_breaker()),
            providers: RwLock::new(BTreeMap::new()),
            history: Mutex::new(WatchHistory::default()),
            settings,
        }
    }

    /// Build a manager with a provider for each config.
    ///
    /// A critical source that cannot be created aborts setup. Other failures
    /// are logged and the source is left out. At least one provider must end
    /// up registered. Each factory is tried once; creation does no I/O, so
    /// there is no registration retry.
    pub fn setup(
        registry: &ProviderFactoryRegistry,
        configs: &[ProviderConfig],
        settings: ManagerConfig,
    ) -> Result<Self, ManagerError> {
        let manager = Self::new(settings);

        for config in configs {
            match registry.create_provider(config) {
                Ok(provider) => manager.register_provider(config.source.clone(), provider)?,
                Err(err) if config.is_critical() => {
                    error!(source = %config.source, error = %err, "Critical provider failed to initialize");
                    return Err(err.into());
                }
                Err(err) => {
                    warn!(source = %config.source, error = %err, "Skipping provider that failed to initialize");
                }
            }
        }

        if manager.providers.read().is_empty() {
            return Err(ManagerError::Setup(
                "no providers could be registered".to_string(),
            ));
        }
        Ok(manager)
    }

    /// Register the provider for `source`. Each source is registered once.
    pub fn register_provider(
        &self,
        source: ConfigSource,
        provider: Arc<dyn ConfigProvider>,
    ) -> Result<(), ManagerError> {
        let mut providers = self.providers.write();
        if providers.contains_key(&source) {
            return Err(ManagerError::DuplicateProvider {
                config_source: source,
            });
        }
        log_provider_operation("register", source.as_str(), "ok", Some(provider.name()));
        providers.insert(source, provider);
        Ok(())
    }

    pub fn get_provider(&self, source: &ConfigSource) -> Result<Arc<dyn ConfigProvider>, ManagerError> {
        self.providers
            .read()
            .get(source)
            .cloned()
            .ok_or_else(|| ManagerError::NoProvider {
                config_source: source.clone(),
            })
    }

    pub fn sources(&self) -> Vec<ConfigSource> {
        self.providers.read().keys().cloned().collect()
    }

    /// Fetch through the provider for `source`, remembering the result for fallback.
    /// A failed fetch counts against the source's watch breaker.
    pub async fn get_mcp_config(
        &self,
        cancel: &CancellationToken,
        source: &ConfigSource,
        config_ref: &str,
    ) -> Result<Arc<McpConfig>, ManagerError> {
        let provider = self.get_provider(source)?;
        match provider.get_mcp_config(cancel, config_ref).await {
            Ok(config) => {
                self.stale.set(source, config_ref, Arc::clone(&config));
                Ok(config)
            }
            Err(err) => {
                self.watch_breakers
                    .get_or_create(source.as_str())
                    .record_failure();
                Err(err.into())
            }
        }
    }

    /// Like [`get_mcp_config`](Self::get_mcp_config), but a failed fetch is
    /// answered from the stale cache while its entry is younger than the
    /// configured maximum age. Without a usable entry the live error is returned.
    pub async fn get_mcp_config_with_fallback(
        &self,
        cancel: &CancellationToken,
        source: &ConfigSource,
        config_ref: &str,
    ) -> Result<Arc<McpConfig>, ManagerError> {
        match self.get_mcp_config(cancel, source, config_ref).await {
            Ok(config) => Ok(config),
            Err(err) => match self.stale.get(source, config_ref) {
                Some(stale) => {
                    warn!(
                        source = %source,
                        config_ref,
                        error = %err,
                        "Live fetch failed, serving stale configuration"
                    );
                    Ok(stale)
                }
                None => Err(err),
            },
        }
    }

    /// Start watching on every registered provider.
    ///
    /// Sources whose watch breaker is open are skipped without error. A
    /// provider that is already watching counts as a success.
    pub async fn start_watching(
        &self,
        cancel: &CancellationToken,
        handler: ConfigUpdateHandler,
    ) -> Result<(), ManagerError> {
        let mut pass = WatchPassStats::default();
        let mut attempts = Vec::new();

        for (source, provider) in self.providers() {
            let breaker = self.watch_breakers.get_or_create(source.as_str());
            if breaker.should_allow() {
                attempts.push((source, provider, breaker));
            } else {
                warn!(source = %source, "Watch breaker open, skipping source");
                pass.skipped += 1;
            }
        }

        let outcomes = join_all(
            attempts
                .iter()
                .map(|(_, provider, _)| provider.watch(cancel, Arc::clone(&handler))),
        )
        .await;

        let mut failures = AggregateError::new();
        for ((source, _, breaker), outcome) in attempts.into_iter().zip(outcomes) {
            pass.attempted += 1;
            match outcome {
                Ok(status) => {
                    breaker.record_success();
                    pass.succeeded += 1;
                    if status == WatchStatus::Disabled {
                        debug!(source = %source, "Watching disabled for source");
                    }
                }
                Err(ProviderError::AlreadyWatching { .. }) => {
                    breaker.record_success();
                    pass.succeeded += 1;
                }
                Err(err) => {
                    breaker.record_failure();
                    pass.failed += 1;
                    warn!(source = %source, error = %err, "Failed to start watching");
                    failures.push(SourceError::watch(source, err));
                }
            }
        }

        pass.success_rate = if pass.attempted == 0 {
            1.0
        } else {
            pass.succeeded as f64 / pass.attempted as f64
        };
        info!(
            attempted = pass.attempted,
            succeeded = pass.succeeded,
            failed = pass.failed,
            skipped = pass.skipped,
            success_rate = pass.success_rate,
            "Watch pass complete"
        );
        {
            let mut history = self.history.lock();
            history.passes += 1;
            history.last = Some(pass);
        }

        failures.into_result().map_err(ManagerError::from)
    }

    /// Repeat [`start_watching`](Self::start_watching) until a pass succeeds,
    /// making at most `max_retries + 1` passes with a fixed delay between them
    pub async fn start_watching_with_retry(
        &self,
        cancel: &CancellationToken,
        handler: ConfigUpdateHandler,
        max_retries: u32,
    ) -> Result<(), ManagerError> {
        let attempts = max_retries.saturating_add(1);
        let delay = self.settings.watch_retry_delay();
        let mut last_error = None;

        for attempt in 1..=attempts {
            if cancel.is_cancelled() {
                return Err(ManagerError::Cancelled);
            }

            match self.start_watching(cancel, Arc::clone(&handler)).await {
                Ok(()) => {
                    if attempt > 1 {
                        info!(attempt, "Watching started after retry");
                    }
                    return Ok(());
                }
                Err(err) => {
                    warn!(attempt, max_attempts = attempts, error = %err, "Watch pass failed");
                    last_error = Some(err);
                }
            }

            if attempt < attempts {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(ManagerError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        let last = last_error.unwrap_or_else(|| ManagerError::Setup("no watch pass ran".into()));
        Err(ManagerError::RetriesExhausted {
            attempts,
            last: Box::new(last),
        })
    }

    /// Stop every provider, aggregating failures
    pub async fn stop(&self) -> Result<(), ManagerError> {
        let providers = self.providers();
        let outcomes = join_all(providers.iter().map(|(_, provider)| provider.stop())).await;

        let failures: AggregateError = providers
            .into_iter()
            .zip(outcomes)
            .filter_map(|((source, _), outcome)| {
                let status = if outcome.is_ok() { "ok" } else { "failed" };
                log_provider_operation("stop", source.as_str(), status, None);
                outcome.err().map(|err| SourceError::stop(source, err))
            })
            .collect();

        failures.into_result().map_err(ManagerError::from)
    }

    pub fn stale_cache(&self) -> &StaleCache {
        &self.stale
    }

    pub fn stats(&self) -> ManagerStats {
        self.stale.purge_expired();
        let history = self.history.lock();
        ManagerStats {
            sources: self.sources(),
            stale_entries: self.stale.len(),
            watch_passes: history.passes,
            last_watch_pass: history.last,
            watch_breakers: self.watch_breakers.metrics(),
        }
    }

    /// Registered providers in source order. The registry lock is released
    /// before this returns.
    pub fn providers(&self) -> Vec<(ConfigSource, Arc<dyn ConfigProvider>)> {
        self.providers
            .read()
            .iter()
            .map(|(source, provider)| (source.clone(), Arc::clone(provider)))
            .collect()
    }
}
