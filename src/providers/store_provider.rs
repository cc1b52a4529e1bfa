//! Store-backed provider: cached fetch with bounded retry, plus a supervised
//! watch loop over the store's change feed.

use super::resource::{ConfigMapResource, SecretResource, StoreResource};
use super::{dispatch, ConfigEventType, ConfigProvider, ConfigUpdateHandler, WatchStatus};
use crate::cache::ConfigCache;
use crate::config::{ProviderConfig, RetryConfig, WatchConfig};
use crate::error::{ProviderError, ProviderResult};
use crate::models::{parse_payload, McpConfig, ParseError};
use crate::store::{
    ConfigStore, LabelSelector, StoreError, StoreEvent, StoreEventKind, StoreEventStream,
    StoreObject,
};
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub type ConfigMapProvider = StoreProvider<ConfigMapResource>;
pub type SecretProvider = StoreProvider<SecretResource>;

/// State shared between the provider and its watch task
struct Inner<R> {
    name: String,
    namespace: String,
    store: Arc<dyn ConfigStore>,
    retry: RetryConfig,
    watch: WatchConfig,
    cache: Option<ConfigCache>,
    selector: LabelSelector,
    _resource: PhantomData<fn() -> R>,
}

struct WatchHandle {
    stop: CancellationToken,
    task: JoinHandle<()>,
}

/// Provider reading MCP configuration records of kind `R` from a [`ConfigStore`]
pub struct StoreProvider<R: StoreResource> {
    inner: Arc<Inner<R>>,
    watch: Mutex<Option<WatchHandle>>,
}

impl<R: StoreResource> fmt::Debug for StoreProvider<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreProvider")
            .field("name", &self.inner.name)
            .field("kind", &R::KIND)
            .field("namespace", &self.inner.namespace)
            .field("watching", &self.is_watching())
            .finish()
    }
}

impl<R: StoreResource> StoreProvider<R> {
    pub fn new(store: Arc<dyn ConfigStore>, config: &ProviderConfig) -> Self {
        let cache = config.cache.enabled.then(|| ConfigCache::from_config(&config.cache));
        let name = R::SOURCE.to_string();

        info!(
            provider = %name,
            namespace = %config.namespace,
            cache_enabled = config.cache.enabled,
            watch_enabled = config.watch.enabled,
            "Provider created"
        );

        Self {
            inner: Arc::new(Inner {
                name,
                namespace: config.namespace.clone(),
                store,
                retry: config.retry.clone(),
                watch: config.watch.clone(),
                cache,
                selector: LabelSelector::managed(),
                _resource: PhantomData,
            }),
            watch: Mutex::new(None),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    pub fn is_watching(&self) -> bool {
        self.watch
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.task.is_finished())
    }

    /// Provider-local cache, absent when caching is disabled
    pub fn cache(&self) -> Option<&ConfigCache> {
        self.inner.cache.as_ref()
    }
}

#[async_trait]
impl<R: StoreResource> ConfigProvider for StoreProvider<R> {
    async fn get_mcp_config(
        &self,
        cancel: &CancellationToken,
        config_ref: &str,
    ) -> ProviderResult<Arc<McpConfig>> {
        if config_ref.trim().is_empty() {
            return Err(ProviderError::EmptyReference);
        }
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }

        if let Some(cached) = self.inner.cache.as_ref().and_then(|c| c.get(config_ref)) {
            debug!(provider = %self.inner.name, config_ref, "Cache hit");
            return Ok(cached);
        }

        let object = self.inner.fetch_with_retry(cancel, config_ref).await?;
        let config = Arc::new(self.inner.decode(&object)?);

        if let Some(cache) = &self.inner.cache {
            cache.set(config_ref, Arc::clone(&config));
        }
        debug!(
            provider = %self.inner.name,
            config_ref,
            instances = config.instances.len(),
            "Fetched configuration"
        );
        Ok(config)
    }

    async fn watch(
        &self,
        cancel: &CancellationToken,
        handler: ConfigUpdateHandler,
    ) -> ProviderResult<WatchStatus> {
        let mut guard = self.watch.lock();
        if guard.as_ref().is_some_and(|h| !h.task.is_finished()) {
            return Err(ProviderError::AlreadyWatching {
                provider: self.inner.name.clone(),
            });
        }

        if !self.inner.watch.enabled {
            info!(provider = %self.inner.name, "Watching disabled");
            return Ok(WatchStatus::Disabled);
        }
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }

        let stop = CancellationToken::new();
        let task = tokio::spawn(run_watch_loop(
            Arc::clone(&self.inner),
            cancel.clone(),
            stop.clone(),
            handler,
        ));
        *guard = Some(WatchHandle { stop, task });

        info!(
            provider = %self.inner.name,
            namespace = %self.inner.namespace,
            selector = %self.inner.selector,
            "👀 Watch started"
        );
        Ok(WatchStatus::Started)
    }

    async fn stop(&self) -> ProviderResult<()> {
        let handle = self.watch.lock().take();
        if let Some(cache) = &self.inner.cache {
            cache.clear();
        }

        let Some(handle) = handle else {
            return Ok(());
        };
        handle.stop.cancel();
        match handle.task.await {
            Ok(()) => {
                info!(provider = %self.inner.name, "Watch stopped");
                Ok(())
            }
            Err(join_error) if join_error.is_cancelled() => Ok(()),
            Err(join_error) => Err(ProviderError::StopFailed {
                provider: self.inner.name.clone(),
                reason: join_error.to_string(),
            }),
        }
    }

    fn name(&self) -> &str {
        &self.inner.name
    }
}

impl<R: StoreResource> Inner<R> {
    async fn fetch_with_retry(
        &self,
        cancel: &CancellationToken,
        config_ref: &str,
    ) -> ProviderResult<StoreObject> {
        let attempts = self.retry.max_retries.max(1);
        let mut last_error = None;

        for attempt in 0..attempts {
            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                result = self.store.get(R::KIND, &self.namespace, config_ref) => result,
            };

            let error = match result {
                Ok(object) => return Ok(object),
                Err(error) if error.is_terminal() => {
                    return Err(ProviderError::Store {
                        config_ref: config_ref.to_string(),
                        source: error,
                    })
                }
                Err(error) => error,
            };

            if attempt + 1 < attempts {
                let delay = self.retry.delay_for_attempt(attempt);
                warn!(
                    provider = %self.name,
                    config_ref,
                    attempt = attempt + 1,
                    max_attempts = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Fetch failed, retrying"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            last_error = Some(error);
        }

        let source = last_error.unwrap_or_else(|| StoreError::Other("no fetch attempted".into()));
        error!(provider = %self.name, config_ref, attempts, error = %source, "Fetch retries exhausted");
        Err(ProviderError::RetriesExhausted {
            config_ref: config_ref.to_string(),
            attempts,
            source,
        })
    }

    /// Parse and validate a record. Nothing partially valid gets through.
    fn decode(&self, object: &StoreObject) -> ProviderResult<McpConfig> {
        let parse_error = |source: ParseError| ProviderError::Parse {
            config_ref: object.name.clone(),
            source,
        };
        let entries = R::decode_payload(object).map_err(parse_error)?;
        let raw = parse_payload(&entries).map_err(parse_error)?;
        raw.validate().map_err(|source| ProviderError::Validation {
            config_ref: object.name.clone(),
            source,
        })
    }

    async fn subscribe(&self) -> Result<StoreEventStream, StoreError> {
        self.store
            .watch(R::KIND, &self.namespace, &self.selector)
            .await
    }

    fn apply_event(&self, event: StoreEvent, handler: &ConfigUpdateHandler) {
        let config_ref = event.object.name.clone();
        let event_type = match event.kind {
            StoreEventKind::Added => ConfigEventType::Added,
            StoreEventKind::Modified => ConfigEventType::Modified,
            StoreEventKind::Deleted => {
                if let Some(cache) = &self.cache {
                    cache.delete(&config_ref);
                }
                debug!(provider = %self.name, config_ref = %config_ref, "Configuration deleted");
                dispatch(&self.name, handler, &config_ref, None, ConfigEventType::Deleted);
                return;
            }
            StoreEventKind::Bookmark => return,
        };

        match self.decode(&event.object) {
            Ok(config) => {
                let config = Arc::new(config);
                if let Some(cache) = &self.cache {
                    cache.set(&config_ref, Arc::clone(&config));
                }
                debug!(provider = %self.name, config_ref = %config_ref, event = %event_type, "Configuration updated");
                dispatch(&self.name, handler, &config_ref, Some(config), event_type);
            }
            Err(error) => {
                warn!(
                    provider = %self.name,
                    config_ref = %config_ref,
                    event = %event_type,
                    error = %error,
                    "Dropping invalid configuration event"
                );
            }
        }
    }

    /// Re-apply every labeled object as a modification
    async fn resync(&self, handler: &ConfigUpdateHandler) {
        match self.store.list(R::KIND, &self.namespace, &self.selector).await {
            Ok(objects) => {
                debug!(provider = %self.name, objects = objects.len(), "Resyncing");
                for object in objects {
                    self.apply_event(
                        StoreEvent {
                            kind: StoreEventKind::Modified,
                            object,
                        },
                        handler,
                    );
                }
            }
            Err(error) => warn!(provider = %self.name, error = %error, "Resync failed"),
        }
    }
}

enum LoopStep {
    Exit(&'static str),
    Reconnect,
    Event(Option<Result<StoreEvent, StoreError>>),
    Resync,
}

async fn run_watch_loop<R: StoreResource>(
    inner: Arc<Inner<R>>,
    cancel: CancellationToken,
    stop: CancellationToken,
    handler: ConfigUpdateHandler,
) {
    let mut retry = interval(inner.watch.retry_interval());
    retry.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let resync_period = inner.watch.resync_period();
    let mut resync = interval_at(Instant::now() + resync_period, resync_period);
    resync.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut stream: Option<StoreEventStream> = None;

    loop {
        let subscribed = stream.is_some();
        let step = tokio::select! {
            _ = cancel.cancelled() => LoopStep::Exit("context cancelled"),
            _ = stop.cancelled() => LoopStep::Exit("stop requested"),
            _ = retry.tick(), if !subscribed => LoopStep::Reconnect,
            event = next_event(&mut stream), if subscribed => LoopStep::Event(event),
            _ = resync.tick(), if subscribed => LoopStep::Resync,
        };

        match step {
            LoopStep::Exit(reason) => {
                debug!(provider = %inner.name, reason, "Watch loop exiting");
                break;
            }
            LoopStep::Reconnect => match unless_shutdown(&cancel, &stop, inner.subscribe()).await {
                None => {
                    debug!(provider = %inner.name, "Watch loop exiting while subscribing");
                    break;
                }
                Some(Ok(opened)) => {
                    debug!(provider = %inner.name, "Subscription opened");
                    stream = Some(opened);
                }
                Some(Err(error)) => warn!(
                    provider = %inner.name,
                    error = %error,
                    retry_ms = inner.watch.retry_interval_ms,
                    "Failed to open subscription, will retry"
                ),
            },
            LoopStep::Event(Some(Ok(event))) => inner.apply_event(event, &handler),
            LoopStep::Event(Some(Err(error))) => {
                warn!(provider = %inner.name, error = %error, "Subscription error, reconnecting");
                stream = None;
            }
            LoopStep::Event(None) => {
                warn!(provider = %inner.name, "Subscription closed, reconnecting");
                stream = None;
            }
            LoopStep::Resync => {
                if unless_shutdown(&cancel, &stop, inner.resync(&handler)).await.is_none() {
                    debug!(provider = %inner.name, "Watch loop exiting during resync");
                    break;
                }
            }
        }
    }
}

/// Drive `operation` unless the watch is cancelled or stopped first
async fn unless_shutdown<T>(
    cancel: &CancellationToken,
    stop: &CancellationToken,
    operation: impl std::future::Future<Output = T>,
) -> Option<T> {
    tokio::select! {
        _ = cancel.cancelled() => None,
        _ = stop.cancelled() => None,
        output = operation => Some(output),
    }
}

async fn next_event(stream: &mut Option<StoreEventStream>) -> Option<Result<StoreEvent, StoreError>> {
    match stream {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::update_handler;
    use crate::store::{InMemoryStore, ResourceKind};
    use std::time::Duration;

    fn fast_config() -> ProviderConfig {
        let mut config = ProviderConfig::default();
        config.retry.base_delay_ms = 1;
        config.retry.max_delay_ms = 5;
        config.watch.retry_interval_ms = 10;
        config
    }

    fn legacy_object(name: &str, port: i64) -> StoreObject {
        StoreObject::new("default", name)
            .managed()
            .with_entry("instances", format!(r#"[{{"domain":"a.com","port":{port},"weight":10,"priority":0}}]"#))
    }

    #[tokio::test]
    async fn test_empty_reference_rejected_before_store() {
        let store = Arc::new(InMemoryStore::new());
        let provider = ConfigMapProvider::new(store.clone(), &fast_config());

        let err = provider
            .get_mcp_config(&CancellationToken::new(), "  ")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::EmptyReference));
        assert_eq!(store.get_calls(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_token_short_circuits() {
        let store = Arc::new(InMemoryStore::new());
        let provider = ConfigMapProvider::new(store.clone(), &fast_config());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = provider.get_mcp_config(&cancel, "x").await.unwrap_err();
        assert!(matches!(err, ProviderError::Cancelled));
        assert_eq!(store.get_calls(), 0);
    }

    #[tokio::test]
    async fn test_transient_errors_retried_until_success() {
        let store = Arc::new(InMemoryStore::new());
        store.apply(ResourceKind::ConfigMap, legacy_object("svc", 80));
        store.fail_next_get(StoreError::Unavailable("dial tcp".into()));
        store.fail_next_get(StoreError::Throttled("429".into()));

        let provider = ConfigMapProvider::new(store.clone(), &fast_config());
        let config = provider
            .get_mcp_config(&CancellationToken::new(), "svc")
            .await
            .unwrap();
        assert_eq!(config.instances.len(), 1);
        assert_eq!(store.get_calls(), 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted_reports_attempts() {
        let store = Arc::new(InMemoryStore::new());
        for _ in 0..3 {
            store.fail_next_get(StoreError::Timeout("slow".into()));
        }

        let provider = ConfigMapProvider::new(store.clone(), &fast_config());
        let err = provider
            .get_mcp_config(&CancellationToken::new(), "svc")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::RetriesExhausted { attempts: 3, .. }));
        assert!(err.to_string().contains("after 3 attempts"));
        assert_eq!(store.get_calls(), 3);
    }

    #[tokio::test]
    async fn test_watch_double_start_and_stop() {
        let store = Arc::new(InMemoryStore::new());
        let provider = ConfigMapProvider::new(store, &fast_config());
        let handler = update_handler(|_, _, _| Ok(()));
        let cancel = CancellationToken::new();

        assert_eq!(provider.watch(&cancel, handler.clone()).await.unwrap(), WatchStatus::Started);
        assert!(matches!(
            provider.watch(&cancel, handler.clone()).await,
            Err(ProviderError::AlreadyWatching { .. })
        ));

        provider.stop().await.unwrap();
        assert!(!provider.is_watching());
        assert_eq!(provider.watch(&cancel, handler).await.unwrap(), WatchStatus::Started);
        provider.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_without_watch_clears_cache() {
        let store = Arc::new(InMemoryStore::new());
        store.apply(ResourceKind::ConfigMap, legacy_object("svc", 80));
        let provider = ConfigMapProvider::new(store, &fast_config());
        provider
            .get_mcp_config(&CancellationToken::new(), "svc")
            .await
            .unwrap();
        assert_eq!(provider.cache().map(ConfigCache::len), Some(1));

        provider.stop().await.unwrap();
        assert_eq!(provider.cache().map(ConfigCache::len), Some(0));
    }

    #[tokio::test]
    async fn test_watch_exits_on_cancellation() {
        let store = Arc::new(InMemoryStore::new());
        let provider = ConfigMapProvider::new(store, &fast_config());
        let cancel = CancellationToken::new();
        provider
            .watch(&cancel, update_handler(|_, _, _| Ok(())))
            .await
            .unwrap();

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), async {
            while provider.is_watching() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("watch loop should exit promptly after cancellation");
    }
}
