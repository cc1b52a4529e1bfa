//! Enhanced provider layering: admission, breaker isolation, tuned cache.

mod common;

use common::mocks::MockProvider;
use common::{eventually, fast_provider_config, init_test_logging, recording_handler, test_config_object};
use mcp_config::store::ResourceKind;
use mcp_config::{
    CacheConfig, CircuitBreakerConfig, CircuitState, ConfigMapProvider, ConfigProvider,
    EnhancedProvider, ErrorClass, InMemoryStore, LoadBalanceMode, McpConfig, McpInstance,
    ProviderError, RateLimiterConfig,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn sample_config() -> McpConfig {
    McpConfig::new(
        vec![McpInstance::new("mcp.example.com", 8443, 70, 0)],
        LoadBalanceMode::RoundRobin,
    )
    .unwrap()
}

fn generous_limiter() -> RateLimiterConfig {
    RateLimiterConfig {
        capacity: 1_000,
        refill_rate: 100.0,
    }
}

fn enhance(
    base: &Arc<MockProvider>,
    breaker: CircuitBreakerConfig,
    limiter: RateLimiterConfig,
) -> EnhancedProvider {
    init_test_logging();
    EnhancedProvider::new(
        Arc::clone(base) as Arc<dyn ConfigProvider>,
        &CacheConfig::default(),
        &breaker,
        &limiter,
    )
}

#[tokio::test]
async fn test_cache_hit_skips_base_provider() {
    let base = Arc::new(MockProvider::new("configmap").with_config("routes", sample_config()));
    let provider = enhance(&base, CircuitBreakerConfig::default(), generous_limiter());
    let cancel = CancellationToken::new();

    let first = provider.get_mcp_config(&cancel, "routes").await.unwrap();
    let second = provider.get_mcp_config(&cancel, "routes").await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(base.get_calls.load(Ordering::SeqCst), 1);

    let metrics = provider.metrics();
    assert_eq!(metrics.provider, "configmap");
    assert_eq!((metrics.cache_hits, metrics.cache_misses), (1, 1));
    assert!((metrics.cache_hit_ratio - 0.5).abs() < f64::EPSILON);
    assert_eq!(metrics.circuit_state, CircuitState::Closed);
    assert_eq!(metrics.current_ttl_ms, CacheConfig::default().ttl_ms);
}

#[tokio::test]
async fn test_rate_limit_rejects_without_touching_base() {
    let base = Arc::new(MockProvider::new("configmap").with_config("routes", sample_config()));
    let provider = enhance(
        &base,
        CircuitBreakerConfig::default(),
        RateLimiterConfig {
            capacity: 2,
            refill_rate: 0.1,
        },
    );
    let cancel = CancellationToken::new();

    provider.get_mcp_config(&cancel, "routes").await.unwrap();
    provider.get_mcp_config(&cancel, "routes").await.unwrap();
    let err = provider.get_mcp_config(&cancel, "routes").await.unwrap_err();

    assert!(matches!(err, ProviderError::RateLimited { ref provider } if provider == "configmap"));
    assert_eq!(err.class(), ErrorClass::Rejected);
    assert_eq!(base.get_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_breaker_opens_after_consecutive_failures() {
    let base = Arc::new(MockProvider::new("secret"));
    let provider = enhance(
        &base,
        CircuitBreakerConfig::new(2, Duration::from_secs(60)),
        generous_limiter(),
    );
    let cancel = CancellationToken::new();

    for _ in 0..2 {
        let err = provider.get_mcp_config(&cancel, "missing").await.unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable { .. }));
    }

    let err = provider.get_mcp_config(&cancel, "missing").await.unwrap_err();
    assert!(
        matches!(err, ProviderError::CircuitOpen { ref component } if component == "provider:secret")
    );
    assert_eq!(base.get_calls.load(Ordering::SeqCst), 2);
    assert_eq!(provider.metrics().circuit_state, CircuitState::Open);
}

#[tokio::test]
async fn test_breaker_recovers_through_half_open_trial() {
    let base = Arc::new(MockProvider::new("configmap").with_config("routes", sample_config()));
    let provider = enhance(
        &base,
        CircuitBreakerConfig::new(1, Duration::from_millis(30)),
        generous_limiter(),
    );
    let cancel = CancellationToken::new();

    base.fail_next_get("blip");
    assert!(provider.get_mcp_config(&cancel, "routes").await.is_err());
    assert_eq!(provider.circuit_breaker().state(), CircuitState::Open);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(provider.circuit_breaker().state(), CircuitState::HalfOpen);
    provider.get_mcp_config(&cancel, "routes").await.unwrap();
    assert_eq!(provider.circuit_breaker().state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_cancelled_lookup_short_circuits() {
    let base = Arc::new(MockProvider::new("configmap").with_config("routes", sample_config()));
    let provider = enhance(&base, CircuitBreakerConfig::default(), generous_limiter());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = provider.get_mcp_config(&cancel, "routes").await.unwrap_err();
    assert!(matches!(err, ProviderError::Cancelled));
    assert_eq!(base.get_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_watch_keeps_enhanced_cache_in_step() {
    init_test_logging();
    let store = Arc::new(InMemoryStore::new());
    let config = fast_provider_config().with_rate_limiter(generous_limiter());
    let base: Arc<dyn ConfigProvider> = Arc::new(ConfigMapProvider::new(store.clone(), &config));
    let provider = EnhancedProvider::from_config(base, &config);
    let (handler, events) = recording_handler();

    provider.watch(&CancellationToken::new(), handler).await.unwrap();
    assert!(eventually(|| store.watch_calls() >= 1).await);
    tokio::time::sleep(Duration::from_millis(20)).await;

    store.apply(ResourceKind::ConfigMap, test_config_object("svc"));
    assert!(eventually(|| events.lock().len() == 1).await);
    assert_eq!(provider.cache().get("svc").unwrap().instances.len(), 2);

    store.delete(ResourceKind::ConfigMap, common::NAMESPACE, "svc");
    assert!(eventually(|| events.lock().len() == 2).await);
    assert!(provider.cache().get("svc").is_none());

    provider.stop().await.unwrap();
}

#[tokio::test]
async fn test_optimization_loop_retunes_and_stops() {
    init_test_logging();
    let base = Arc::new(MockProvider::new("configmap").with_config("routes", sample_config()));
    let cache = CacheConfig {
        optimization_interval_ms: 20,
        ..CacheConfig::default()
    };
    let provider = EnhancedProvider::new(
        Arc::clone(&base) as Arc<dyn ConfigProvider>,
        &cache,
        &CircuitBreakerConfig::default(),
        &generous_limiter(),
    );
    let cancel = CancellationToken::new();

    for _ in 0..10 {
        provider.get_mcp_config(&cancel, "routes").await.unwrap();
    }
    let base_ttl = provider.cache().ttl();
    let task = provider.start_optimization_loop(&cancel);

    assert!(eventually(|| provider.cache().ttl() > base_ttl).await);

    provider.stop().await.unwrap();
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("optimization loop should end on stop")
        .unwrap();

    // A fresh loop after stop is governed by the caller's token
    let task = provider.start_optimization_loop(&cancel);
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("optimization loop should end on cancellation")
        .unwrap();
}
