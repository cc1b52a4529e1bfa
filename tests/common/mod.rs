//! Shared fixtures for integration tests.

#![allow(dead_code)]

pub mod mocks;
pub mod strategies;

use mcp_config::config::LoggingConfig;
use mcp_config::{
    init_structured_logging, update_handler, ConfigEventType, ConfigUpdateHandler, McpConfig,
    ProviderConfig, StoreObject,
};
use parking_lot::Mutex;
use std::sync::Arc;

pub const NAMESPACE: &str = "default";

pub fn init_test_logging() {
    init_structured_logging(&LoggingConfig {
        level: Some("debug".to_string()),
        ..LoggingConfig::default()
    });
}

/// Provider policy with millisecond-scale timings
pub fn fast_provider_config() -> ProviderConfig {
    let mut config = ProviderConfig::default();
    config.namespace = NAMESPACE.to_string();
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 10;
    config.watch.retry_interval_ms = 10;
    config.watch.resync_period_ms = 60_000;
    config
}

pub fn legacy_instances_json() -> String {
    r#"[{"domain":"test1.com","port":8080,"weight":80,"priority":0},{"domain":"test2.com","port":8081,"weight":90,"priority":0}]"#
        .to_string()
}

/// Managed ConfigMap holding the two-instance legacy payload
pub fn test_config_object(name: &str) -> StoreObject {
    StoreObject::new(NAMESPACE, name)
        .managed()
        .with_entry("instances", legacy_instances_json())
}

pub fn structured_object(name: &str, json: &str) -> StoreObject {
    StoreObject::new(NAMESPACE, name)
        .managed()
        .with_entry("config", json)
}

pub type RecordedEvent = (String, Option<Arc<McpConfig>>, ConfigEventType);

/// Handler that records every event it receives
pub fn recording_handler() -> (ConfigUpdateHandler, Arc<Mutex<Vec<RecordedEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let handler = update_handler(move |config_ref, config, event| {
        sink.lock().push((config_ref.to_string(), config, event));
        Ok(())
    });
    (handler, events)
}

pub fn noop_handler() -> ConfigUpdateHandler {
    update_handler(|_, _, _| Ok(()))
}

/// Poll `condition` until it holds or a second passes
pub async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(1);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    condition()
}
