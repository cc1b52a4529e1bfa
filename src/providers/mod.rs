//! # Configuration Providers
//!
//! [`ConfigProvider`] is the capability every provider and the manager program
//! against. Concrete kinds:
//!
//! - [`ConfigMapProvider`] / [`SecretProvider`]: [`StoreProvider`] specialised
//!   by a [`StoreResource`] marker that knows how entries are encoded
//! - [`EnhancedProvider`]: decorator adding rate limiting, circuit breaking and
//!   an instrumented, self-tuning cache around any provider
//!
//! New store kinds are added by implementing the trait and registering a
//! factory in the [`registry`](crate::registry).

pub mod enhanced;
pub mod resource;
pub mod store_provider;

pub use enhanced::{EnhancedProvider, ProviderMetrics};
pub use resource::{ConfigMapResource, SecretResource, StoreResource};
pub use store_provider::{ConfigMapProvider, SecretProvider, StoreProvider};

use crate::error::ProviderResult;
use crate::models::McpConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Kind of change delivered to an update handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfigEventType {
    Added,
    Modified,
    Deleted,
}

impl fmt::Display for ConfigEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigEventType::Added => f.write_str("Added"),
            ConfigEventType::Modified => f.write_str("Modified"),
            ConfigEventType::Deleted => f.write_str("Deleted"),
        }
    }
}

/// Called once per accepted watch event with `(reference, config, kind)`.
/// The config is `None` for deletions. A returned error is logged and the
/// watch keeps running.
pub type ConfigUpdateHandler =
    Arc<dyn Fn(&str, Option<Arc<McpConfig>>, ConfigEventType) -> anyhow::Result<()> + Send + Sync>;

/// Wrap a closure as a [`ConfigUpdateHandler`]
pub fn update_handler<F>(handler: F) -> ConfigUpdateHandler
where
    F: Fn(&str, Option<Arc<McpConfig>>, ConfigEventType) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(handler)
}

/// Outcome of a successful [`ConfigProvider::watch`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchStatus {
    /// A background watch loop is running
    Started,
    /// Watching is turned off by policy; nothing was started
    Disabled,
}

#[async_trait]
pub trait ConfigProvider: Send + Sync + fmt::Debug {
    /// Resolve `config_ref`. Safe to call concurrently with any references.
    async fn get_mcp_config(
        &self,
        cancel: &CancellationToken,
        config_ref: &str,
    ) -> ProviderResult<Arc<McpConfig>>;

    /// Start delivering change events to `handler` until `cancel` fires or
    /// [`stop`](Self::stop) is called. Fails if a watch is already running.
    async fn watch(
        &self,
        cancel: &CancellationToken,
        handler: ConfigUpdateHandler,
    ) -> ProviderResult<WatchStatus>;

    /// Release any subscription and clear provider-local cache state.
    /// Safe to call when no watch was started.
    async fn stop(&self) -> ProviderResult<()>;

    fn name(&self) -> &str;
}

/// Invoke `handler`, logging rather than propagating its error
pub(crate) fn dispatch(
    provider: &str,
    handler: &ConfigUpdateHandler,
    config_ref: &str,
    config: Option<Arc<McpConfig>>,
    event: ConfigEventType,
) {
    if let Err(error) = handler(config_ref, config, event) {
        tracing::warn!(
            provider,
            config_ref,
            event = %event,
            error = %error,
            "Update handler returned an error"
        );
    }
}
