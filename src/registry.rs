//! # Provider Factory Registry
//!
//! Maps each [`ConfigSource`] to the factory that builds its provider. The
//! registry is an ordinary value constructed at startup and passed to whoever
//! needs it, so tests can build isolated registries.

use crate::config::{ConfigSource, ProviderConfig};
use crate::error::ProviderError;
use crate::providers::{
    ConfigMapProvider, ConfigProvider, EnhancedProvider, SecretProvider,
};
use crate::store::ConfigStore;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("factory for source {config_source} already registered")]
    DuplicateFactory { config_source: ConfigSource },

    #[error("unsupported config source {requested}, supported: {}", format_sources(supported))]
    UnsupportedSource {
        requested: ConfigSource,
        supported: Vec<ConfigSource>,
    },

    #[error("failed to create provider for source {config_source}: {error}")]
    Creation {
        config_source: ConfigSource,
        #[source]
        error: ProviderError,
    },
}

fn format_sources(sources: &[ConfigSource]) -> String {
    sources
        .iter()
        .map(ConfigSource::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Builds providers for one source kind
pub trait ProviderFactory: Send + Sync + fmt::Debug {
    fn source(&self) -> ConfigSource;

    fn create(&self, config: &ProviderConfig) -> Result<Arc<dyn ConfigProvider>, ProviderError>;
}

#[derive(Debug)]
pub struct ConfigMapProviderFactory {
    store: Arc<dyn ConfigStore>,
}

impl ConfigMapProviderFactory {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }
}

impl ProviderFactory for ConfigMapProviderFactory {
    fn source(&self) -> ConfigSource {
        ConfigSource::ConfigMap
    }

    fn create(&self, config: &ProviderConfig) -> Result<Arc<dyn ConfigProvider>, ProviderError> {
        Ok(Arc::new(ConfigMapProvider::new(Arc::clone(&self.store), config)))
    }
}

#[derive(Debug)]
pub struct SecretProviderFactory {
    store: Arc<dyn ConfigStore>,
}

impl SecretProviderFactory {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }
}

impl ProviderFactory for SecretProviderFactory {
    fn source(&self) -> ConfigSource {
        ConfigSource::Secret
    }

    fn create(&self, config: &ProviderConfig) -> Result<Arc<dyn ConfigProvider>, ProviderError> {
        Ok(Arc::new(SecretProvider::new(Arc::clone(&self.store), config)))
    }
}

#[derive(Debug, Default)]
pub struct ProviderFactoryRegistry {
    factories: RwLock<BTreeMap<ConfigSource, Arc<dyn ProviderFactory>>>,
}

impl ProviderFactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the ConfigMap and Secret factories over `store`
    pub fn with_store_factories(store: Arc<dyn ConfigStore>) -> Self {
        let registry = Self::new();
        let builtins: [Arc<dyn ProviderFactory>; 2] = [
            Arc::new(ConfigMapProviderFactory::new(Arc::clone(&store))),
            Arc::new(SecretProviderFactory::new(store)),
        ];
        {
            let mut factories = registry.factories.write();
            for factory in builtins {
                factories.insert(factory.source(), factory);
            }
        }
        registry
    }

    pub fn register_factory(&self, factory: Arc<dyn ProviderFactory>) -> Result<(), RegistryError> {
        let source = factory.source();
        let mut factories = self.factories.write();
        if factories.contains_key(&source) {
            return Err(RegistryError::DuplicateFactory {
                config_source: source,
            });
        }
        info!(source = %source, "Registered provider factory");
        factories.insert(source, factory);
        Ok(())
    }

    pub fn get_factory(&self, source: &ConfigSource) -> Option<Arc<dyn ProviderFactory>> {
        self.factories.read().get(source).cloned()
    }

    pub fn supported_sources(&self) -> Vec<ConfigSource> {
        self.factories.read().keys().cloned().collect()
    }

    /// Build a provider for `config.source`, wrapping it in an
    /// [`EnhancedProvider`] when the config carries breaker or limiter policy
    pub fn create_provider(
        &self,
        config: &ProviderConfig,
    ) -> Result<Arc<dyn ConfigProvider>, RegistryError> {
        let factory =
            self.get_factory(&config.source)
                .ok_or_else(|| RegistryError::UnsupportedSource {
                    requested: config.source.clone(),
                    supported: self.supported_sources(),
                })?;

        let provider = factory
            .create(config)
            .map_err(|error| RegistryError::Creation {
                config_source: config.source.clone(),
                error,
            })?;

        if config.is_enhanced() {
            debug!(source = %config.source, "Wrapping provider with enhanced layer");
            return Ok(Arc::new(EnhancedProvider::from_config(provider, config)));
        }
        Ok(provider)
    }
}
