//! Configuration Loader
//!
//! Layers built-in defaults, an optional settings file and `MCP_CONFIG__*`
//! environment overrides, then validates the merged result.

use super::error::{ConfigResult, ConfigurationError};
use super::McpSettings;
use crate::constants::env;
use config::{Config, Environment, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Loaded, validated settings together with where they came from
#[derive(Debug)]
pub struct ConfigManager {
    settings: McpSettings,
    environment: String,
    source_file: Option<PathBuf>,
}

impl ConfigManager {
    /// Defaults plus environment overrides, no file
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_layers(None, env::OVERRIDE_PREFIX)
    }

    /// Load from a TOML, YAML or JSON file (format taken from the extension)
    pub fn load_from_file(path: impl AsRef<Path>) -> ConfigResult<Arc<ConfigManager>> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigurationError::ConfigFileNotFound {
                path: path.to_path_buf(),
            });
        }
        Self::load_layers(Some(path), env::OVERRIDE_PREFIX)
    }

    /// Same as [`load_from_file`](Self::load_from_file) with a custom override prefix.
    /// Lets tests set overrides without touching the process-wide prefix.
    pub fn load_from_file_with_prefix(
        path: impl AsRef<Path>,
        env_prefix: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_layers(Some(path.as_ref()), env_prefix)
    }

    fn load_layers(path: Option<&Path>, env_prefix: &str) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        let mut defaults = McpSettings::default();
        defaults.environment = environment.clone();

        let mut builder = Config::builder().add_source(Config::try_from(&defaults)?);
        if let Some(path) = path {
            debug!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix(env_prefix)
                .separator(env::OVERRIDE_SEPARATOR)
                .try_parsing(true),
        );

        let settings: McpSettings = builder.build()?.try_deserialize()?;
        settings.validate()?;

        info!(
            environment = %settings.environment,
            providers = settings.providers.len(),
            file = ?path.map(Path::display).map(|p| p.to_string()),
            "⚙️ Configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            environment: settings.environment.clone(),
            settings,
            source_file: path.map(Path::to_path_buf),
        }))
    }

    pub fn settings(&self) -> &McpSettings {
        &self.settings
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn source_file(&self) -> Option<&Path> {
        self.source_file.as_deref()
    }

    /// `MCP_CONFIG_ENV`, then `APP_ENV`, then `development`
    pub fn detect_environment() -> String {
        std::env::var(env::ENVIRONMENT)
            .or_else(|_| std::env::var(env::APP_ENVIRONMENT))
            .unwrap_or_else(|_| "development".to_string())
    }
}
