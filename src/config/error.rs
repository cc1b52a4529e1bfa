//! Configuration Error Types
//!
//! Errors raised while loading settings from files and the environment, or
//! while validating provider policies against their allowed ranges.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Configuration file not found: {path}")]
    ConfigFileNotFound { path: PathBuf },

    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Invalid value '{value}' for field '{field}': {context}")]
    InvalidValue {
        field: String,
        value: String,
        context: String,
    },

    /// Every violated constraint, reported together
    #[error("Configuration validation failed: {}", errors.join("; "))]
    ValidationFailed { errors: Vec<String> },
}

impl ConfigurationError {
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl ToString,
        context: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.to_string(),
            context: context.into(),
        }
    }

    pub fn validation(errors: Vec<String>) -> Self {
        Self::ValidationFailed { errors }
    }

    /// Individual constraint messages, when this is a validation failure
    pub fn violations(&self) -> &[String] {
        match self {
            Self::ValidationFailed { errors } => errors,
            _ => &[],
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigurationError>;
