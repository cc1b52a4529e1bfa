//! # Error Types
//!
//! Provider-level errors carry enough structure for callers to tell a missing
//! configuration from an unhealthy store, a policy rejection or bad data. The
//! manager adds registration errors and [`AggregateError`], which keeps every
//! failing source and its original error when a multi-provider operation
//! partially fails.

use crate::config::ConfigSource;
use crate::models::{ParseError, ValidationError};
use crate::registry::RegistryError;
use crate::store::StoreError;
use std::fmt;
use thiserror::Error;

/// Errors raised by a single provider
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("config reference cannot be empty")]
    EmptyReference,

    /// Terminal store error, surfaced without retrying
    #[error("failed to get {config_ref}: {source}")]
    Store {
        config_ref: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to get {config_ref} after {attempts} attempts: {source}")]
    RetriesExhausted {
        config_ref: String,
        attempts: u32,
        #[source]
        source: StoreError,
    },

    #[error("failed to parse {config_ref}: {source}")]
    Parse {
        config_ref: String,
        #[source]
        source: ParseError,
    },

    #[error("invalid configuration {config_ref}: {source}")]
    Validation {
        config_ref: String,
        #[source]
        source: ValidationError,
    },

    #[error("rate limit exceeded for provider {provider}")]
    RateLimited { provider: String },

    #[error("circuit breaker is open for {component}")]
    CircuitOpen { component: String },

    #[error("provider {provider} already started")]
    AlreadyWatching { provider: String },

    #[error("provider {provider} unavailable: {reason}")]
    Unavailable { provider: String, reason: String },

    #[error("provider {provider} failed to stop: {reason}")]
    StopFailed { provider: String, reason: String },

    #[error("operation cancelled")]
    Cancelled,
}

/// Coarse classification of a [`ProviderError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    NotFound,
    Forbidden,
    /// Store or network trouble that may clear on its own
    Transient,
    /// The configuration itself or the request is malformed
    Invalid,
    /// Rejected by rate limiting or an open circuit, store untouched
    Rejected,
    Conflict,
    Cancelled,
    Internal,
}

impl ProviderError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ProviderError::Store { source, .. } => match source {
                StoreError::NotFound { .. } => ErrorClass::NotFound,
                StoreError::Forbidden(_) => ErrorClass::Forbidden,
                _ => ErrorClass::Transient,
            },
            ProviderError::RetriesExhausted { .. } | ProviderError::Unavailable { .. } => {
                ErrorClass::Transient
            }
            ProviderError::EmptyReference
            | ProviderError::Parse { .. }
            | ProviderError::Validation { .. } => ErrorClass::Invalid,
            ProviderError::RateLimited { .. } | ProviderError::CircuitOpen { .. } => {
                ErrorClass::Rejected
            }
            ProviderError::AlreadyWatching { .. } => ErrorClass::Conflict,
            ProviderError::Cancelled => ErrorClass::Cancelled,
            ProviderError::StopFailed { .. } => ErrorClass::Internal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.class() == ErrorClass::NotFound
    }
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Which multi-provider operation a [`SourceError`] came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceOperation {
    Watch,
    Stop,
}

/// One source's failure inside an aggregate
#[derive(Debug, Error)]
pub struct SourceError {
    pub config_source: ConfigSource,
    pub operation: SourceOperation,
    #[source]
    pub error: ProviderError,
}

impl SourceError {
    pub fn watch(config_source: ConfigSource, error: ProviderError) -> Self {
        Self {
            config_source,
            operation: SourceOperation::Watch,
            error,
        }
    }

    pub fn stop(config_source: ConfigSource, error: ProviderError) -> Self {
        Self {
            config_source,
            operation: SourceOperation::Stop,
            error,
        }
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operation {
            SourceOperation::Watch => write!(
                f,
                "failed to start watching for source {}: {}",
                self.config_source, self.error
            ),
            SourceOperation::Stop => write!(
                f,
                "failed to stop provider for source {}: {}",
                self.config_source, self.error
            ),
        }
    }
}

/// Every failure from a multi-provider operation, one entry per source
#[derive(Debug, Default)]
pub struct AggregateError {
    errors: Vec<SourceError>,
}

impl AggregateError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: SourceError) {
        self.errors.push(error);
    }

    pub fn errors(&self) -> &[SourceError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<SourceError> {
        self.errors
    }

    pub fn sources(&self) -> Vec<&ConfigSource> {
        self.errors.iter().map(|e| &e.config_source).collect()
    }

    /// The original error reported by `source`, if it failed
    pub fn error_for(&self, source: &ConfigSource) -> Option<&ProviderError> {
        self.errors
            .iter()
            .find(|e| &e.config_source == source)
            .map(|e| &e.error)
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// `Ok(())` when nothing failed
    pub fn into_result(self) -> Result<(), AggregateError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.len() {
            1 => writeln!(f, "1 error occurred:")?,
            n => writeln!(f, "{n} errors occurred:")?,
        }
        for error in &self.errors {
            writeln!(f, "\t* {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.errors
            .first()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl FromIterator<SourceError> for AggregateError {
    fn from_iter<I: IntoIterator<Item = SourceError>>(iter: I) -> Self {
        Self {
            errors: iter.into_iter().collect(),
        }
    }
}

/// Errors raised by the provider manager
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("provider for source {config_source} already registered")]
    DuplicateProvider { config_source: ConfigSource },

    #[error("no provider registered for source {config_source}")]
    NoProvider { config_source: ConfigSource },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("start watching failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<ManagerError>,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("manager setup failed: {0}")]
    Setup(String),
}

impl ManagerError {
    /// The aggregate behind this error, looking through retry exhaustion
    pub fn aggregate(&self) -> Option<&AggregateError> {
        match self {
            ManagerError::Aggregate(aggregate) => Some(aggregate),
            ManagerError::RetriesExhausted { last, .. } => last.aggregate(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    fn unavailable(reason: &str) -> ProviderError {
        ProviderError::Unavailable {
            provider: "mock".into(),
            reason: reason.into(),
        }
    }

    #[test]
    fn test_classification() {
        let not_found = ProviderError::Store {
            config_ref: "a".into(),
            source: StoreError::NotFound {
                kind: crate::store::ResourceKind::ConfigMap,
                namespace: "ns".into(),
                name: "a".into(),
            },
        };
        assert_eq!(not_found.class(), ErrorClass::NotFound);
        assert!(not_found.is_not_found());
        assert_eq!(
            ProviderError::Store {
                config_ref: "a".into(),
                source: StoreError::Forbidden("rbac".into())
            }
            .class(),
            ErrorClass::Forbidden
        );
        assert_eq!(
            ProviderError::RateLimited {
                provider: "p".into()
            }
            .class(),
            ErrorClass::Rejected
        );
        assert_eq!(ProviderError::EmptyReference.class(), ErrorClass::Invalid);
        assert_eq!(ProviderError::Cancelled.class(), ErrorClass::Cancelled);
    }

    #[test]
    fn test_aggregate_formats_one_failure_per_line() {
        let aggregate: AggregateError = vec![
            SourceError::watch(ConfigSource::Secret, unavailable("connection timeout")),
            SourceError::watch(ConfigSource::Etcd, unavailable("permission denied")),
        ]
        .into_iter()
        .collect();

        let text = aggregate.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "2 errors occurred:");
        assert!(lines[1].contains("source secret") && lines[1].contains("connection timeout"));
        assert!(lines[2].contains("source etcd") && lines[2].contains("permission denied"));
        assert_eq!(
            aggregate.sources(),
            vec![&ConfigSource::Secret, &ConfigSource::Etcd]
        );
    }

    #[test]
    fn test_aggregate_preserves_original_errors() {
        let mut aggregate = AggregateError::new();
        aggregate.push(SourceError::stop(ConfigSource::ConfigMap, ProviderError::Cancelled));

        assert!(matches!(
            aggregate.error_for(&ConfigSource::ConfigMap),
            Some(ProviderError::Cancelled)
        ));
        assert!(aggregate.error_for(&ConfigSource::Secret).is_none());

        let source = aggregate.source().unwrap();
        let inner = source.source().unwrap();
        assert!(inner.downcast_ref::<ProviderError>().is_some());
        assert!(aggregate.to_string().contains("failed to stop provider for source configmap"));
    }

    #[test]
    fn test_empty_aggregate_is_ok() {
        assert!(AggregateError::new().into_result().is_ok());
    }

    #[test]
    fn test_retries_exhausted_exposes_aggregate() {
        let aggregate: AggregateError =
            std::iter::once(SourceError::watch(ConfigSource::Consul, unavailable("down"))).collect();
        let error = ManagerError::RetriesExhausted {
            attempts: 3,
            last: Box::new(ManagerError::Aggregate(aggregate)),
        };

        assert!(error.to_string().contains("failed after 3 attempts"));
        assert_eq!(error.aggregate().map(AggregateError::len), Some(1));
    }
}
