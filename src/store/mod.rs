//! # Configuration Store Seam
//!
//! The boundary between providers and the cluster-native configuration store.
//! The platform SDK supplies the real client; providers only depend on the
//! [`ConfigStore`] trait, which exposes point reads, labeled listing and a
//! typed change feed.
//!
//! [`InMemoryStore`] implements the seam in-process with fault injection and is
//! what the test suites and local demos run against.

pub mod memory;

pub use memory::InMemoryStore;

use crate::constants::{MANAGED_LABEL_KEY, MANAGED_LABEL_VALUE};
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Resource kinds addressable in the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    ConfigMap,
    Secret,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::ConfigMap => f.write_str("ConfigMap"),
            ResourceKind::Secret => f.write_str("Secret"),
        }
    }
}

/// A namespace-scoped store object with string data entries
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StoreObject {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl StoreObject {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Attach the MCP management label so watches observe this object
    pub fn managed(self) -> Self {
        self.with_label(MANAGED_LABEL_KEY, MANAGED_LABEL_VALUE)
    }

    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

/// Change-feed event classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoreEventKind {
    Added,
    Modified,
    Deleted,
    /// Resource-version checkpoint with no object change; consumers ignore it
    Bookmark,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEvent {
    pub kind: StoreEventKind,
    pub object: StoreObject,
}

/// Change feed yielded by [`ConfigStore::watch`]. The stream ending means the
/// subscription closed and must be reopened.
pub type StoreEventStream = BoxStream<'static, Result<StoreEvent, StoreError>>;

/// Errors reported by the backing store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: ResourceKind,
        namespace: String,
        name: String,
    },

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("request throttled: {0}")]
    Throttled(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("watch subscription closed")]
    WatchClosed,

    #[error("store error: {0}")]
    Other(String),
}

impl StoreError {
    /// Terminal errors are never retried
    pub fn is_terminal(&self) -> bool {
        matches!(self, StoreError::NotFound { .. } | StoreError::Forbidden(_))
    }
}

/// Equality-based label selector, rendered as `k1=v1,k2=v2`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LabelSelector {
    requirements: BTreeMap<String, String>,
}

impl LabelSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Selector matching MCP-managed objects only
    pub fn managed() -> Self {
        Self::new().with(MANAGED_LABEL_KEY, MANAGED_LABEL_VALUE)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.requirements.insert(key.into(), value.into());
        self
    }

    /// Parse `k=v` pairs separated by commas. Blank input selects everything.
    pub fn parse(selector: &str) -> Result<Self, String> {
        let mut parsed = Self::new();
        for clause in selector.split(',').map(str::trim).filter(|c| !c.is_empty()) {
            let (key, value) = clause
                .split_once('=')
                .ok_or_else(|| format!("invalid selector clause '{clause}', expected key=value"))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(format!("invalid selector clause '{clause}', empty key"));
            }
            parsed = parsed.with(key, value.trim());
        }
        Ok(parsed)
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements
            .iter()
            .all(|(key, value)| labels.get(key) == Some(value))
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .requirements
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        f.write_str(&rendered.join(","))
    }
}

/// Client-side view of the configuration store.
///
/// Implementations must be safe to share across provider tasks.
#[async_trait]
pub trait ConfigStore: Send + Sync + fmt::Debug {
    async fn get(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<StoreObject, StoreError>;

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<StoreObject>, StoreError>;

    /// Open a change feed for objects of `kind` in `namespace` matching `selector`
    async fn watch(
        &self,
        kind: ResourceKind,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<StoreEventStream, StoreError>;
}
