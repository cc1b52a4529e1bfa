//! Configuration record types and their validation rules.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Load-balancing mode applied to the resolved instances by the consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadBalanceMode {
    #[default]
    RoundRobin,
    Weighted,
    Random,
}

impl LoadBalanceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadBalanceMode::RoundRobin => "ROUND_ROBIN",
            LoadBalanceMode::Weighted => "WEIGHTED",
            LoadBalanceMode::Random => "RANDOM",
        }
    }
}

impl fmt::Display for LoadBalanceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoadBalanceMode {
    type Err = ValidationError;

    /// An empty mode resolves to round-robin
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "ROUND_ROBIN" => Ok(LoadBalanceMode::RoundRobin),
            "WEIGHTED" => Ok(LoadBalanceMode::Weighted),
            "RANDOM" => Ok(LoadBalanceMode::Random),
            other => Err(ValidationError::InvalidLoadBalanceMode(other.to_string())),
        }
    }
}

/// A single weighted backend instance.
///
/// Numeric fields are kept wide so out-of-range wire values reach validation
/// and are reported as range errors rather than JSON type errors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct McpInstance {
    pub domain: String,
    pub port: i64,
    pub weight: i64,
    pub priority: i64,
}

impl McpInstance {
    pub fn new(domain: impl Into<String>, port: i64, weight: i64, priority: i64) -> Self {
        Self {
            domain: domain.into(),
            port,
            weight,
            priority,
        }
    }

    pub fn validate(&self) -> Result<(), InstanceError> {
        if self.domain.trim().is_empty() {
            return Err(InstanceError::MissingDomain);
        }
        if !(1..=65_535).contains(&self.port) {
            return Err(InstanceError::PortOutOfRange(self.port));
        }
        if !(0..=100).contains(&self.weight) {
            return Err(InstanceError::WeightOutOfRange(self.weight));
        }
        if self.priority < 0 {
            return Err(InstanceError::NegativePriority(self.priority));
        }
        Ok(())
    }
}

/// Resolved MCP configuration. Shared with callers behind an `Arc` and never
/// mutated after it leaves a provider; updates always replace the value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpConfig {
    pub instances: Vec<McpInstance>,
    #[serde(default)]
    pub load_balance_mode: LoadBalanceMode,
}

impl McpConfig {
    /// Build a validated configuration from instances and a mode
    pub fn new(
        instances: Vec<McpInstance>,
        load_balance_mode: LoadBalanceMode,
    ) -> Result<Self, ValidationError> {
        validate_instances(&instances)?;
        Ok(Self {
            instances,
            load_balance_mode,
        })
    }
}

/// Wire shape of a configuration before validation
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawMcpConfig {
    pub instances: Vec<McpInstance>,
    pub load_balance_mode: Option<String>,
}

impl RawMcpConfig {
    /// Legacy payloads carry only instances and always mean round-robin
    pub fn from_legacy(instances: Vec<McpInstance>) -> Self {
        Self {
            instances,
            load_balance_mode: Some(LoadBalanceMode::RoundRobin.as_str().to_string()),
        }
    }

    /// Validate every instance and the mode. Any failure rejects the record.
    pub fn validate(self) -> Result<McpConfig, ValidationError> {
        validate_instances(&self.instances)?;
        let load_balance_mode = match self.load_balance_mode.as_deref() {
            None => LoadBalanceMode::default(),
            Some(mode) => mode.parse()?,
        };
        Ok(McpConfig {
            instances: self.instances,
            load_balance_mode,
        })
    }
}

fn validate_instances(instances: &[McpInstance]) -> Result<(), ValidationError> {
    if instances.is_empty() {
        return Err(ValidationError::NoInstances);
    }
    for (index, instance) in instances.iter().enumerate() {
        instance
            .validate()
            .map_err(|source| ValidationError::Instance { index, source })?;
    }
    Ok(())
}

/// Configuration-level validation failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("at least one instance is required")]
    NoInstances,

    #[error("instance {index} validation failed: {source}")]
    Instance {
        index: usize,
        #[source]
        source: InstanceError,
    },

    #[error("invalid load balance mode: {0}")]
    InvalidLoadBalanceMode(String),
}

/// Per-instance validation failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstanceError {
    #[error("domain is required")]
    MissingDomain,

    #[error("port must be between 1 and 65535, got {0}")]
    PortOutOfRange(i64),

    #[error("weight must be between 0 and 100, got {0}")]
    WeightOutOfRange(i64),

    #[error("priority must be non-negative, got {0}")]
    NegativePriority(i64),
}
