//! Payload parsing for store records.
//!
//! A record holds either a structured document under `config` or a legacy
//! instance array under `instances`. The structured key wins when both exist.

use super::mcp_config::{McpInstance, RawMcpConfig};
use crate::constants::payload::{CONFIG_KEY, INSTANCES_KEY};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("missing both 'config' and 'instances' keys")]
    MissingPayload,

    #[error("failed to decode '{key}' entry: {reason}")]
    Decode { key: String, reason: String },

    #[error("invalid JSON in '{key}' entry: {source}")]
    InvalidJson {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Parse already-decoded record entries into an unvalidated configuration
pub fn parse_payload(data: &BTreeMap<String, String>) -> Result<RawMcpConfig, ParseError> {
    if let Some(document) = data.get(CONFIG_KEY) {
        return serde_json::from_str::<RawMcpConfig>(document).map_err(|source| {
            ParseError::InvalidJson {
                key: CONFIG_KEY.to_string(),
                source,
            }
        });
    }

    if let Some(document) = data.get(INSTANCES_KEY) {
        let instances: Vec<McpInstance> =
            serde_json::from_str(document).map_err(|source| ParseError::InvalidJson {
                key: INSTANCES_KEY.to_string(),
                source,
            })?;
        return Ok(RawMcpConfig::from_legacy(instances));
    }

    Err(ParseError::MissingPayload)
}
