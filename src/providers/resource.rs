//! Store resource markers selecting how a record's entries are decoded.

use crate::config::ConfigSource;
use crate::constants::payload::ALL_KEYS;
use crate::models::ParseError;
use crate::store::{ResourceKind, StoreObject};
use base64::Engine as _;
use std::collections::BTreeMap;

/// Compile-time description of a store-backed resource kind
pub trait StoreResource: Send + Sync + 'static {
    const KIND: ResourceKind;
    const SOURCE: ConfigSource;

    /// Turn a raw stored entry into payload text
    fn decode_entry(key: &str, raw: &str) -> Result<String, ParseError>;

    /// Decode the payload entries present in `object`
    fn decode_payload(object: &StoreObject) -> Result<BTreeMap<String, String>, ParseError> {
        ALL_KEYS
            .iter()
            .filter_map(|key| {
                object
                    .data
                    .get(*key)
                    .map(|raw| Self::decode_entry(key, raw).map(|text| (key.to_string(), text)))
            })
            .collect()
    }
}

/// Plain-text entries
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigMapResource;

impl StoreResource for ConfigMapResource {
    const KIND: ResourceKind = ResourceKind::ConfigMap;
    const SOURCE: ConfigSource = ConfigSource::ConfigMap;

    fn decode_entry(_key: &str, raw: &str) -> Result<String, ParseError> {
        Ok(raw.to_string())
    }
}

/// Base64-encoded entries
#[derive(Debug, Clone, Copy, Default)]
pub struct SecretResource;

impl StoreResource for SecretResource {
    const KIND: ResourceKind = ResourceKind::Secret;
    const SOURCE: ConfigSource = ConfigSource::Secret;

    fn decode_entry(key: &str, raw: &str) -> Result<String, ParseError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(raw.trim())
            .map_err(|e| ParseError::Decode {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        String::from_utf8(bytes).map_err(|e| ParseError::Decode {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }
}
