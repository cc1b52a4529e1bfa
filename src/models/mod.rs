//! # MCP Configuration Models
//!
//! The canonical configuration record handed to callers, plus the lenient wire
//! shape it is decoded from. Wire records are parsed into [`RawMcpConfig`] and
//! only become an [`McpConfig`] after every instance passes validation, so a
//! caller never sees a partially valid configuration.

pub mod mcp_config;
pub mod payload;

pub use mcp_config::{
    InstanceError, LoadBalanceMode, McpConfig, McpInstance, RawMcpConfig, ValidationError,
};
pub use payload::{parse_payload, ParseError};
