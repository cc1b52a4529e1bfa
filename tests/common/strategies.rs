//! Proptest strategies for configuration data and cache workloads.

use mcp_config::McpInstance;
use proptest::prelude::*;

pub fn domain_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,10}\\.(com|io|net)"
}

/// Instances that always pass validation
pub fn valid_instance_strategy() -> impl Strategy<Value = McpInstance> {
    (domain_strategy(), 1i64..=65_535, 0i64..=100, 0i64..1_000)
        .prop_map(|(domain, port, weight, priority)| McpInstance::new(domain, port, weight, priority))
}

pub fn valid_instances_strategy() -> impl Strategy<Value = Vec<McpInstance>> {
    prop::collection::vec(valid_instance_strategy(), 1..8)
}

/// Cache workload step
#[derive(Debug, Clone)]
pub enum CacheOp {
    Set(u8),
    Get(u8),
    Delete(u8),
}

pub fn cache_ops_strategy() -> impl Strategy<Value = Vec<CacheOp>> {
    let op = prop_oneof![
        4 => (0u8..16).prop_map(CacheOp::Set),
        3 => (0u8..16).prop_map(CacheOp::Get),
        1 => (0u8..16).prop_map(CacheOp::Delete),
    ];
    prop::collection::vec(op, 1..200)
}
