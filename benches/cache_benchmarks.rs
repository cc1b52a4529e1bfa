use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mcp_config::models::parse_payload;
use mcp_config::{ConfigCache, LoadBalanceMode, McpConfig, McpInstance};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

fn sample_config() -> Arc<McpConfig> {
    Arc::new(
        McpConfig::new(
            vec![McpInstance::new("bench.example.com", 8080, 50, 0)],
            LoadBalanceMode::RoundRobin,
        )
        .unwrap(),
    )
}

fn benchmark_cache_set_with_eviction(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_set_evicting");
    for size in [100usize, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let cache = ConfigCache::new(Duration::from_secs(300), size, true);
            let config = sample_config();
            let mut next = 0usize;
            b.iter(|| {
                cache.set(&format!("config-{next}"), Arc::clone(&config));
                next += 1;
            });
        });
    }
    group.finish();
}

fn benchmark_cache_get_hit(c: &mut Criterion) {
    let cache = ConfigCache::new(Duration::from_secs(300), 1_000, true);
    let config = sample_config();
    for i in 0..1_000 {
        cache.set(&format!("config-{i}"), Arc::clone(&config));
    }

    let mut next = 0usize;
    c.bench_function("cache_get_hit_lru", |b| {
        b.iter(|| {
            let found = cache.get(black_box(&format!("config-{}", next % 1_000)));
            next += 1;
            found
        })
    });
}

fn benchmark_parse_legacy_payload(c: &mut Criterion) {
    let instances: Vec<String> = (0..20)
        .map(|i| format!(r#"{{"domain":"svc{i}.example.com","port":{},"weight":50}}"#, 8000 + i))
        .collect();
    let mut entries = BTreeMap::new();
    entries.insert("instances".to_string(), format!("[{}]", instances.join(",")));

    c.bench_function("parse_legacy_payload", |b| {
        b.iter(|| parse_payload(black_box(&entries)).map(|raw| raw.validate()))
    });
}

criterion_group!(
    benches,
    benchmark_cache_set_with_eviction,
    benchmark_cache_get_hit,
    benchmark_parse_legacy_payload
);
criterion_main!(benches);
