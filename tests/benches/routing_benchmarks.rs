//! # Billing Pipeline Benchmarks
//!
//! | Area | Operation |
//! |------|-----------|
//! | Router | Matching one envelope against the production table |
//! | Router | Matching against a wide table |
//! | Bundles | Building and hashing a function bundle |
//! | Planner | Ordering the production topology |

use billing_bus::RoutingTable;
use billing_deploy::{build_plan, BundleBuilder, DeployConfig, TopologyDescriptor};
use billing_types::{AccountContext, EventEnvelope, EventPattern, RuleSpec, RuleState};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;

fn account() -> AccountContext {
    AccountContext::new("ap-southeast-1", "123456789012")
}

fn bench_production_matching(c: &mut Criterion) {
    let descriptor = TopologyDescriptor::billing_default(&DeployConfig::default());
    let table = descriptor.routing_table(&account());
    let hit = EventEnvelope::new(
        "billing.payment.received",
        "Payment Confirmation Required",
        json!({"payment_id": "P-1"}),
        "billing-events",
    );
    let miss = EventEnvelope::new("billing.audit", "Audit", json!({}), "billing-events");

    let mut group = c.benchmark_group("router-production");
    group.bench_function("match_hit", |b| b.iter(|| black_box(table.matching(&hit).len())));
    group.bench_function("match_miss", |b| b.iter(|| black_box(table.matching(&miss).len())));
    group.finish();
}

fn bench_wide_table(c: &mut Criterion) {
    let mut group = c.benchmark_group("router-wide");
    for rules in [10usize, 100, 1000] {
        let specs: Vec<RuleSpec> = (0..rules)
            .map(|i| RuleSpec {
                bus_name: "billing-events".into(),
                name: format!("Rule{i}"),
                pattern: EventPattern::single(format!("billing.source.{i}"), "Generated"),
                state: RuleState::Enabled,
                description: None,
            })
            .collect();
        let table = RoutingTable::from_parts("billing-events", &account(), &specs, &[], &[]);
        let envelope = EventEnvelope::new(
            format!("billing.source.{}", rules - 1),
            "Generated",
            json!({}),
            "billing-events",
        );

        group.throughput(Throughput::Elements(rules as u64));
        group.bench_with_input(BenchmarkId::new("match_last", rules), &rules, |b, _| {
            b.iter(|| black_box(table.matching(&envelope).len()))
        });
    }
    group.finish();
}

fn bench_bundle(c: &mut Criterion) {
    let mut group = c.benchmark_group("bundle");
    for files in [1usize, 50, 500] {
        let contents: Vec<(String, Vec<u8>)> = (0..files)
            .map(|i| (format!("deps/pkg_{i}.py"), vec![b'x'; 4096]))
            .collect();
        group.throughput(Throughput::Bytes((files * 4096) as u64));
        group.bench_with_input(BenchmarkId::new("build", files), &contents, |b, contents| {
            b.iter(|| {
                let mut builder = BundleBuilder::new()
                    .entry("risk_agent.py", b"def lambda_handler(e, c): pass".to_vec())
                    .expect("entry");
                for (path, bytes) in contents {
                    builder = builder.file(path, bytes.clone()).expect("file");
                }
                black_box(builder.build().expect("bundle").sha256().len())
            })
        });
    }
    group.finish();
}

fn bench_plan(c: &mut Criterion) {
    let descriptor = TopologyDescriptor::billing_default(&DeployConfig::default());
    c.bench_function("plan_production", |b| {
        b.iter(|| black_box(build_plan(&descriptor).expect("plan").len()))
    });
}

criterion_group!(
    benches,
    bench_production_matching,
    bench_wide_table,
    bench_bundle,
    bench_plan
);
criterion_main!(benches);
