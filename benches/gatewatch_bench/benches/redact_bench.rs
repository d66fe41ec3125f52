//! Masking and body decoding benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use gatewatch_core::body::BodyCodec;
use gatewatch_core::exchange::RawBody;
use gatewatch_core::redact::{mask_value, SensitiveKeys};
use serde_json::{json, Value};

/// A body with `n` order lines, each carrying a sensitive field
fn order_body(lines: usize) -> Value {
    let items: Vec<Value> = (0..lines)
        .map(|i| {
            json!({
                "sku": format!("SKU-{:05}", i),
                "quantity": i % 7 + 1,
                "payment": {"card_number": "4111111111111111", "ccv": 123},
                "notes": "leave at the door"
            })
        })
        .collect();
    json!({"customer": {"name": "ada", "password": "hunter2"}, "items": items})
}

fn bench_mask_value(c: &mut Criterion) {
    let mut group = c.benchmark_group("mask_value");
    let keys = SensitiveKeys::with_defaults(["authorization", "token"]);

    for lines in [1, 10, 100, 1000] {
        let body = order_body(lines);
        group.bench_with_input(BenchmarkId::new("order_lines", lines), &body, |b, body| {
            b.iter(|| mask_value(black_box(body), &keys))
        });
    }

    group.finish();
}

fn bench_body_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("body_decode");
    let codec = BodyCodec::default();

    for lines in [10, 1000] {
        let raw = RawBody::from(order_body(lines).to_string());
        group.throughput(Throughput::Bytes(raw.size() as u64));
        group.bench_with_input(BenchmarkId::new("json", lines), &raw, |b, raw| {
            b.iter(|| codec.decode(black_box(Some(raw)), Some("application/json")))
        });
    }

    let oversized = RawBody::from(vec![b'x'; 3 * 1024 * 1024]);
    group.bench_function("oversized", |b| {
        b.iter(|| codec.decode(black_box(Some(&oversized)), Some("application/json")))
    });

    group.finish();
}

criterion_group!(benches, bench_mask_value, bench_body_decode);
criterion_main!(benches);
