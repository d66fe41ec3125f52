//! End-to-end pipeline latency benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gatewatch_core::context::vars;
use gatewatch_core::prelude::*;
use http::{HeaderMap, HeaderValue};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;

fn typical_exchange() -> Exchange {
    let mut headers = HeaderMap::new();
    headers.insert("content-type", HeaderValue::from_static("application/json"));
    headers.insert("user-agent", HeaderValue::from_static("Mozilla/5.0"));
    headers.insert("authorization", HeaderValue::from_static("Bearer token"));
    headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.5"));

    Exchange::new(
        ObservedRequest::new("POST", "https://api.example.com/v1/users?page=1&limit=20")
            .with_path("/users")
            .with_headers(headers.clone())
            .with_body(json!({"name": "ada", "email": "ada@example.com", "password": "hunter2"})),
        ObservedResponse::new(201)
            .with_headers(headers)
            .with_body(r#"{"id":42,"name":"ada"}"#),
    )
}

fn context() -> MapContext {
    MapContext::new()
        .with(vars::SDK_TOKEN, "sdk-token")
        .with(vars::PROJECT_ID, "project-42")
        .with(vars::CLIENT_IP, "10.0.0.1")
}

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");
    let pipeline = Pipeline::new(ObserverConfig::new().masking_keywords(["authorization"]));
    let exchange = typical_exchange();
    let ctx = context();
    let mut rng = StdRng::seed_from_u64(0);

    group.bench_function("process", |b| {
        b.iter(|| pipeline.process(black_box(&exchange), &ctx, &mut rng))
    });

    let mut blocked = typical_exchange();
    blocked.request.path = Some("/health".to_string());
    group.bench_function("blocked", |b| {
        b.iter(|| pipeline.process(black_box(&blocked), &ctx, &mut rng))
    });

    group.finish();
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
