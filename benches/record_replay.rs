//! Benchmarks for capture, replay and eviction

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;

use tapedeck::fingerprint::{derive_key, Method};
use tapedeck::intercept::{Call, Response};
use tapedeck::persist::evict;
use tapedeck::rules::{RuleField, RuleSet};
use tapedeck::store::RecordStore;
use tapedeck::Engine;

const SITE: &str = "https://app.test";

fn populated_engine(endpoints: usize) -> Engine {
    let engine = Engine::new(SITE);
    engine.set_rule(RuleField::Switch, json!(true)).unwrap();
    engine
        .set_rule(RuleField::ExcludeRegexp, json!("/health$"))
        .unwrap();

    for i in 0..endpoints {
        let call = Call::post(format!("https://api.test/items/{i}"), json!({"page": i}));
        engine.on_response(&call, &Ok(Response::new(200, json!({"id": i}))));
    }
    engine
}

fn bench_capture(c: &mut Criterion) {
    let engine = populated_engine(100);
    let call = Call::post("https://api.test/items/50", json!({"page": 50}));
    let response = Ok(Response::new(200, json!({"id": 50, "name": "item"})));

    c.bench_function("capture_existing_variant", |b| {
        b.iter(|| engine.on_response(black_box(&call), black_box(&response)));
    });
}

fn bench_serve(c: &mut Criterion) {
    let engine = populated_engine(1_000);
    let hit = Call::post("https://api.test/items/500", json!({"page": 500}));
    let miss = Call::post("https://api.test/items/500", json!({"page": -1}));

    c.bench_function("serve_hit", |b| {
        b.iter(|| engine.on_request(black_box(&hit)));
    });

    c.bench_function("serve_miss", |b| {
        b.iter(|| engine.on_request(black_box(&miss)));
    });
}

fn bench_eviction(c: &mut Criterion) {
    let rules = RuleSet::default();
    let mut store = RecordStore::new();
    for i in 0..500u64 {
        let url = format!("https://api.test/items/{i}");
        let key = derive_key(SITE, Method::Get, &url, None::<&()>, false);
        store.capture(&key, json!({"data": "x".repeat(1_000)}), 200, i);
    }

    c.bench_function("evict_half_of_500_endpoints", |b| {
        b.iter(|| {
            let mut working = store.clone();
            evict(&mut working, &rules, 250_000).unwrap()
        });
    });
}

criterion_group!(benches, bench_capture, bench_serve, bench_eviction);
criterion_main!(benches);
