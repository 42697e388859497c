//! Benchmarks for the webhook hot path.
//!
//! Covers signature computation and verification, event parsing with
//! identity derivation, and deduplication set insertion at capacity.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use phonelink_api::{
    crypto::{compute_signature, verify_request},
    DedupSet, DEFAULT_DEDUP_CAPACITY,
};
use phonelink_core::WebhookEvent;
use serde_json::json;

const SECRET: &str = "bench-webhook-secret";
const NOW: i64 = 1_700_000_000;

fn payload(size: usize) -> Vec<u8> {
    let body = json!({
        "event": "phone.callee_call_history_completed",
        "event_ts": NOW * 1000,
        "payload": {
            "account_id": "acct-bench",
            "object": { "call_log_id": "L1", "padding": "x".repeat(size) }
        }
    });
    serde_json::to_vec(&body).unwrap_or_default()
}

/// Signing and verifying bodies of increasing size.
fn bench_signatures(c: &mut Criterion) {
    let mut group = c.benchmark_group("signature");
    let timestamp = NOW.to_string();

    for size in [100, 1_000, 10_000, 100_000] {
        let body = payload(size);
        let signature = compute_signature(SECRET, &timestamp, &body).unwrap_or_default();
        group.throughput(Throughput::Bytes(body.len() as u64));

        group.bench_with_input(BenchmarkId::new("compute", size), &body, |b, body| {
            b.iter(|| compute_signature(black_box(SECRET), black_box(&timestamp), black_box(body)));
        });

        group.bench_with_input(BenchmarkId::new("verify", size), &body, |b, body| {
            b.iter(|| {
                verify_request(
                    black_box(SECRET),
                    Some(signature.as_str()),
                    Some(timestamp.as_str()),
                    black_box(body),
                    NOW,
                )
            });
        });
    }

    group.finish();
}

/// Parsing the vendor envelope and deriving the dedup identity.
fn bench_event_identity(c: &mut Criterion) {
    let body = payload(1_000);

    c.bench_function("event/parse_and_identity", |b| {
        b.iter(|| {
            serde_json::from_slice::<WebhookEvent>(black_box(&body)).map(|event| event.identity())
        });
    });
}

/// Inserting into a full dedup set, evicting one entry per insert.
fn bench_dedup_insert(c: &mut Criterion) {
    let mut set = DedupSet::with_capacity(DEFAULT_DEDUP_CAPACITY);
    for i in 0..DEFAULT_DEDUP_CAPACITY {
        set.insert(format!("phone.callee_ended:seed-{i}"));
    }

    let mut next = 0u64;
    c.bench_function("dedup/insert_at_capacity", |b| {
        b.iter(|| {
            next += 1;
            set.insert(format!("phone.callee_ended:{next}"))
        });
    });

    c.bench_function("dedup/contains", |b| {
        b.iter(|| set.contains(black_box("phone.callee_ended:1")));
    });
}

criterion_group!(benches, bench_signatures, bench_event_identity, bench_dedup_insert);
criterion_main!(benches);
