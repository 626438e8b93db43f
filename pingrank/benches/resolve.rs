//! Benchmarks for rank resolution.
//!
//! Measures dedup-by-latest plus ranking over windows of increasing size,
//! with many samples per peer the way polled telemetry looks.
//!
//! Run with: `cargo bench -p pingrank -- resolve`

#![allow(missing_docs, clippy::cast_precision_loss, clippy::cast_possible_wrap)]

use chrono::{DateTime, TimeZone, Utc};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use pingrank::resolver::{dedup_latest, resolve};
use pingrank::{Bounds, Direction, FixedSide, Sample};

fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_714_564_800 + secs, 0).single().unwrap_or_default()
}

/// `peers` peers, each polled `polls` times, interleaved.
fn window(peers: usize, polls: usize) -> Vec<Sample> {
    let mut samples = Vec::with_capacity(peers * polls);
    for poll in 0..polls {
        for peer in 0..peers {
            let latency = ((peer * 31 + poll * 7) % 250) as f64 + 0.5;
            samples.push(
                Sample::new("us-east-1", format!("peer-{peer}"), ts((poll * 60) as i64), latency)
                    .unwrap(),
            );
        }
    }
    samples
}

fn bench_resolve(c: &mut Criterion) {
    let side = FixedSide::Origin("us-east-1".to_string());
    let mut group = c.benchmark_group("resolve");

    for (peers, polls) in [(30, 12), (30, 720), (500, 60)] {
        let samples = window(peers, polls);
        group.bench_with_input(
            BenchmarkId::new("lowest_rank_1", format!("{peers}x{polls}")),
            &samples,
            |b, samples| {
                b.iter(|| {
                    black_box(resolve(
                        black_box(samples),
                        &side,
                        1,
                        Direction::Lowest,
                        Bounds::Unbounded,
                    ))
                });
            },
        );
    }

    group.finish();
}

fn bench_dedup(c: &mut Criterion) {
    let side = FixedSide::Origin("us-east-1".to_string());
    let samples = window(500, 60);

    c.bench_function("dedup_latest_500x60", |b| {
        b.iter(|| black_box(dedup_latest(black_box(&samples), &side)).len());
    });
}

criterion_group!(benches, bench_resolve, bench_dedup);
criterion_main!(benches);
