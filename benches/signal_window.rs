//! Benchmarks for the rolling signal window

use chrono::{Duration, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use poly_latency::config::SignalConfig;
use poly_latency::signal::SignalDetector;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn random_walk(n: usize) -> Vec<Decimal> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    let mut price = dec!(100000);
    (0..n)
        .map(|_| {
            let step: i64 = rng.gen_range(-50..=50);
            price += Decimal::new(step, 1);
            price
        })
        .collect()
}

fn benchmark_observe(c: &mut Criterion) {
    let prices = random_walk(10_000);
    let start = Utc::now();

    c.bench_function("signal_observe_10k", |b| {
        b.iter(|| {
            let mut detector = SignalDetector::new(&SignalConfig::default());
            for (i, price) in prices.iter().enumerate() {
                detector.observe(
                    "BTCUSDT",
                    *price,
                    start + Duration::milliseconds(i as i64 * 100),
                );
            }
            black_box(detector.sample_count("BTCUSDT"))
        })
    });
}

fn benchmark_current_signal(c: &mut Criterion) {
    let prices = random_walk(600);
    let start = Utc::now();
    let mut detector = SignalDetector::new(&SignalConfig::default());
    for (i, price) in prices.iter().enumerate() {
        detector.observe("BTCUSDT", *price, start + Duration::milliseconds(i as i64 * 100));
    }

    c.bench_function("signal_current", |b| {
        b.iter(|| detector.current_signal(black_box("BTCUSDT")))
    });
}

criterion_group!(benches, benchmark_observe, benchmark_current_signal);
criterion_main!(benches);
