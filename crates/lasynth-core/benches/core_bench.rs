//! Criterion benchmarks for lasynth-core primitives
//!
//! Run with: cargo bench -p lasynth-core
#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use lasynth_core::{RingBuffer, serial_mul, soft_saturate};

const BLOCK_SIZES: &[usize] = &[64, 128, 256, 512, 1024];

fn generate_test_signal(size: usize) -> Vec<i32> {
    (0..size)
        .map(|i| ((i as i32 * 7919) % 65536) - 32768)
        .collect()
}

fn bench_serial_mul(c: &mut Criterion) {
    let mut group = c.benchmark_group("SerialMul");

    for &block_size in BLOCK_SIZES {
        let input = generate_test_signal(block_size);
        group.bench_with_input(
            BenchmarkId::new("mask_0xA0", block_size),
            &block_size,
            |b, _| {
                b.iter(|| {
                    for &sample in &input {
                        black_box(serial_mul(black_box(sample), 0xA0, 0xC0));
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_soft_saturate(c: &mut Criterion) {
    let mut group = c.benchmark_group("SoftSaturate");

    for &block_size in BLOCK_SIZES {
        let input: Vec<i32> = generate_test_signal(block_size)
            .into_iter()
            .map(|s| s * 2)
            .collect();
        group.bench_with_input(
            BenchmarkId::new("process", block_size),
            &block_size,
            |b, _| {
                b.iter(|| {
                    for &sample in &input {
                        black_box(soft_saturate(black_box(sample)));
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_ring_buffer(c: &mut Criterion) {
    let mut group = c.benchmark_group("RingBuffer");

    for &block_size in BLOCK_SIZES {
        let input = generate_test_signal(block_size);
        group.bench_with_input(
            BenchmarkId::new("store_advance_tap", block_size),
            &block_size,
            |b, _| {
                let mut ring = RingBuffer::new(4096);
                b.iter(|| {
                    for &sample in &input {
                        ring.store(sample as i16);
                        ring.advance();
                        black_box(ring.tap(1500));
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_serial_mul,
    bench_soft_saturate,
    bench_ring_buffer
);
criterion_main!(benches);
