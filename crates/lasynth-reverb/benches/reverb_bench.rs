//! Criterion benchmarks for the reverb network
//!
//! Run with: cargo bench -p lasynth-reverb
#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use lasynth_reverb::{ReverbMode, ReverbModel};

const BLOCK_SIZES: &[usize] = &[64, 128, 256, 512, 1024];

fn generate_test_signal(frames: usize) -> Vec<i16> {
    (0..frames * 2)
        .map(|i| (((i as i32 * 7919) % 32768) - 16384) as i16)
        .collect()
}

fn bench_modes(c: &mut Criterion) {
    let mut group = c.benchmark_group("ReverbModel");

    for mode in ReverbMode::ALL {
        for &block_size in BLOCK_SIZES {
            let input = generate_test_signal(block_size);
            let mut output = vec![0i16; block_size * 2];
            group.bench_with_input(
                BenchmarkId::new(format!("{:?}", mode), block_size),
                &block_size,
                |b, _| {
                    let mut reverb = ReverbModel::new();
                    reverb.configure(mode, 5, 5);
                    b.iter(|| {
                        for (src, dst) in input.chunks_exact(2).zip(output.chunks_exact_mut(2)) {
                            let (l, r) = reverb.process(black_box(src[0]), black_box(src[1]));
                            dst[0] = l;
                            dst[1] = r;
                        }
                        black_box(&output);
                    });
                },
            );
        }
    }

    group.finish();
}

criterion_group!(benches, bench_modes);
criterion_main!(benches);
