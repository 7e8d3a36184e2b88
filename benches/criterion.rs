// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::mem::size_of;

const NUM_WORKERS: &[usize] = &[1, 2, 4, 8];
const LENGTHS: &[usize] = &[10_000, 100_000, 1_000_000, 10_000_000];

fn sum(c: &mut Criterion) {
    let mut group = c.benchmark_group("sum");
    for len in LENGTHS {
        group.throughput(Throughput::Bytes((len * size_of::<i32>()) as u64));
        group.bench_with_input(BenchmarkId::new("serial", len), len, serial::sum);
        for &num_workers in NUM_WORKERS {
            group.bench_with_input(
                BenchmarkId::new(format!("rayon@{num_workers}"), len),
                len,
                |bencher, len| rayon::sum(bencher, num_workers, len),
            );
            group.bench_with_input(
                BenchmarkId::new(format!("chunksum@{num_workers}"), len),
                len,
                |bencher, len| chunked::sum(bencher, num_workers, len),
            );
        }
    }
    group.finish();
}

/// Baseline benchmarks using serial iterators (without any multi-threading
/// involved).
mod serial {
    use criterion::{black_box, Bencher};

    pub fn sum(bencher: &mut Bencher, len: &usize) {
        let input = (0..*len as i32).collect::<Vec<i32>>();
        let input_slice = input.as_slice();
        bencher.iter(|| {
            black_box(input_slice)
                .iter()
                .map(|&x| i64::from(x))
                .sum::<i64>()
        });
    }
}

/// Benchmarks using Rayon.
mod rayon {
    use criterion::{black_box, Bencher};
    use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

    pub fn sum(bencher: &mut Bencher, num_workers: usize, len: &usize) {
        let input = (0..*len as i32).collect::<Vec<i32>>();
        let input_slice = input.as_slice();
        let thread_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_workers)
            .build()
            .unwrap();
        bencher.iter(|| {
            thread_pool.install(|| {
                black_box(input_slice)
                    .par_iter()
                    .map(|&x| i64::from(x))
                    .sum::<i64>()
            })
        });
    }
}

/// Benchmarks using Chunksum.
mod chunked {
    use ::chunksum::ThreadPoolBuilder;
    use criterion::{black_box, Bencher};

    pub fn sum(bencher: &mut Bencher, num_workers: usize, len: &usize) {
        let input = (0..*len as i32).collect::<Vec<i32>>();
        let input_slice = input.as_slice();
        ThreadPoolBuilder { num_workers }
            .scope(black_box(input_slice), |pool| {
                bencher.iter(|| pool.sum().unwrap())
            })
            .unwrap();
    }
}

criterion_group!(benches, sum);
criterion_main!(benches);
