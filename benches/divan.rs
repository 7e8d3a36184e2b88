// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

fn main() {
    divan::main();
}

const NUM_WORKERS: &[usize] = &[1, 2, 4, 8];
const LENGTHS: &[usize] = &[10_000, 100_000, 1_000_000];

/// Baseline benchmarks using serial iterators (without any multi-threading
/// involved).
mod serial {
    use super::LENGTHS;
    use divan::counter::BytesCount;
    use divan::{black_box, Bencher};

    #[divan::bench(args = LENGTHS)]
    fn sum(bencher: Bencher, len: usize) {
        let input = (0..len as i32).collect::<Vec<i32>>();
        let input_slice = input.as_slice();
        bencher
            .counter(BytesCount::of_many::<i32>(len))
            .bench_local(|| {
                black_box(input_slice)
                    .iter()
                    .map(|&x| i64::from(x))
                    .sum::<i64>()
            })
    }
}

/// Benchmarks using Rayon.
mod rayon {
    use super::{LENGTHS, NUM_WORKERS};
    use divan::counter::BytesCount;
    use divan::{black_box, Bencher};
    use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

    #[divan::bench(consts = NUM_WORKERS, args = LENGTHS)]
    fn sum_rayon<const NUM_WORKERS: usize>(bencher: Bencher, len: usize) {
        let input = (0..len as i32).collect::<Vec<i32>>();
        let input_slice = input.as_slice();
        let thread_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(NUM_WORKERS)
            .build()
            .unwrap();
        // Ideally we'd prefer to run bench_local() inside the Rayon thread pool, but
        // that doesn't work because divan::Bencher isn't Send (and bench_local()
        // consumes it).
        bencher
            .counter(BytesCount::of_many::<i32>(len))
            .bench_local(|| {
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
    use super::{LENGTHS, NUM_WORKERS};
    use chunksum::ThreadPoolBuilder;
    use divan::counter::BytesCount;
    use divan::{black_box, Bencher};

    #[divan::bench(consts = NUM_WORKERS, args = LENGTHS)]
    fn sum_chunked<const NUM_WORKERS: usize>(bencher: Bencher, len: usize) {
        let input = (0..len as i32).collect::<Vec<i32>>();
        let input_slice = input.as_slice();
        ThreadPoolBuilder {
            num_workers: NUM_WORKERS,
        }
        .scope(black_box(input_slice), |pool| {
            bencher
                .counter(BytesCount::of_many::<i32>(len))
                .bench_local(|| pool.sum().unwrap())
        })
        .unwrap();
    }
}
