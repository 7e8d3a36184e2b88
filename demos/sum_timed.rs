// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Benchmark program comparing the chunked parallel sum against a
//! single-threaded baseline on a randomly generated input, averaging the
//! wall-clock time over several trials.

use chunksum::{ReduceError, ThreadPoolBuilder};
use clap::Parser;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;
use std::hint::black_box;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

fn main() -> Result<(), ReduceError> {
    env_logger::init();
    let cli = Cli::parse();

    let num_workers = match cli.num_workers {
        Some(num_workers) => num_workers.get(),
        None => std::thread::available_parallelism()
            .map(Into::into)
            .unwrap_or(1),
    };
    let trials = cli.trials.max(1);
    println!("Using {num_workers} worker threads.");

    let mut rng = ChaCha12Rng::seed_from_u64(cli.seed);
    let input = (0..cli.input_size)
        .map(|_| rng.random_range(0..100))
        .collect::<Vec<i32>>();

    // Single-threaded baseline.
    let mut serial_sum = 0;
    let mut serial_elapsed = Duration::ZERO;
    for _ in 0..trials {
        let start = Instant::now();
        serial_sum = black_box(input.as_slice())
            .iter()
            .map(|&x| i64::from(x))
            .sum::<i64>();
        serial_elapsed += start.elapsed();
    }

    // Parallel runs, reusing one pool across the warm-up and the trials.
    let (parallel_sum, parallel_elapsed) = ThreadPoolBuilder { num_workers }
        .scope(&input, |pool| {
            for _ in 0..cli.warmup {
                pool.sum()?;
            }
            let mut sum = 0;
            let mut elapsed = Duration::ZERO;
            for _ in 0..trials {
                let start = Instant::now();
                sum = pool.sum()?;
                elapsed += start.elapsed();
            }
            Ok::<_, ReduceError>((sum, elapsed))
        })??;

    let avg_serial = serial_elapsed / trials;
    let avg_parallel = parallel_elapsed / trials;
    println!("Input size: {}", cli.input_size);
    println!("Single-thread sum: {serial_sum}, avg time: {avg_serial:?}");
    println!("Parallel sum: {parallel_sum}, avg time: {avg_parallel:?}");
    println!(
        "Speedup: {:.2}x",
        avg_serial.as_secs_f64() / avg_parallel.as_secs_f64()
    );
    Ok(())
}

/// Benchmark program comparing the chunked parallel sum against a
/// single-threaded baseline.
#[derive(Parser, Debug)]
#[command(version)]
struct Cli {
    /// Number of worker threads. Defaults to the available parallelism.
    #[arg(long)]
    num_workers: Option<NonZeroUsize>,

    /// Number of items in the input.
    #[arg(long, default_value_t = 10_000_000)]
    input_size: usize,

    /// Number of timed trials to average over.
    #[arg(long, default_value_t = 5)]
    trials: u32,

    /// Number of discarded parallel warm-up runs before timing.
    #[arg(long, default_value_t = 3)]
    warmup: u32,

    /// Seed for the input generator.
    #[arg(long, default_value_t = 42)]
    seed: u64,
}
