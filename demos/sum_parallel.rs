// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Simple program that computes the sum of a slice on a chunked worker pool.

use chunksum::{reduce_sum, ReduceError};
use std::hint::black_box;

fn main() -> Result<(), ReduceError> {
    let input_size = 1_000_000;
    let num_workers = std::thread::available_parallelism()
        .map(Into::into)
        .unwrap_or(1);

    let input = (0..input_size).collect::<Vec<i32>>();
    let sum = reduce_sum(&black_box(input), num_workers)?;
    println!("sum = {sum}");
    Ok(())
}
