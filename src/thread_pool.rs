// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A pool of worker threads that sums contiguous chunks of an integer slice.

use crate::chunk::{chunk_range, chunk_size};
use crate::error::ReduceError;
use crate::macros::{log_debug, log_error, log_warn};
use crossbeam_utils::CachePadded;
// Platforms that support `libc::sched_setaffinity()`.
#[cfg(all(
    not(miri),
    any(
        target_os = "android",
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "linux"
    )
))]
use nix::{
    sched::{sched_setaffinity, CpuSet},
    unistd::Pid,
};
use std::cell::Cell;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{Scope, ScopedJoinHandle};

/// Sums `input` in parallel, using `num_workers` worker threads.
///
/// The input is split into contiguous chunks of `ceil(len / num_workers)`
/// items; each worker sums one chunk with a 64-bit accumulator and the partial
/// sums are combined in worker-index order. The result equals the sequential
/// sum of the input, whatever the worker count.
///
/// The worker threads live for the duration of the call and are joined before
/// it returns, on the error path as well.
///
/// ```rust
/// # use chunksum::reduce_sum;
/// let input = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
/// assert_eq!(reduce_sum(&input, 4).unwrap(), 5 * 11);
/// ```
pub fn reduce_sum(input: &[i32], num_workers: usize) -> Result<i64, ReduceError> {
    ThreadPoolBuilder { num_workers }.scope(input, |pool| pool.sum())?
}

/// A builder for [`ThreadPool`].
pub struct ThreadPoolBuilder {
    /// Number of worker threads to spawn in the pool.
    pub num_workers: usize,
}

impl ThreadPoolBuilder {
    /// Spawns a scoped worker pool over the given input and passes it to `f`.
    ///
    /// All workers are joined when `f` returns, on panics and error paths
    /// included. The pool can run several reductions over its input, which is
    /// useful to discard warm-up runs before timing the real ones.
    ///
    /// Fails with [`ReduceError::InvalidWorkerCount`] if the builder requests
    /// zero workers; no thread is spawned in that case.
    ///
    /// ```rust
    /// # use chunksum::ThreadPoolBuilder;
    /// let input = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
    /// let sum = ThreadPoolBuilder { num_workers: 4 }
    ///     .scope(&input, |pool| pool.sum())
    ///     .unwrap()
    ///     .unwrap();
    /// assert_eq!(sum, 5 * 11);
    /// ```
    pub fn scope<R>(
        &self,
        input: &[i32],
        f: impl FnOnce(ThreadPool<'_>) -> R,
    ) -> Result<R, ReduceError> {
        if self.num_workers == 0 {
            return Err(ReduceError::InvalidWorkerCount);
        }
        Ok(std::thread::scope(|scope| {
            let pool = ThreadPool::new(scope, self.num_workers, input, chunk_sum);
            f(pool)
        }))
    }
}

/// Task run by each worker over its chunk of the input.
pub(crate) type ChunkTask = fn(&[i32]) -> i64;

/// Sums one chunk with a wide accumulator, so that partial sums don't overflow
/// even when the whole input exceeds the 32-bit range.
fn chunk_sum(chunk: &[i32]) -> i64 {
    chunk.iter().map(|&x| i64::from(x)).sum()
}

/// Status of the main thread.
#[derive(Clone, Copy, PartialEq, Eq)]
enum MainStatus {
    /// The main thread is waiting for the worker threads to finish a round.
    Waiting,
    /// The main thread is ready to prepare the next round.
    Ready,
    /// The worker thread with this index panicked.
    WorkerPanic(usize),
}

/// Status sent to the worker threads.
#[derive(Clone, Copy, PartialEq, Eq)]
enum WorkerStatus {
    /// The workers need to compute a round of the given color.
    Round(RoundColor),
    /// There is nothing more to do and the workers must exit.
    Finished,
}

/// A 2-element enumeration to distinguish successive rounds. The "colors" are
/// only illustrative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoundColor {
    Blue,
    Red,
}

impl RoundColor {
    /// Flips to the other color.
    fn toggle(&mut self) {
        *self = match self {
            RoundColor::Blue => RoundColor::Red,
            RoundColor::Red => RoundColor::Blue,
        }
    }
}

/// An ergonomic wrapper around a [`Mutex`]-[`Condvar`] pair.
struct Status<T> {
    mutex: Mutex<T>,
    condvar: Condvar,
}

impl<T> Status<T> {
    /// Creates a new status initialized with the given value.
    fn new(t: T) -> Self {
        Self {
            mutex: Mutex::new(t),
            condvar: Condvar::new(),
        }
    }

    /// Attempts to set the status to the given value and notifies one waiting
    /// thread.
    ///
    /// Fails if the [`Mutex`] is poisoned.
    fn try_notify_one(&self, t: T) -> Result<(), PoisonError<MutexGuard<'_, T>>> {
        *self.mutex.lock()? = t;
        self.condvar.notify_one();
        Ok(())
    }

    /// If the predicate is true on this status, sets the status to the given
    /// value and notifies one waiting thread.
    fn notify_one_if(&self, predicate: impl Fn(&T) -> bool, t: T) {
        let mut locked = self.mutex.lock().unwrap();
        if predicate(&*locked) {
            *locked = t;
            self.condvar.notify_one();
        }
    }

    /// Sets the status to the given value and notifies all waiting threads.
    fn notify_all(&self, t: T) {
        *self.mutex.lock().unwrap() = t;
        self.condvar.notify_all();
    }

    /// Waits until the predicate is true on this status.
    ///
    /// This returns a [`MutexGuard`], allowing to further inspect or modify
    /// the status.
    fn wait_while(&self, predicate: impl FnMut(&mut T) -> bool) -> MutexGuard<T> {
        self.condvar
            .wait_while(self.mutex.lock().unwrap(), predicate)
            .unwrap()
    }
}

/// A worker pool tied to a scope, that sums fixed chunks of one input slice.
///
/// The pool is created via [`ThreadPoolBuilder::scope()`]. Each worker owns a
/// chunk of the input, computed once at construction; every call to
/// [`sum()`](Self::sum) runs one computation round over all chunks.
pub struct ThreadPool<'scope> {
    /// Handles to all the worker threads in the pool.
    workers: Vec<WorkerHandle<'scope>>,
    /// Number of worker threads active in the current round.
    num_active: Arc<AtomicUsize>,
    /// Color of the current round.
    round: Cell<RoundColor>,
    /// Status of the worker threads.
    worker_status: Arc<Status<WorkerStatus>>,
    /// Status of the main thread.
    main_status: Arc<Status<MainStatus>>,
    /// Index of the first worker observed to panic, if any. Once set, the
    /// pool refuses further rounds.
    failed: Cell<Option<usize>>,
}

/// Handle to a worker thread in the pool.
struct WorkerHandle<'scope> {
    /// Thread handle object.
    handle: ScopedJoinHandle<'scope, ()>,
    /// Storage for this worker's partial sum. Padded to a cache line so that
    /// adjacent workers don't write to the same line.
    partial: Arc<CachePadded<Mutex<Option<i64>>>>,
}

impl<'scope> ThreadPool<'scope> {
    /// Creates a new pool tied to the given scope, spawning one worker thread
    /// per chunk of the input slice.
    pub(crate) fn new<'env>(
        thread_scope: &'scope Scope<'scope, 'env>,
        num_workers: usize,
        input: &'env [i32],
        task: ChunkTask,
    ) -> Self {
        debug_assert!(num_workers != 0);

        let color = RoundColor::Blue;
        let num_active = Arc::new(AtomicUsize::new(0));
        let worker_status = Arc::new(Status::new(WorkerStatus::Round(color)));
        let main_status = Arc::new(Status::new(MainStatus::Waiting));

        #[cfg(any(
            miri,
            not(any(
                target_os = "android",
                target_os = "dragonfly",
                target_os = "freebsd",
                target_os = "linux"
            ))
        ))]
        log_warn!("Pinning threads to CPUs is not implemented on this platform.");
        let size = chunk_size(input.len(), num_workers);
        let workers = (0..num_workers)
            .map(|id| {
                let partial = Arc::new(CachePadded::new(Mutex::new(None)));
                let context = WorkerContext {
                    id,
                    chunk: chunk_range(id, size, input.len()),
                    input,
                    task,
                    num_active: num_active.clone(),
                    worker_status: worker_status.clone(),
                    main_status: main_status.clone(),
                    partial: partial.clone(),
                };
                WorkerHandle {
                    handle: thread_scope.spawn(move || {
                        #[cfg(all(
                            not(miri),
                            any(
                                target_os = "android",
                                target_os = "dragonfly",
                                target_os = "freebsd",
                                target_os = "linux"
                            )
                        ))]
                        {
                            let mut cpu_set = CpuSet::new();
                            if let Err(_e) = cpu_set.set(id) {
                                log_warn!("Failed to set CPU affinity for worker #{id}: {_e}");
                            } else if let Err(_e) = sched_setaffinity(Pid::from_raw(0), &cpu_set) {
                                log_warn!("Failed to set CPU affinity for worker #{id}: {_e}");
                            } else {
                                log_debug!("Pinned worker #{id} to CPU #{id}");
                            }
                        }
                        context.run()
                    }),
                    partial,
                }
            })
            .collect();
        log_debug!("[main thread] Spawned workers");

        Self {
            workers,
            num_active,
            round: Cell::new(color),
            worker_status,
            main_status,
            failed: Cell::new(None),
        }
    }

    /// Returns the number of worker threads spawned in this pool.
    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Runs one computation round: every worker sums its chunk, and the
    /// partial sums are combined in worker-index order.
    ///
    /// Fails with [`ReduceError::WorkerPanic`] if a worker thread panicked
    /// during the round. No partial result is returned in that case, and the
    /// pool stays failed: subsequent calls return the same error.
    pub fn sum(&self) -> Result<i64, ReduceError> {
        if let Some(worker) = self.failed.get() {
            return Err(ReduceError::WorkerPanic { worker });
        }

        self.num_active.store(self.workers.len(), Ordering::SeqCst);

        let mut round = self.round.get();
        round.toggle();
        self.round.set(round);

        log_debug!("[main thread, round {round:?}] Ready to compute a round.");
        self.worker_status.notify_all(WorkerStatus::Round(round));

        log_debug!("[main thread, round {round:?}] Waiting for all workers to finish this round.");
        let mut guard = self
            .main_status
            .wait_while(|status| *status == MainStatus::Waiting);
        if let MainStatus::WorkerPanic(worker) = *guard {
            drop(guard);
            log_error!("[main thread] Worker #{worker} panicked, aborting the reduction.");
            self.failed.set(Some(worker));
            return Err(ReduceError::WorkerPanic { worker });
        }
        *guard = MainStatus::Waiting;
        drop(guard);
        log_debug!("[main thread, round {round:?}] All workers have now finished this round.");

        // Combined in worker-index order, i.e. in input order.
        Ok(self
            .workers
            .iter()
            .map(|worker| worker.partial.lock().unwrap().take().unwrap())
            .sum())
    }
}

impl Drop for ThreadPool<'_> {
    /// Joins all the threads in the pool.
    #[allow(clippy::unused_enumerate_index)]
    fn drop(&mut self) {
        log_debug!("[main thread] Notifying workers to finish...");
        self.worker_status.notify_all(WorkerStatus::Finished);

        log_debug!("[main thread] Joining workers in the pool...");
        for (_i, worker) in self.workers.drain(..).enumerate() {
            let result = worker.handle.join();
            match result {
                Ok(_) => log_debug!("[main thread] Worker {_i} joined with result: {result:?}"),
                Err(_) => log_error!("[main thread] Worker {_i} joined with result: {result:?}"),
            }
        }
        log_debug!("[main thread] Joined workers.");
    }
}

/// Context object owned by a worker thread.
struct WorkerContext<'env> {
    /// Worker index.
    id: usize,
    /// Range of input items that this worker sums.
    chunk: Range<usize>,
    /// The shared input slice. Read-only, and the chunks are disjoint.
    input: &'env [i32],
    /// Task to run over the chunk on each round.
    task: ChunkTask,
    /// Number of worker threads active in the current round.
    num_active: Arc<AtomicUsize>,
    /// Status of the worker threads.
    worker_status: Arc<Status<WorkerStatus>>,
    /// Status of the main thread.
    main_status: Arc<Status<MainStatus>>,
    /// Storage for this worker's partial sum.
    partial: Arc<CachePadded<Mutex<Option<i64>>>>,
}

impl WorkerContext<'_> {
    /// Main function run by this worker thread.
    fn run(&self) {
        let mut round = RoundColor::Blue;
        loop {
            round.toggle();
            log_debug!(
                "[worker {}, round {round:?}] Waiting for start signal",
                self.id
            );

            let worker_status: WorkerStatus =
                *self.worker_status.wait_while(|status| match status {
                    WorkerStatus::Finished => false,
                    WorkerStatus::Round(r) => *r != round,
                });
            match worker_status {
                WorkerStatus::Finished => {
                    log_debug!(
                        "[worker {}, round {round:?}] Received finish signal",
                        self.id
                    );
                    break;
                }
                WorkerStatus::Round(r) => {
                    assert_eq!(round, r);
                    log_debug!(
                        "[worker {}, round {round:?}] Received start signal. Summing chunk {:?}...",
                        self.id,
                        self.chunk
                    );

                    // Summing the chunk may panic, and the main thread must be
                    // notified in that case to avoid a deadlock.
                    let panic_notifier = PanicNotifier {
                        id: self.id,
                        main_status: &self.main_status,
                    };
                    let partial = (self.task)(&self.input[self.chunk.clone()]);
                    *self.partial.lock().unwrap() = Some(partial);
                    std::mem::forget(panic_notifier);

                    let thread_count = self.num_active.fetch_sub(1, Ordering::SeqCst);
                    assert!(thread_count > 0);
                    log_debug!(
                        "[worker {}, round {round:?}] Decremented the counter: {}.",
                        self.id,
                        thread_count - 1
                    );
                    if thread_count == 1 {
                        // We're the last worker of this round.
                        log_debug!(
                            "[worker {}, round {round:?}] We're the last worker. Notifying the main thread.",
                            self.id
                        );

                        self.main_status.notify_one_if(
                            |&status| status == MainStatus::Waiting,
                            MainStatus::Ready,
                        );
                    } else {
                        log_debug!(
                            "[worker {}, round {round:?}] Waiting for other workers to finish.",
                            self.id
                        );
                    }
                }
            }
        }
    }
}

/// Object whose destructor notifies the main thread that a panic happened.
///
/// The way to use this is to create an instance before a section that may
/// panic, and to [`std::mem::forget()`] it at the end of the section. That
/// way:
/// - If a panic happens, the [`std::mem::forget()`] call will be skipped but
///   the destructor will run due to RAII.
/// - If no panic happens, the destructor won't run because this object will be
///   forgotten.
struct PanicNotifier<'a> {
    /// Worker index.
    id: usize,
    /// Status of the main thread.
    main_status: &'a Status<MainStatus>,
}

impl Drop for PanicNotifier<'_> {
    fn drop(&mut self) {
        log_error!(
            "[worker {}] Detected panic in this thread, notifying the main thread",
            self.id
        );
        if let Err(_e) = self
            .main_status
            .try_notify_one(MainStatus::WorkerPanic(self.id))
        {
            log_error!(
                "[worker {}] Failed to notify the main thread, the mutex was poisoned: {_e:?}",
                self.id
            );
        }
    }
}
