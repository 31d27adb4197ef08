// Copyright (c) The Spindle Project Authors.
// Licensed under the MIT License.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use tracing::{debug, error};

use crate::Error;

type Job = Box<dyn FnOnce() + Send>;

/// A fixed-size pool of worker threads for fire-and-forget work.
///
/// Unlike a [`TaskQueue`][crate::TaskQueue], the pool makes no ordering or single-writer
/// promise: any idle worker picks up the next job, and jobs have no identity, no delay and
/// no cancellation once started. It is the right tool when work items are independent and
/// throughput is all that matters.
///
/// Dropping the pool flushes it: workers finish every job still queued before the
/// destructor returns. Use [`remove_pending`](Self::remove_pending) first for a fast
/// shutdown that abandons queued work.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// use spindle::ThreadPool;
///
/// let pool = ThreadPool::new(4)?;
/// let done = Arc::new(AtomicUsize::new(0));
///
/// for _ in 0..100 {
///     let done = Arc::clone(&done);
///     pool.submit(move || {
///         done.fetch_add(1, Ordering::SeqCst);
///     });
/// }
///
/// drop(pool); // flushes
/// assert_eq!(done.load(Ordering::SeqCst), 100);
/// # Ok::<(), spindle::Error>(())
/// ```
#[derive(Debug)]
pub struct ThreadPool {
    shared: Arc<PoolShared>,
    workers: Vec<JoinHandle<()>>,
}

#[derive(Debug)]
struct PoolShared {
    state: Mutex<PoolState>,
    wake: Condvar,
}

struct PoolState {
    quitting: bool,
    jobs: VecDeque<Job>,
}

impl std::fmt::Debug for PoolState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolState")
            .field("quitting", &self.quitting)
            .field("pending", &self.jobs.len())
            .finish()
    }
}

impl ThreadPool {
    /// Creates a pool with `workers` threads, all spawned before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Spawn`] when the OS refuses to create a worker thread. Workers
    /// spawned before the failure are shut down again.
    ///
    /// # Panics
    ///
    /// Panics when `workers` is zero.
    pub fn new(workers: usize) -> Result<Self, Error> {
        assert!(workers > 0, "a thread pool needs at least one worker");

        let shared = Arc::new(PoolShared {
            state: Mutex::new(PoolState {
                quitting: false,
                jobs: VecDeque::new(),
            }),
            wake: Condvar::new(),
        });

        let mut handles = Vec::with_capacity(workers);
        for index in 0..workers {
            let worker_shared = Arc::clone(&shared);
            let spawned = thread::Builder::new()
                .name(format!("pool-worker-{index}"))
                .spawn(move || worker_shared.work());
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(cause) => {
                    error!(index, %cause, "worker spawn failed; shutting partial pool down");
                    shut_down(&shared, handles);
                    return Err(cause.into());
                }
            }
        }

        debug!(workers, "thread pool started");
        Ok(Self { shared, workers: handles })
    }

    /// Queues `job` for execution by any idle worker.
    ///
    /// Jobs submitted after the destructor has begun are silently dropped.
    pub fn submit<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut state = self.shared.lock();
            if state.quitting {
                return;
            }
            state.jobs.push_back(Box::new(job));
        }
        self.shared.wake.notify_one();
    }

    /// Discards every job that has not yet started and returns how many were dropped.
    ///
    /// Jobs already running on a worker are unaffected.
    pub fn remove_pending(&self) -> usize {
        let abandoned = {
            let mut state = self.shared.lock();
            std::mem::take(&mut state.jobs)
        };
        let count = abandoned.len();
        if count > 0 {
            debug!(count, "abandoned pending pool jobs");
        }
        count
    }

    /// Pending jobs not yet picked up by a worker.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.lock().jobs.len()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        shut_down(&self.shared, std::mem::take(&mut self.workers));
        debug!("thread pool destroyed");
    }
}

/// Flush shutdown: workers only exit once the job queue is empty.
fn shut_down(shared: &Arc<PoolShared>, workers: Vec<JoinHandle<()>>) {
    {
        let mut state = shared.lock();
        state.quitting = true;
    }
    shared.wake.notify_all();
    for worker in workers {
        if worker.join().is_err() {
            error!("pool worker terminated by a panicking job");
        }
    }
}

impl PoolShared {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().expect("acquiring the pool lock must always succeed")
    }

    #[cfg_attr(test, mutants::skip)] // Mutating the loop hangs the worker instead of failing.
    fn work(&self) {
        loop {
            let job = {
                let mut state = self.lock();
                loop {
                    if let Some(job) = state.jobs.pop_front() {
                        break job;
                    }
                    if state.quitting {
                        return;
                    }
                    state = self.wake.wait(state).expect("acquiring the pool lock must always succeed");
                }
            };
            job();
            // Another worker may be waiting for quit while jobs were still queued.
            self.wake.notify_one();
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::fmt::Debug;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    use super::*;

    const TEST_TIMEOUT: Duration = Duration::from_secs(10);

    #[test]
    fn assert_types() {
        static_assertions::assert_impl_all!(ThreadPool: Debug, Send, Sync);
    }

    #[test]
    fn runs_a_job() {
        let pool = ThreadPool::new(2).unwrap();
        let (sender, receiver) = mpsc::channel();

        pool.submit(move || sender.send(()).unwrap());

        receiver.recv_timeout(TEST_TIMEOUT).unwrap();
    }

    #[test]
    fn drop_flushes_all_queued_jobs() {
        let done = Arc::new(AtomicUsize::new(0));

        {
            let pool = ThreadPool::new(4).unwrap();
            for _ in 0..500 {
                let done = Arc::clone(&done);
                pool.submit(move || {
                    done.fetch_add(1, Ordering::SeqCst);
                });
            }
        }

        assert_eq!(done.load(Ordering::SeqCst), 500);
    }

    #[test]
    fn jobs_spread_across_workers() {
        let pool = ThreadPool::new(4).unwrap();
        let (sender, receiver) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Arc::new(Mutex::new(release_rx));

        // Four blocking jobs must occupy four distinct workers to all start.
        for _ in 0..4 {
            let sender = sender.clone();
            let release_rx = Arc::clone(&release_rx);
            pool.submit(move || {
                sender.send(thread::current().id()).unwrap();
                release_rx.lock().unwrap().recv_timeout(TEST_TIMEOUT).ok();
            });
        }

        let mut seen = std::collections::HashSet::new();
        for _ in 0..4 {
            seen.insert(receiver.recv_timeout(TEST_TIMEOUT).unwrap());
        }
        for _ in 0..4 {
            release_tx.send(()).unwrap();
        }

        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn remove_pending_discards_queued_jobs() {
        let pool = ThreadPool::new(1).unwrap();
        let done = Arc::new(AtomicUsize::new(0));
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        // Occupy the single worker so the later jobs stay queued.
        pool.submit(move || {
            started_tx.send(()).unwrap();
            release_rx.recv_timeout(TEST_TIMEOUT).ok();
        });
        started_rx.recv_timeout(TEST_TIMEOUT).unwrap();

        for _ in 0..10 {
            let done = Arc::clone(&done);
            pool.submit(move || {
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(pool.pending(), 10);

        assert_eq!(pool.remove_pending(), 10);
        assert_eq!(pool.pending(), 0);

        release_tx.send(()).unwrap();
        drop(pool);
        assert_eq!(done.load(Ordering::SeqCst), 0);
    }

    #[test]
    #[should_panic(expected = "at least one worker")]
    fn zero_workers_is_rejected() {
        drop(ThreadPool::new(0));
    }
}
