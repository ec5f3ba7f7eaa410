#![forbid(unsafe_code)]

//! Execution contexts for row loading.
//!
//! The loading pipeline spans exactly two contexts:
//!
//! - a **background pool** that runs slow fetch bodies ([`Worker`],
//!   [`ThreadPool`]), and
//! - a **UI queue** ([`UiQueue`]) standing in for the UI-owning thread:
//!   a single-consumer closure queue whose drainer executes every commit,
//!   cancellation write, and reset.
//!
//! Both are passed in explicitly wherever they are needed, so tests can
//! substitute a deterministic executor ([`InlineWorker`]) and drain the UI
//! queue by hand.
//!
//! # Invariants
//!
//! 1. Jobs submitted to a [`ThreadPool`] run on its worker threads, never
//!    on the submitting thread.
//! 2. A dropped [`ThreadPool`] joins its workers after the in-flight jobs
//!    finish; no job is abandoned mid-run.
//! 3. [`UiQueue`] executes jobs in post order, one at a time, on whichever
//!    thread calls [`UiQueue::drain`]. By convention exactly one thread
//!    drains a given queue.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::debug;

/// Default number of background workers.
const DEFAULT_WORKERS: usize = 4;

/// Default thread-name prefix for pool workers.
const DEFAULT_THREAD_NAME: &str = "rowfetch-worker";

/// A unit of work executed on a background or UI context.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Executes jobs off the UI-owning thread.
///
/// Implementations must accept jobs from any thread. The core ships
/// [`ThreadPool`] for real use and [`InlineWorker`] for deterministic
/// tests.
pub trait Worker: Send + Sync {
    /// Schedule `job` for execution.
    fn execute(&self, job: Job);
}

/// Configuration for [`ThreadPool`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of worker threads. Clamped to at least 1. Default: 4.
    pub workers: usize,
    /// Name prefix for worker threads. Default: `rowfetch-worker`.
    pub thread_name: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            thread_name: DEFAULT_THREAD_NAME.to_owned(),
        }
    }
}

/// Fixed-size background thread pool.
///
/// Workers share a single job channel; an idle worker picks up the next
/// job in submission order. Dropping the pool closes the channel and joins
/// every worker.
pub struct ThreadPool {
    sender: Option<Sender<Job>>,
    handles: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    /// Start a pool with the given configuration.
    #[must_use]
    pub fn new(config: PoolConfig) -> Self {
        let workers = config.workers.max(1);
        let (tx, rx) = mpsc::channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));

        let mut handles = Vec::with_capacity(workers);
        for idx in 0..workers {
            let rx = Arc::clone(&rx);
            let handle = thread::Builder::new()
                .name(format!("{}-{idx}", config.thread_name))
                .spawn(move || worker_loop(&rx))
                .expect("failed to spawn pool worker");
            handles.push(handle);
        }

        debug!(workers, "thread pool started");
        Self {
            sender: Some(tx),
            handles,
        }
    }

    /// Close the job channel and join all workers.
    ///
    /// Idempotent; also runs on drop.
    pub fn shutdown(&mut self) {
        if self.sender.take().is_none() {
            return;
        }
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
        debug!("thread pool stopped");
    }
}

impl Worker for ThreadPool {
    fn execute(&self, job: Job) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(job);
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(rx: &Arc<Mutex<Receiver<Job>>>) {
    loop {
        let job = {
            let rx = rx.lock().unwrap();
            rx.recv()
        };
        match job {
            Ok(job) => job(),
            Err(_) => break,
        }
    }
}

/// Runs every job synchronously on the submitting thread.
///
/// A deterministic [`Worker`] substitute for tests: fetch bodies execute
/// inline at submission, so a test controls the full interleaving with
/// plain function calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineWorker;

impl Worker for InlineWorker {
    fn execute(&self, job: Job) {
        job();
    }
}

/// Single-consumer queue standing in for the UI-owning thread.
///
/// Producers post closures through cloned [`UiHandle`]s; the owning thread
/// runs them with [`drain`](Self::drain) or
/// [`drain_timeout`](Self::drain_timeout). Every displayed-text write in
/// this crate happens inside a job posted here, which is what serializes
/// commit-time critical sections.
pub struct UiQueue {
    sender: Sender<Job>,
    receiver: Receiver<Job>,
}

impl UiQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self { sender, receiver }
    }

    /// A cloneable posting handle for background contexts.
    #[must_use]
    pub fn handle(&self) -> UiHandle {
        UiHandle {
            sender: self.sender.clone(),
        }
    }

    /// Run every job currently queued, in post order.
    ///
    /// Returns the number of jobs executed. Jobs posted while draining are
    /// picked up in the same call.
    pub fn drain(&self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.receiver.try_recv() {
            job();
            ran += 1;
        }
        ran
    }

    /// Block up to `timeout` for the next job, then drain the rest.
    ///
    /// Returns the number of jobs executed (zero on timeout). Useful in
    /// tests that wait for a background fetch to complete.
    pub fn drain_timeout(&self, timeout: Duration) -> usize {
        match self.receiver.recv_timeout(timeout) {
            Ok(job) => {
                job();
                1 + self.drain()
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => 0,
        }
    }

    /// Drain repeatedly until `window` has elapsed.
    ///
    /// Returns the total number of jobs executed. Used by tests that must
    /// outwait the slowest in-flight fetch.
    pub fn drain_for(&self, window: Duration) -> usize {
        let deadline = Instant::now() + window;
        let mut ran = 0;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return ran + self.drain();
            }
            ran += self.drain_timeout(deadline - now);
        }
    }
}

impl Default for UiQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Posting side of a [`UiQueue`].
#[derive(Clone)]
pub struct UiHandle {
    sender: Sender<Job>,
}

impl UiHandle {
    /// Post a job for the UI thread to run.
    ///
    /// Silently dropped if the queue is gone; a commit lost at shutdown is
    /// indistinguishable from a suppressed one.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) {
        let _ = self.sender.send(Box::new(job));
    }
}
