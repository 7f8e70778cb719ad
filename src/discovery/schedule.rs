//! Time and worker abstraction for discovery.
//!
//! Discovery never calls `thread::sleep` or `thread::spawn` directly. The
//! production [`ThreadScheduler`] does; [`ManualScheduler`] records delays
//! and queues jobs so retry policies run instantly and deterministically in
//! tests.

use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use tracing::warn;

pub type Job = Box<dyn FnOnce() + Send + 'static>;

pub trait Scheduler: Send + Sync {
    /// Blocks the calling worker for `delay`.
    fn sleep(&self, delay: Duration);

    /// Runs `job` on a new background worker.
    fn spawn(&self, name: &str, job: Job);
}

/// Real threads and real sleeps.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadScheduler;

impl Scheduler for ThreadScheduler {
    fn sleep(&self, delay: Duration) {
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }

    fn spawn(&self, name: &str, job: Job) {
        if let Err(e) = thread::Builder::new().name(name.to_string()).spawn(job) {
            warn!("Failed to start {} worker: {}", name, e);
        }
    }
}

/// Deterministic scheduler: sleeps are recorded, spawned jobs are queued
/// until [`ManualScheduler::run_pending`].
#[derive(Default)]
pub struct ManualScheduler {
    slept: Mutex<Vec<Duration>>,
    pending: Mutex<Vec<(String, Job)>>,
    spawned: Mutex<Vec<String>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every delay requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.slept.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Total simulated time.
    pub fn elapsed(&self) -> Duration {
        self.sleeps().iter().sum()
    }

    /// Names of every job spawned so far.
    pub fn spawned(&self) -> Vec<String> {
        self.spawned.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Runs queued jobs, including jobs they spawn, until none remain.
    /// Returns how many jobs ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            let batch: Vec<(String, Job)> =
                std::mem::take(&mut *self.pending.lock().unwrap_or_else(|e| e.into_inner()));
            if batch.is_empty() {
                return ran;
            }
            for (_, job) in batch {
                job();
                ran += 1;
            }
        }
    }
}

impl Scheduler for ManualScheduler {
    fn sleep(&self, delay: Duration) {
        self.slept.lock().unwrap_or_else(|e| e.into_inner()).push(delay);
    }

    fn spawn(&self, name: &str, job: Job) {
        self.spawned
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(name.to_string());
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((name.to_string(), job));
    }
}
