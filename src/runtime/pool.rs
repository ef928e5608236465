//! Worker pool backing `Work` and the filesystem requests.
//!
//! Each loop starts its own pool lazily, on the first submission. Workers
//! block on a shared job channel, run the job, and push the result onto the
//! loop's completion queue. Dropping the pool closes the channel; workers
//! finish whatever is still queued and exit, and the drop joins them.

use crate::error::{EIO, Error, Result};
use crate::runtime::queue::{Completion, CompletionSender, Payload};
use crate::utils::slab::Key;

use crossbeam_channel::{Receiver, Sender};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread::{self, JoinHandle};

pub(crate) const QUEUED: u8 = 0;
pub(crate) const RUNNING: u8 = 1;
pub(crate) const CANCELLED: u8 = 2;

/// Lifecycle of one submitted job, shared between the loop and the worker
/// that eventually picks it up.
pub(crate) type JobState = Arc<AtomicU8>;

pub(crate) struct Job {
    pub(crate) key: Key,
    pub(crate) state: JobState,
    pub(crate) run: Box<dyn FnOnce() -> Payload + Send>,
}

pub(crate) struct ThreadPool {
    jobs: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    pub(crate) fn start(size: usize, completions: CompletionSender) -> Result<Self> {
        let (jobs, receiver) = crossbeam_channel::unbounded::<Job>();
        let mut workers = Vec::with_capacity(size);

        for index in 0..size {
            let receiver = receiver.clone();
            let completions = completions.clone();

            let worker = thread::Builder::new()
                .name(format!("runa-io-worker-{index}"))
                .spawn(move || work_loop(receiver, completions))
                .map_err(Error::from)?;

            workers.push(worker);
        }

        log::debug!("thread pool started with {size} workers");

        Ok(Self {
            jobs: Some(jobs),
            workers,
        })
    }

    /// Hands a job to the workers. Fails only once the pool is shutting down.
    pub(crate) fn submit(&self, job: Job) -> std::result::Result<(), i32> {
        match &self.jobs {
            Some(jobs) => jobs.send(job).map_err(|_| EIO),
            None => Err(EIO),
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.jobs.take();

        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::warn!("thread pool worker exited by panicking");
            }
        }

        log::debug!("thread pool stopped");
    }
}

fn work_loop(receiver: Receiver<Job>, completions: CompletionSender) {
    while let Ok(job) = receiver.recv() {
        // A cancelled job has already been completed by the loop.
        if job
            .state
            .compare_exchange(QUEUED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            continue;
        }

        let output = match catch_unwind(AssertUnwindSafe(job.run)) {
            Ok(payload) => Ok(payload),
            Err(_) => {
                log::warn!("work callback panicked on {:?}", thread::current().name());
                Err(EIO)
            }
        };

        completions.push(Completion {
            key: job.key,
            output,
        });
    }
}
