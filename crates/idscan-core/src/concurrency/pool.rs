//! Fixed-size worker pool fed by a channel.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use tracing::{trace, warn};

use crate::ports::Job;

/// A fixed set of named threads executing jobs in submission order.
///
/// Dropping the pool closes the queue and joins every worker after it has
/// drained the jobs already submitted.
pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `threads` workers named `{name}-{index}`.
    ///
    /// # Errors
    ///
    /// Returns an error if a thread cannot be spawned.
    pub fn new(name: &str, threads: usize) -> io::Result<Self> {
        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();
        let workers = (0..threads.max(1))
            .map(|index| {
                let receiver = receiver.clone();
                thread::Builder::new()
                    .name(format!("{name}-{index}"))
                    .spawn(move || worker_loop(&receiver))
            })
            .collect::<io::Result<Vec<_>>>()?;

        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    /// Number of worker threads.
    #[must_use]
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queues `job` for execution on some worker.
    pub fn execute(&self, job: Job) {
        let Some(sender) = &self.sender else {
            return;
        };
        if sender.send(job).is_err() {
            warn!("Worker pool has shut down, dropping job");
        }
    }
}

fn worker_loop(receiver: &Receiver<Job>) {
    for job in receiver {
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            warn!("Job panicked on {:?}", thread::current().name());
        }
    }
    trace!("Worker {:?} exiting", thread::current().name());
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        drop(self.sender.take());
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("Worker thread panicked during shutdown");
            }
        }
    }
}
