//! Serial completion context backed by a dedicated thread.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle, ThreadId};

use crossbeam_channel::Sender;
use tracing::{debug, warn};

use crate::ports::{CompletionContext, Job};

/// Runs submitted jobs one at a time, in order, on its own named thread.
///
/// A panicking job is logged and does not stop the jobs queued after it.
pub struct SerialQueue {
    sender: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
    thread_id: ThreadId,
}

impl SerialQueue {
    /// Starts the queue thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn new(name: &str) -> io::Result<Self> {
        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();
        let worker = thread::Builder::new().name(name.to_owned()).spawn(move || {
            for job in receiver {
                if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                    warn!("Completion panicked, continuing with the next one");
                }
            }
        })?;
        let thread_id = worker.thread().id();

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
            thread_id,
        })
    }

    /// Id of the thread jobs run on.
    #[must_use]
    pub const fn thread_id(&self) -> ThreadId {
        self.thread_id
    }
}

impl CompletionContext for SerialQueue {
    fn execute(&self, job: Job) {
        let delivered = self
            .sender
            .as_ref()
            .is_some_and(|sender| sender.send(job).is_ok());
        if !delivered {
            debug!("Serial queue closed, dropping completion");
        }
    }
}

impl Drop for SerialQueue {
    fn drop(&mut self) {
        drop(self.sender.take());
        let Some(worker) = self.worker.take() else {
            return;
        };
        // Joining from the queue's own thread would never return.
        if thread::current().id() == self.thread_id {
            return;
        }
        if worker.join().is_err() {
            warn!("Serial queue thread panicked");
        }
    }
}
