//! Bounded-concurrency dispatch of frames to scanners.
//!
//! [`ConcurrencyManager::scan_frame`] is called from a capture callback. It
//! blocks that caller while every permit is held, which makes the capture
//! layer drop frames instead of queueing them. The permit count therefore
//! bounds both parallel inference and the number of frames held in memory.

mod context;
mod metrics;
mod pool;
mod semaphore;

pub use context::SerialQueue;
pub use metrics::ThroughputStats;
pub use pool::WorkerPool;
pub use semaphore::{FairSemaphore, Permit};

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::domain::VideoFrame;
use crate::execution::is_primary_thread;
use crate::ports::{CameraDevice, CompletionContext};
use crate::scanner::Scanner;
use metrics::ThroughputMeter;

/// Limits for [`ConcurrencyManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcurrencyConfig {
    /// Maximum number of scans executing at once.
    pub max_concurrent_scans: usize,
    /// Threads in the worker pool.
    pub worker_threads: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_concurrent_scans: 2,
            worker_threads: 2,
        }
    }
}

impl ConcurrencyConfig {
    /// Sets the permit count. Values below 1 are raised to 1.
    #[must_use]
    pub fn with_max_concurrent_scans(mut self, permits: usize) -> Self {
        self.max_concurrent_scans = permits.max(1);
        self
    }

    /// Sets the worker pool size. Values below 1 are raised to 1.
    #[must_use]
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads.max(1);
        self
    }
}

/// Dispatches scans onto a worker pool under a fixed number of permits.
pub struct ConcurrencyManager {
    permits: FairSemaphore,
    meter: Arc<ThroughputMeter>,
    pool: WorkerPool,
}

impl ConcurrencyManager {
    /// Starts the worker pool.
    ///
    /// # Errors
    ///
    /// Returns an error if a worker thread cannot be spawned.
    pub fn new(config: ConcurrencyConfig) -> io::Result<Self> {
        let pool = WorkerPool::new("idscan-scan", config.worker_threads)?;
        debug!(
            permits = config.max_concurrent_scans.max(1),
            workers = pool.size(),
            "Concurrency manager started"
        );
        Ok(Self {
            permits: FairSemaphore::new(config.max_concurrent_scans.max(1)),
            meter: Arc::new(ThroughputMeter::default()),
            pool,
        })
    }

    /// Scans `frame` on the worker pool and delivers the output to
    /// `completion` on `context`.
    ///
    /// Camera properties are read from `camera` before this call blocks.
    /// Without a device, the snapshot the frame was captured with is used.
    /// Blocks the caller until a permit is free. A scan that fails or panics
    /// releases its permit and produces no completion.
    ///
    /// Must not be called on the primary thread.
    pub fn scan_frame<S, F>(
        &self,
        scanner: &Arc<S>,
        frame: VideoFrame,
        camera: Option<&dyn CameraDevice>,
        context: &Arc<dyn CompletionContext>,
        completion: F,
    ) where
        S: Scanner + ?Sized + 'static,
        F: FnOnce(S::Output) + Send + 'static,
    {
        debug_assert!(
            !is_primary_thread(),
            "scan_frame blocks and must not be called on the primary thread"
        );

        let properties = camera
            .map(CameraDevice::properties)
            .or_else(|| frame.camera_properties().cloned());
        let permit = self.permits.acquire();

        let scanner = Arc::clone(scanner);
        let context = Arc::clone(context);
        let meter = Arc::clone(&self.meter);

        self.pool.execute(Box::new(move || {
            let started = Instant::now();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                scanner.scan(&frame, properties.as_ref())
            }));
            let scan_time = started.elapsed();
            drop(frame);
            drop(permit);

            match outcome {
                Ok(Ok(output)) => {
                    meter.record(scan_time, true);
                    context.execute(Box::new(move || completion(output)));
                }
                Ok(Err(e)) => {
                    meter.record(scan_time, false);
                    debug!("Dropping frame: {e}");
                }
                Err(_) => {
                    meter.record(scan_time, false);
                    warn!("Scanner panicked, dropping frame");
                }
            }
        }));
    }

    /// Clears the throughput counters. Scans already dispatched still run and
    /// count toward the new session.
    pub fn reset(&self) {
        self.meter.reset();
    }

    /// Throughput since construction or the last [`reset`](Self::reset).
    #[must_use]
    pub fn stats(&self) -> ThroughputStats {
        self.meter.snapshot()
    }

    /// Permit count.
    #[must_use]
    pub fn max_concurrent_scans(&self) -> usize {
        self.permits.capacity()
    }

    /// Permits not currently held by a scan.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.permits.available()
    }
}
