//! Throughput counters for the concurrency manager.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

/// Snapshot of scan throughput since the last reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ThroughputStats {
    /// Scans that produced a result.
    pub frames_processed: u64,
    /// Scans that failed or panicked.
    pub frames_dropped: u64,
    /// Wall time between the first and the latest finished scan.
    pub elapsed: Duration,
    /// Sum of time spent inside the scanner.
    pub total_scan_time: Duration,
}

impl ThroughputStats {
    /// Processed frames per second of wall time, or 0 before two scans finished.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn frames_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.frames_processed as f64 / secs
        } else {
            0.0
        }
    }

    /// Mean time per finished scan.
    #[must_use]
    pub fn mean_scan_time(&self) -> Duration {
        let finished = self.frames_processed + self.frames_dropped;
        u32::try_from(finished)
            .ok()
            .filter(|n| *n > 0)
            .map_or(Duration::ZERO, |n| self.total_scan_time / n)
    }
}

#[derive(Default)]
struct Session {
    stats: ThroughputStats,
    first: Option<Instant>,
}

/// Session-scoped counters shared with the workers.
#[derive(Default)]
pub(crate) struct ThroughputMeter {
    session: Mutex<Session>,
}

impl ThroughputMeter {
    pub(crate) fn record(&self, scan_time: Duration, produced_result: bool) {
        let now = Instant::now();
        let mut session = self.session.lock();
        let first = *session.first.get_or_insert(now);
        let stats = &mut session.stats;
        if produced_result {
            stats.frames_processed += 1;
        } else {
            stats.frames_dropped += 1;
        }
        stats.total_scan_time += scan_time;
        stats.elapsed = now.duration_since(first);
    }

    pub(crate) fn snapshot(&self) -> ThroughputStats {
        self.session.lock().stats
    }

    pub(crate) fn reset(&self) {
        *self.session.lock() = Session::default();
    }
}
