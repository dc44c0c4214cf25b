//! Inference cost tracking.

use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

/// Accumulates inference timings for one model.
#[derive(Debug)]
pub struct InferenceTracker {
    name: &'static str,
    totals: Mutex<Totals>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Totals {
    count: u64,
    elapsed: Duration,
}

/// Point-in-time view of an [`InferenceTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InferenceSummary {
    /// Model name.
    pub name: &'static str,
    /// Number of inference calls recorded.
    pub count: u64,
    /// Sum of all inference durations.
    pub total: Duration,
    /// Mean inference duration, zero when nothing was recorded.
    pub mean: Duration,
}

impl InferenceTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            totals: Mutex::new(Totals::default()),
        }
    }

    /// Records one inference call.
    pub fn record(&self, elapsed: Duration) {
        let mut totals = self.totals.lock();
        totals.count += 1;
        totals.elapsed += elapsed;
    }

    /// Clears all recorded calls.
    pub fn reset(&self) {
        *self.totals.lock() = Totals::default();
    }

    /// Current totals.
    #[must_use]
    pub fn summary(&self) -> InferenceSummary {
        let totals = *self.totals.lock();
        let mean = u32::try_from(totals.count)
            .ok()
            .filter(|&n| n > 0)
            .map_or(Duration::ZERO, |n| totals.elapsed / n);
        InferenceSummary {
            name: self.name,
            count: totals.count,
            total: totals.elapsed,
            mean,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_of_recorded_calls() {
        let tracker = InferenceTracker::new("face");
        tracker.record(Duration::from_millis(10));
        tracker.record(Duration::from_millis(30));
        let summary = tracker.summary();
        assert_eq!(summary.count, 2);
        assert_eq!(summary.mean, Duration::from_millis(20));
    }

    #[test]
    fn reset_clears() {
        let tracker = InferenceTracker::new("document");
        tracker.record(Duration::from_millis(5));
        tracker.reset();
        let summary = tracker.summary();
        assert_eq!(summary.count, 0);
        assert_eq!(summary.mean, Duration::ZERO);
    }
}
