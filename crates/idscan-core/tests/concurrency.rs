//! Integration tests for bounded-concurrency frame dispatch.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use idscan_core::{
    CameraDevice, CameraProperties, CompletionContext, ConcurrencyConfig, ConcurrencyManager,
    SerialQueue,
};
use idscan_test_support::{
    InstrumentedScanner, MockCamera, ScanBehavior, ScanRecord, SyntheticFrameBuilder,
};

const WAIT: Duration = Duration::from_secs(10);

struct Harness {
    manager: ConcurrencyManager,
    queue: Arc<SerialQueue>,
    context: Arc<dyn CompletionContext>,
}

impl Harness {
    fn new(permits: usize, workers: usize) -> Self {
        let config = ConcurrencyConfig::default()
            .with_max_concurrent_scans(permits)
            .with_worker_threads(workers);
        let queue = Arc::new(SerialQueue::new("completions").unwrap());
        let context: Arc<dyn CompletionContext> = queue.clone();
        Self {
            manager: ConcurrencyManager::new(config).unwrap(),
            queue,
            context,
        }
    }

    /// Submits `count` frames (frame `i` is `i + 1` pixels wide) and returns
    /// a receiver of `(record, completion thread)` pairs.
    fn submit(
        &self,
        scanner: &Arc<InstrumentedScanner>,
        count: u32,
        camera: Option<&dyn CameraDevice>,
    ) -> Receiver<(ScanRecord, ThreadId)> {
        let (tx, rx) = crossbeam_channel::unbounded();
        for i in 0..count {
            let tx = tx.clone();
            self.manager.scan_frame(
                scanner,
                SyntheticFrameBuilder::solid(i + 1, 1, [0, 0, 0]),
                camera,
                &self.context,
                move |record| {
                    let _ = tx.send((record, thread::current().id()));
                },
            );
        }
        rx
    }
}

#[test]
fn never_exceeds_the_permit_count() {
    let harness = Harness::new(2, 4);
    let scanner = Arc::new(InstrumentedScanner::new(Duration::from_millis(100)));

    let started = Instant::now();
    let rx = harness.submit(&scanner, 8, None);
    let submit_time = started.elapsed();

    for _ in 0..8 {
        rx.recv_timeout(WAIT).expect("completion");
    }

    assert!(scanner.high_water_mark() <= 2, "high water {}", scanner.high_water_mark());
    assert!(scanner.high_water_mark() >= 1);
    // Eight 100ms scans through two permits: the submitter must have been
    // held back for at least three rounds.
    assert!(submit_time >= Duration::from_millis(250), "submitted in {submit_time:?}");
}

#[test]
fn single_permit_serializes_scans() {
    let harness = Harness::new(1, 3);
    let scanner = Arc::new(InstrumentedScanner::new(Duration::from_millis(20)));

    let rx = harness.submit(&scanner, 5, None);
    for _ in 0..5 {
        rx.recv_timeout(WAIT).expect("completion");
    }
    assert_eq!(scanner.high_water_mark(), 1);
}

#[test]
fn completions_run_on_the_context_not_the_worker() {
    let harness = Harness::new(2, 2);
    let scanner = Arc::new(InstrumentedScanner::new(Duration::from_millis(5)));

    let rx = harness.submit(&scanner, 4, None);
    for _ in 0..4 {
        let (record, completion_thread) = rx.recv_timeout(WAIT).expect("completion");
        assert_eq!(completion_thread, harness.queue.thread_id());
        assert_ne!(record.thread, completion_thread);
        assert_ne!(record.thread, thread::current().id());
    }
}

#[test]
fn failures_and_panics_release_their_permit() {
    let harness = Harness::new(1, 1);
    let scanner = Arc::new(
        InstrumentedScanner::new(Duration::from_millis(5)).with_script([
            ScanBehavior::Fail,
            ScanBehavior::Panic,
            ScanBehavior::Succeed,
        ]),
    );

    let rx = harness.submit(&scanner, 3, None);

    let (record, _) = rx.recv_timeout(WAIT).expect("third frame completes");
    assert_eq!(record.frame_width, 3);
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

    assert_eq!(harness.manager.available_permits(), 1);
    let stats = harness.manager.stats();
    assert_eq!(stats.frames_processed, 1);
    assert_eq!(stats.frames_dropped, 2);
}

#[test]
fn camera_properties_are_captured_at_call_time() {
    let harness = Harness::new(1, 1);
    let scanner = Arc::new(InstrumentedScanner::new(Duration::from_millis(100)));
    let camera = MockCamera::new(CameraProperties {
        exposure_iso: Some(100.0),
        ..CameraProperties::default()
    });

    let rx = harness.submit(&scanner, 1, Some(&camera));
    camera.set(CameraProperties {
        exposure_iso: Some(800.0),
        is_adjusting_focus: true,
        ..CameraProperties::default()
    });

    let (record, _) = rx.recv_timeout(WAIT).expect("completion");
    let captured = record.camera.expect("camera properties");
    assert_eq!(captured.exposure_iso, Some(100.0));
    assert!(!captured.is_adjusting_focus);
}

#[test]
fn no_camera_means_no_properties() {
    let harness = Harness::new(1, 1);
    let scanner = Arc::new(InstrumentedScanner::new(Duration::ZERO));

    let rx = harness.submit(&scanner, 1, None);
    let (record, _) = rx.recv_timeout(WAIT).expect("completion");
    assert!(record.camera.is_none());
}

#[test]
fn frame_snapshot_is_used_without_a_camera() {
    let harness = Harness::new(1, 1);
    let scanner = Arc::new(InstrumentedScanner::new(Duration::ZERO));
    let snapshot = CameraProperties {
        focal_length_mm: Some(4.2),
        ..CameraProperties::default()
    };
    let (tx, rx) = crossbeam_channel::unbounded();

    harness.manager.scan_frame(
        &scanner,
        SyntheticFrameBuilder::solid(4, 4, [0, 0, 0]).with_camera_properties(snapshot.clone()),
        None,
        &harness.context,
        move |record| {
            let _ = tx.send(record);
        },
    );

    let record = rx.recv_timeout(WAIT).expect("completion");
    assert_eq!(record.camera, Some(snapshot));
}

#[test]
fn camera_device_overrides_frame_snapshot() {
    let harness = Harness::new(1, 1);
    let scanner = Arc::new(InstrumentedScanner::new(Duration::ZERO));
    let camera = MockCamera::new(CameraProperties {
        exposure_iso: Some(200.0),
        ..CameraProperties::default()
    });
    let (tx, rx) = crossbeam_channel::unbounded();

    harness.manager.scan_frame(
        &scanner,
        SyntheticFrameBuilder::solid(4, 4, [0, 0, 0]).with_camera_properties(CameraProperties {
            exposure_iso: Some(50.0),
            ..CameraProperties::default()
        }),
        Some(&camera),
        &harness.context,
        move |record| {
            let _ = tx.send(record);
        },
    );

    let record = rx.recv_timeout(WAIT).expect("completion");
    assert_eq!(record.camera.expect("camera properties").exposure_iso, Some(200.0));
}

#[test]
fn reset_clears_throughput_stats() {
    let harness = Harness::new(2, 2);
    let scanner = Arc::new(InstrumentedScanner::new(Duration::from_millis(5)));

    let rx = harness.submit(&scanner, 4, None);
    for _ in 0..4 {
        rx.recv_timeout(WAIT).expect("completion");
    }
    let stats = harness.manager.stats();
    assert_eq!(stats.frames_processed, 4);
    assert!(stats.total_scan_time >= Duration::from_millis(20));

    harness.manager.reset();
    assert_eq!(harness.manager.stats().frames_processed, 0);
    assert_eq!(harness.manager.stats().frames_dropped, 0);
}

#[test]
fn dropping_the_manager_finishes_dispatched_scans() {
    let harness = Harness::new(2, 2);
    let scanner = Arc::new(InstrumentedScanner::new(Duration::from_millis(30)));
    let rx = harness.submit(&scanner, 4, None);

    let Harness {
        manager,
        queue,
        context,
    } = harness;
    drop(manager);
    assert_eq!(scanner.scan_count(), 4);
    drop(context);
    drop(queue);

    assert_eq!(rx.try_iter().count(), 4);
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "primary thread")]
fn scan_frame_on_primary_thread_is_a_programming_error() {
    let harness = Harness::new(1, 1);
    let scanner = Arc::new(InstrumentedScanner::new(Duration::ZERO));
    idscan_core::execution::mark_primary_thread();
    let _rx = harness.submit(&scanner, 1, None);
}
