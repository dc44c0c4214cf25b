//! End-to-end tests: frames through detectors, scanners and the manager.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use idscan_core::decode::SCORES;
use idscan_core::{
    CompletionContext, ConcurrencyConfig, ConcurrencyManager, DetectorScanner, DocumentClass,
    DocumentDetector, DocumentDetectorConfig, FaceDetector, FaceDetectorConfig,
    IdentityScanOutput, IdentityScanner, PixelFormat, ScanError, Scanner, SerialQueue,
};
use idscan_test_support::{DetectorOutputBuilder, ScriptedModel, SyntheticFrameBuilder};

fn close(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-4
}

fn document_scanner(model: ScriptedModel) -> DetectorScanner<DocumentDetector> {
    DetectorScanner::new(DocumentDetector::new(
        Arc::new(model),
        DocumentDetectorConfig::default(),
    ))
}

fn face_scanner(model: ScriptedModel) -> DetectorScanner<FaceDetector> {
    DetectorScanner::new(FaceDetector::new(
        Arc::new(model),
        &FaceDetectorConfig::default(),
    ))
}

#[test]
fn document_is_located_and_classified_in_frame_space() {
    let model = ScriptedModel::fixed(
        DetectorOutputBuilder::new()
            .classified([0.4, 0.4, 0.2, 0.2], 0.9, &[0.1, 0.7, 0.1, 0.1])
            .classified([0.0, 0.0, 0.1, 0.1], 0.2, &[0.9, 0.0, 0.0, 0.1])
            .build(),
    );
    let scanner = document_scanner(model);
    let frame = SyntheticFrameBuilder::solid(100, 200, [90, 90, 90]);

    let scan = scanner.scan(&frame, None).unwrap();
    let document = scan.output.document.expect("one document");

    assert_eq!(document.classification, DocumentClass::IdCardFront);
    assert_eq!(document.all_class_scores.len(), 4);
    assert!(close(document.detection.score, 0.9));
    let bbox = document.detection.bbox;
    assert!(close(bbox.x, 0.4));
    assert!(close(bbox.y, 0.45), "y = {}", bbox.y);
    assert!(close(bbox.width, 0.2));
    assert!(close(bbox.height, 0.1));
}

#[test]
fn document_class_follows_highest_class_score() {
    let model = ScriptedModel::fixed(
        DetectorOutputBuilder::new()
            .classified([0.3, 0.3, 0.4, 0.4], 0.8, &[0.2, 0.1, 0.1, 0.6])
            .build(),
    );
    let scanner = document_scanner(model);
    let frame = SyntheticFrameBuilder::solid(120, 120, [90, 90, 90]);

    let document = scanner
        .scan(&frame, None)
        .unwrap()
        .output
        .document
        .expect("one document");

    assert_eq!(document.classification, DocumentClass::Invalid);
    let (label, score) = document.all_class_scores[0];
    assert_eq!(label, DocumentClass::Passport);
    assert!(close(score, 0.2));
}

#[test]
fn low_scoring_document_yields_empty_output() {
    let model = ScriptedModel::fixed(
        DetectorOutputBuilder::new()
            .classified([0.4, 0.4, 0.2, 0.2], 0.1, &[0.1, 0.7, 0.1, 0.1])
            .build(),
    );
    let scan = document_scanner(model)
        .scan(&SyntheticFrameBuilder::solid(64, 64, [0, 0, 0]), None)
        .unwrap();
    assert!(scan.output.document.is_none());
}

#[test]
fn face_detector_reports_at_most_two_faces() {
    let model = ScriptedModel::fixed(
        DetectorOutputBuilder::new()
            .candidate([0.1, 0.1, 0.3, 0.3], 0.95)
            .candidate([0.6, 0.6, 0.8, 0.8], 0.9)
            .candidate([0.4, 0.1, 0.5, 0.2], 0.85)
            .build(),
    );
    let scan = face_scanner(model)
        .scan(&SyntheticFrameBuilder::solid(128, 128, [0, 0, 0]), None)
        .unwrap();

    assert_eq!(scan.output.face_count(), 2);
    assert!(close(scan.output.faces[0].score, 0.95));
    assert!(close(scan.output.faces[1].score, 0.9));
}

#[test]
fn model_sees_a_resized_center_square() {
    let model = Arc::new(
        ScriptedModel::fixed(DetectorOutputBuilder::new().build()).with_input_size(32),
    );
    let scanner = DetectorScanner::new(FaceDetector::new(
        model.clone(),
        &FaceDetectorConfig::default(),
    ));

    scanner
        .scan(&SyntheticFrameBuilder::coordinates(300, 120), None)
        .unwrap();
    assert_eq!(model.inputs(), vec![(32, 32)]);
}

#[test]
fn every_pixel_format_reaches_the_model() {
    for format in [
        PixelFormat::Rgb8,
        PixelFormat::Rgba8,
        PixelFormat::Bgra8,
        PixelFormat::Luma8,
    ] {
        let model = ScriptedModel::fixed(
            DetectorOutputBuilder::new()
                .candidate([0.2, 0.2, 0.8, 0.8], 0.9)
                .build(),
        );
        let frame = SyntheticFrameBuilder::solid_in_format(40, 30, [10, 20, 30], format);
        let scan = face_scanner(model).scan(&frame, None).unwrap();
        assert_eq!(scan.output.face_count(), 1, "{format:?}");
    }
}

#[test]
fn malformed_scores_then_recovery() {
    let malformed = DetectorOutputBuilder::new()
        .candidate([0.1, 0.1, 0.3, 0.3], 0.9)
        .raw(SCORES, &[1, 1, 2], &[0.9, 0.1])
        .build();
    let valid = DetectorOutputBuilder::new()
        .candidate([0.1, 0.1, 0.3, 0.3], 0.9)
        .build();
    let scanner = face_scanner(ScriptedModel::scripted(vec![Ok(malformed), Ok(valid)]));
    let frame = SyntheticFrameBuilder::solid(64, 64, [0, 0, 0]);

    let err = scanner.scan(&frame, None).unwrap_err();
    match err {
        ScanError::UnexpectedModelOutput { observed, .. } => {
            assert!(observed.contains("scores[1x1x2]"), "observed: {observed}");
        }
        other => panic!("unexpected error: {other}"),
    }

    let scan = scanner.scan(&frame, None).unwrap();
    assert_eq!(scan.output.face_count(), 1);
}

#[test]
fn model_failure_is_inference_failed() {
    let scanner = face_scanner(ScriptedModel::scripted(vec![Err("handle closed".into())]));
    let err = scanner
        .scan(&SyntheticFrameBuilder::solid(8, 8, [0, 0, 0]), None)
        .unwrap_err();
    assert!(matches!(err, ScanError::InferenceFailed(ref m) if m.contains("handle closed")));
}

#[test]
fn trackers_count_inferences_until_reset() {
    let scanner = face_scanner(ScriptedModel::fixed(DetectorOutputBuilder::new().build()));
    let frame = SyntheticFrameBuilder::solid(16, 16, [0, 0, 0]);
    for _ in 0..3 {
        scanner.scan(&frame, None).unwrap();
    }

    let trackers = scanner.inference_trackers();
    assert_eq!(trackers.len(), 1);
    assert_eq!(trackers[0].summary().count, 3);
    assert_eq!(trackers[0].summary().name, "face");

    scanner.reset();
    assert_eq!(trackers[0].summary().count, 0);
}

#[test]
fn identity_scanner_output_is_tagged() {
    let scanner = IdentityScanner::Face(face_scanner(ScriptedModel::fixed(
        DetectorOutputBuilder::new()
            .candidate([0.2, 0.2, 0.8, 0.8], 0.9)
            .build(),
    )));
    let output = scanner
        .scan(&SyntheticFrameBuilder::solid(32, 32, [0, 0, 0]), None)
        .unwrap();

    assert!(matches!(&output, IdentityScanOutput::Face(scan) if scan.output.face_count() == 1));
    let json = serde_json::to_value(&output).unwrap();
    assert_eq!(json["kind"], "face");
}

#[test]
fn malformed_frame_is_dropped_and_pipeline_continues() {
    let malformed = DetectorOutputBuilder::new()
        .raw(SCORES, &[1, 0, 2], &[])
        .build();
    let valid = DetectorOutputBuilder::new()
        .candidate([0.1, 0.1, 0.3, 0.3], 0.9)
        .build();
    let scanner: Arc<dyn Scanner<Output = IdentityScanOutput>> = Arc::new(IdentityScanner::Face(
        face_scanner(ScriptedModel::scripted(vec![Ok(malformed), Ok(valid)])),
    ));

    let manager = ConcurrencyManager::new(
        ConcurrencyConfig::default()
            .with_max_concurrent_scans(1)
            .with_worker_threads(1),
    )
    .unwrap();
    let context: Arc<dyn CompletionContext> = Arc::new(SerialQueue::new("ui").unwrap());
    let (tx, rx) = crossbeam_channel::unbounded();

    for width in [64, 65] {
        let tx = tx.clone();
        manager.scan_frame(
            &scanner,
            SyntheticFrameBuilder::solid(width, 64, [0, 0, 0]),
            None,
            &context,
            move |output| {
                let _ = tx.send(output);
            },
        );
    }

    let output = rx.recv_timeout(Duration::from_secs(10)).expect("second frame");
    assert!(matches!(output, IdentityScanOutput::Face(scan) if scan.output.face_count() == 1));
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    assert_eq!(manager.stats().frames_dropped, 1);
    assert_eq!(manager.stats().frames_processed, 1);
}
