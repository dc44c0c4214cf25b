//! A uniform "frame in, output out" contract over any detector.
//!
//! The concurrency manager only knows about [`Scanner`]; concrete detectors
//! are erased either behind `Arc<dyn Scanner<Output = _>>` or the
//! [`IdentityScanner`] enum.

mod tracker;

pub use tracker::{InferenceSummary, InferenceTracker};

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::debug;

use crate::detector::{Detector, DocumentDetector, FaceDetector};
use crate::domain::{
    CameraProperties, CropRegion, DocumentDetectorOutput, FaceDetectorOutput, FrameScan,
    ScanError, VideoFrame,
};

/// Runs a detector on a frame.
pub trait Scanner: Send + Sync {
    /// What one scan produces.
    type Output: Send + 'static;

    /// Scans the center-cropped square of `frame`.
    ///
    /// `camera` is the camera state captured when the frame was submitted.
    ///
    /// # Errors
    ///
    /// Propagates the detector's [`ScanError`].
    fn scan(
        &self,
        frame: &VideoFrame,
        camera: Option<&CameraProperties>,
    ) -> Result<Self::Output, ScanError>;

    /// Clears per-session state such as inference timings.
    fn reset(&self);

    /// Inference cost trackers owned by this scanner.
    fn inference_trackers(&self) -> Vec<Arc<InferenceTracker>>;
}

impl<S: Scanner + ?Sized> Scanner for Arc<S> {
    type Output = S::Output;

    fn scan(
        &self,
        frame: &VideoFrame,
        camera: Option<&CameraProperties>,
    ) -> Result<Self::Output, ScanError> {
        (**self).scan(frame, camera)
    }

    fn reset(&self) {
        (**self).reset();
    }

    fn inference_trackers(&self) -> Vec<Arc<InferenceTracker>> {
        (**self).inference_trackers()
    }
}

/// Adapts a [`Detector`] to the [`Scanner`] contract, timing every call.
pub struct DetectorScanner<D> {
    detector: D,
    tracker: Arc<InferenceTracker>,
}

impl<D: Detector> DetectorScanner<D> {
    /// Wraps a detector.
    #[must_use]
    pub fn new(detector: D) -> Self {
        let tracker = Arc::new(InferenceTracker::new(detector.name()));
        Self { detector, tracker }
    }

    /// The wrapped detector.
    #[must_use]
    pub const fn detector(&self) -> &D {
        &self.detector
    }
}

impl<D: Detector> Scanner for DetectorScanner<D> {
    type Output = FrameScan<D::Output>;

    fn scan(
        &self,
        frame: &VideoFrame,
        camera: Option<&CameraProperties>,
    ) -> Result<Self::Output, ScanError> {
        let region = CropRegion::center_square(frame.size());
        let started = Instant::now();
        let result = self.detector.detect(frame, &region);
        let elapsed = started.elapsed();
        self.tracker.record(elapsed);
        debug!(
            detector = self.detector.name(),
            ok = result.is_ok(),
            "inference took {elapsed:.2?}"
        );

        Ok(FrameScan {
            output: result?,
            camera: camera.cloned(),
        })
    }

    fn reset(&self) {
        self.tracker.reset();
    }

    fn inference_trackers(&self) -> Vec<Arc<InferenceTracker>> {
        vec![Arc::clone(&self.tracker)]
    }
}

/// Output of an [`IdentityScanner`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IdentityScanOutput {
    /// From the document scanner.
    Document(FrameScan<DocumentDetectorOutput>),
    /// From the face scanner.
    Face(FrameScan<FaceDetectorOutput>),
}

/// Tagged union over the scanners an identity-verification flow uses.
pub enum IdentityScanner {
    /// Scans for an identity document.
    Document(DetectorScanner<DocumentDetector>),
    /// Scans for faces.
    Face(DetectorScanner<FaceDetector>),
}

impl Scanner for IdentityScanner {
    type Output = IdentityScanOutput;

    fn scan(
        &self,
        frame: &VideoFrame,
        camera: Option<&CameraProperties>,
    ) -> Result<Self::Output, ScanError> {
        match self {
            Self::Document(s) => s.scan(frame, camera).map(IdentityScanOutput::Document),
            Self::Face(s) => s.scan(frame, camera).map(IdentityScanOutput::Face),
        }
    }

    fn reset(&self) {
        match self {
            Self::Document(s) => s.reset(),
            Self::Face(s) => s.reset(),
        }
    }

    fn inference_trackers(&self) -> Vec<Arc<InferenceTracker>> {
        match self {
            Self::Document(s) => s.inference_trackers(),
            Self::Face(s) => s.inference_trackers(),
        }
    }
}
