//! Face detection: up to two faces per frame.

use std::sync::Arc;

use super::{run_model, Detector, InferenceModel};
use crate::decode::{decode, BoxFormat, DecoderConfig};
use crate::domain::{CropRegion, FaceDetectorOutput, ScanError, VideoFrame};

/// Thresholds for the face detector.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceDetectorConfig {
    /// Minimum face confidence.
    pub min_score: f32,
    /// NMS IOU threshold.
    pub iou_threshold: f32,
}

impl Default for FaceDetectorConfig {
    fn default() -> Self {
        Self {
            min_score: 0.75,
            iou_threshold: 0.3,
        }
    }
}

impl FaceDetectorConfig {
    /// Sets the minimum face confidence.
    #[must_use]
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    /// Sets the NMS IOU threshold.
    #[must_use]
    pub fn with_iou_threshold(mut self, iou_threshold: f32) -> Self {
        self.iou_threshold = iou_threshold;
        self
    }
}

/// Two results are enough to distinguish no face, one face and several faces.
const MAX_FACES: usize = 2;

/// Finds faces in a frame.
///
/// Expects `boxes` rows as `[min_x, min_y, max_x, max_y]` and `scores` as `1xNx1`.
pub struct FaceDetector {
    model: Arc<dyn InferenceModel>,
    decoder: DecoderConfig,
}

impl FaceDetector {
    /// Creates a detector around a loaded model.
    #[must_use]
    pub fn new(model: Arc<dyn InferenceModel>, config: &FaceDetectorConfig) -> Self {
        Self {
            model,
            decoder: DecoderConfig {
                min_score: config.min_score,
                iou_threshold: config.iou_threshold,
                max_results: MAX_FACES,
                box_format: BoxFormat::Corners,
                num_classes: None,
            },
        }
    }
}

impl Detector for FaceDetector {
    type Output = FaceDetectorOutput;

    fn name(&self) -> &'static str {
        "face"
    }

    fn detect(&self, frame: &VideoFrame, region: &CropRegion) -> Result<Self::Output, ScanError> {
        let outputs = run_model(self.model.as_ref(), frame, region)?;
        let faces = decode(&outputs, region, &self.decoder)?;
        Ok(FaceDetectorOutput { faces })
    }
}
