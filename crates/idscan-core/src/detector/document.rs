//! Document detection: zero or one document with a classification label.

use std::sync::Arc;

use tracing::trace;

use super::{run_model, Detector, InferenceModel};
use crate::decode::{decode, BoxFormat, DecoderConfig};
use crate::domain::{
    CropRegion, DocumentClass, DocumentDetection, DocumentDetectorOutput, ScanError, VideoFrame,
};

/// Thresholds for the document detector.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentDetectorConfig {
    /// Minimum detection score.
    pub min_score: f32,
    /// NMS IOU threshold.
    pub iou_threshold: f32,
}

impl Default for DocumentDetectorConfig {
    fn default() -> Self {
        Self {
            min_score: 0.4,
            iou_threshold: 0.5,
        }
    }
}

impl DocumentDetectorConfig {
    fn decoder(&self) -> DecoderConfig {
        DecoderConfig {
            min_score: self.min_score,
            iou_threshold: self.iou_threshold,
            max_results: 1,
            box_format: BoxFormat::OriginSize,
            num_classes: Some(DocumentClass::ALL.len()),
        }
    }
}

/// Finds the best identity document in a frame.
///
/// Expects `boxes` rows as `[x, y, width, height]`, `scores` as `1xNx1` and a
/// `classes` tensor with one column per [`DocumentClass`].
pub struct DocumentDetector {
    model: Arc<dyn InferenceModel>,
    config: DocumentDetectorConfig,
}

impl DocumentDetector {
    /// Creates a detector around a loaded model.
    #[must_use]
    pub fn new(model: Arc<dyn InferenceModel>, config: DocumentDetectorConfig) -> Self {
        Self { model, config }
    }
}

impl Detector for DocumentDetector {
    type Output = DocumentDetectorOutput;

    fn name(&self) -> &'static str {
        "document"
    }

    fn detect(&self, frame: &VideoFrame, region: &CropRegion) -> Result<Self::Output, ScanError> {
        let outputs = run_model(self.model.as_ref(), frame, region)?;
        let best = decode(&outputs, region, &self.config.decoder())?
            .into_iter()
            .next();

        let Some(detection) = best else {
            return Ok(DocumentDetectorOutput::default());
        };

        let scores = detection.class_scores.clone().unwrap_or_default();
        let (classification, _) = DocumentClass::ALL
            .iter()
            .copied()
            .zip(scores.iter().copied())
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .ok_or_else(|| ScanError::UnexpectedModelOutput {
                reason: String::from("detection has no class scores"),
                observed: outputs.describe(),
            })?;
        let all_class_scores = DocumentClass::ALL.iter().copied().zip(scores).collect();

        trace!(?classification, score = detection.score, "document detected");
        Ok(DocumentDetectorOutput {
            document: Some(DocumentDetection {
                detection,
                classification,
                all_class_scores,
            }),
        })
    }
}
