//! Detectors bind a loaded model and task thresholds to a single inference call.

mod document;
mod face;

pub use document::{DocumentDetector, DocumentDetectorConfig};
pub use face::{FaceDetector, FaceDetectorConfig};

use std::sync::Arc;

use image::imageops::FilterType;
use image::RgbImage;

use crate::decode::ModelOutputs;
use crate::domain::{CropRegion, ScanError, VideoFrame};
use crate::execution::is_primary_thread;

/// A memory-resident model that maps a square RGB image to named tensors.
pub trait InferenceModel: Send + Sync {
    /// Side length of the square input the model expects.
    fn input_size(&self) -> u32;

    /// Runs the model.
    ///
    /// # Errors
    ///
    /// Returns an error if the model run fails.
    fn predict(&self, input: &RgbImage) -> anyhow::Result<ModelOutputs>;
}

impl<T: InferenceModel + ?Sized> InferenceModel for Arc<T> {
    fn input_size(&self) -> u32 {
        (**self).input_size()
    }

    fn predict(&self, input: &RgbImage) -> anyhow::Result<ModelOutputs> {
        (**self).predict(input)
    }
}

/// A task-specific detector.
pub trait Detector: Send + Sync {
    /// Task-specific result.
    type Output: Send + 'static;

    /// Short name for logs and metrics.
    fn name(&self) -> &'static str;

    /// Runs inference on `region` of `frame` and decodes the result.
    ///
    /// Blocks for the duration of the model run. Must not be called on the
    /// primary thread.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::UnexpectedModelOutput`] if the model output cannot
    /// be decoded and [`ScanError::InferenceFailed`] if the run itself fails.
    fn detect(&self, frame: &VideoFrame, region: &CropRegion) -> Result<Self::Output, ScanError>;
}

/// Crops, resizes and runs `model` on a frame region.
pub(crate) fn run_model(
    model: &dyn InferenceModel,
    frame: &VideoFrame,
    region: &CropRegion,
) -> Result<ModelOutputs, ScanError> {
    debug_assert!(
        !is_primary_thread(),
        "detector inference must not run on the primary thread"
    );

    let crop = frame.region_rgb(region)?;
    let size = model.input_size();
    let input = if crop.dimensions() == (size, size) {
        crop
    } else {
        image::imageops::resize(&crop, size, size, FilterType::Triangle)
    };

    model
        .predict(&input)
        .map_err(|e| ScanError::InferenceFailed(format!("{e:#}")))
}
