//! Core domain types for the detection pipeline.

mod detection;
mod error;
mod frame;
mod output;

pub use detection::{BoundingBox, Detection, DetectionCandidate};
pub use error::{LoadStage, ModelLoadError, ScanError};
pub use frame::{CameraProperties, CropRegion, FrameSize, PixelFormat, VideoFrame};
pub use output::{
    DocumentClass, DocumentDetection, DocumentDetectorOutput, FaceDetectorOutput, FrameScan,
};
