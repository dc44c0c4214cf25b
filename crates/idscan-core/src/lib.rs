//! idscan core - on-device document and face detection pipeline
//!
//! This crate contains the domain types, the detector output decoder, the
//! document and face detectors, the scanner abstraction, the model loader and
//! the bounded-concurrency frame dispatcher. Collaborators at the system
//! boundary (network, camera, completion context) are reached through the
//! traits in [`ports`].

pub mod concurrency;
pub mod decode;
pub mod detector;
pub mod domain;
pub mod execution;
pub mod inference;
pub mod loader;
pub mod ports;
pub mod scanner;

pub use concurrency::{ConcurrencyConfig, ConcurrencyManager, SerialQueue, ThroughputStats};
pub use detector::{
    Detector, DocumentDetector, DocumentDetectorConfig, FaceDetector, FaceDetectorConfig,
    InferenceModel,
};
pub use domain::{
    BoundingBox, CameraProperties, CropRegion, Detection, DocumentClass, DocumentDetection,
    DocumentDetectorOutput, FaceDetectorOutput, FrameScan, FrameSize, LoadStage, ModelLoadError,
    PixelFormat, ScanError, VideoFrame,
};
pub use loader::{LoadedModel, ModelCache, ModelCompiler, ModelLoader, ModelReference};
pub use ports::{CameraDevice, CompletionContext, FrameSource, Job, ModelFetcher, SourceFrame};
pub use scanner::{DetectorScanner, IdentityScanOutput, IdentityScanner, Scanner};
