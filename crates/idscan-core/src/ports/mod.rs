//! Port definitions for the pipeline's external collaborators.
//!
//! Adapters for the network, the camera, still-image frame sources and the
//! caller's execution context implement these traits.

mod camera;
mod completion;
mod fetcher;
mod frame_source;

pub use camera::CameraDevice;
pub use completion::{CompletionContext, Job};
pub use fetcher::ModelFetcher;
pub use frame_source::{FrameSource, SourceFrame};
