//! Camera port.

use crate::domain::CameraProperties;

/// Handle to the capture session that produced a frame.
pub trait CameraDevice: Send + Sync {
    /// Camera state right now.
    fn properties(&self) -> CameraProperties;
}
