//! Frame source port for feeding frames from outside a live camera session.

use crate::domain::VideoFrame;

/// A frame together with where it came from.
#[derive(Debug, Clone)]
pub struct SourceFrame {
    /// Origin of the frame, e.g. a file path.
    pub origin: String,
    /// The frame.
    pub frame: VideoFrame,
}

/// Port for producing frames from a finite source.
pub trait FrameSource: Send + Sync {
    /// Returns an iterator over frames from this source.
    ///
    /// # Errors
    ///
    /// Individual items may be errors if a frame fails to load.
    fn frames(&self) -> Box<dyn Iterator<Item = anyhow::Result<SourceFrame>> + Send + '_>;

    /// Returns the total number of frames, if known.
    fn count_hint(&self) -> Option<usize>;
}
