//! Video frames handed to the pipeline by the capture collaborator.

use std::sync::Arc;
use std::time::Duration;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use super::ScanError;

/// Layout of the bytes in a [`VideoFrame`] buffer.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// 8-bit red, green, blue.
    Rgb8,
    /// 8-bit red, green, blue, alpha.
    Rgba8,
    /// 8-bit blue, green, red, alpha (the usual camera buffer layout).
    Bgra8,
    /// 8-bit luminance.
    Luma8,
}

impl PixelFormat {
    /// Bytes per pixel.
    #[must_use]
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgb8 => 3,
            Self::Rgba8 | Self::Bgra8 => 4,
            Self::Luma8 => 1,
        }
    }

    fn rgb_at(self, px: &[u8]) -> [u8; 3] {
        match self {
            Self::Rgb8 | Self::Rgba8 => [px[0], px[1], px[2]],
            Self::Bgra8 => [px[2], px[1], px[0]],
            Self::Luma8 => [px[0], px[0], px[0]],
        }
    }
}

/// Width and height of a frame in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl FrameSize {
    /// Creates a new frame size.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Length of the shorter side.
    #[must_use]
    pub fn min_side(self) -> u32 {
        self.width.min(self.height)
    }

    /// Length of the longer side.
    #[must_use]
    pub fn max_side(self) -> u32 {
        self.width.max(self.height)
    }
}

/// Pixel rectangle of a frame that a model is run against.
///
/// Detector models only see a square; [`CropRegion::center_square`] is the
/// largest square centered in the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    /// Size of the full frame the region was cut from.
    pub frame: FrameSize,
    /// Left edge in pixels.
    pub x: u32,
    /// Top edge in pixels.
    pub y: u32,
    /// Side length in pixels.
    pub side: u32,
}

impl CropRegion {
    /// The largest square centered within a frame of the given size.
    ///
    /// The square is offset by `(max - min) / 2` along the longer axis.
    #[must_use]
    pub fn center_square(frame: FrameSize) -> Self {
        let side = frame.min_side();
        let offset = (frame.max_side() - side) / 2;
        let (x, y) = if frame.width >= frame.height {
            (offset, 0)
        } else {
            (0, offset)
        };
        Self { frame, x, y, side }
    }
}

/// Camera state captured at the instant a frame was handed to the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraProperties {
    /// Exposure duration of the sensor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exposure_duration: Option<Duration>,
    /// Sensor ISO.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exposure_iso: Option<f32>,
    /// Focal length in millimetres.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focal_length_mm: Option<f32>,
    /// Lens position, 0.0 (nearest) to 1.0 (furthest).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lens_position: Option<f32>,
    /// Whether autofocus was moving the lens.
    pub is_adjusting_focus: bool,
    /// Capture device identifier (e.g. "wide-angle").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
}

/// An immutable 2D pixel buffer from the capture collaborator.
///
/// The buffer is shared with the capture subsystem through an [`Arc`]; the
/// pipeline drops its clone as soon as the inference call for the frame returns.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    data: Arc<[u8]>,
    format: PixelFormat,
    size: FrameSize,
    camera: Option<CameraProperties>,
}

impl VideoFrame {
    /// Wraps a pixel buffer.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::InferenceFailed`] if the buffer length does not match
    /// `width * height * bytes_per_pixel`.
    pub fn new(
        data: impl Into<Arc<[u8]>>,
        format: PixelFormat,
        width: u32,
        height: u32,
    ) -> Result<Self, ScanError> {
        let data = data.into();
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if data.len() != expected {
            return Err(ScanError::InferenceFailed(format!(
                "frame buffer has {} bytes, expected {expected} for {width}x{height} {format:?}",
                data.len()
            )));
        }
        Ok(Self {
            data,
            format,
            size: FrameSize::new(width, height),
            camera: None,
        })
    }

    /// Builds a frame from a decoded RGB image.
    #[must_use]
    pub fn from_rgb_image(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            data: image.into_raw().into(),
            format: PixelFormat::Rgb8,
            size: FrameSize::new(width, height),
            camera: None,
        }
    }

    /// Attaches the camera state that was current when the frame was captured.
    #[must_use]
    pub fn with_camera_properties(mut self, camera: CameraProperties) -> Self {
        self.camera = Some(camera);
        self
    }

    /// Frame dimensions.
    #[must_use]
    pub const fn size(&self) -> FrameSize {
        self.size
    }

    /// Pixel layout.
    #[must_use]
    pub const fn format(&self) -> PixelFormat {
        self.format
    }

    /// Raw pixel bytes, row-major without padding.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Camera state captured with the frame, if any.
    #[must_use]
    pub const fn camera_properties(&self) -> Option<&CameraProperties> {
        self.camera.as_ref()
    }

    /// Copies a region of the frame into an RGB image.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::InferenceFailed`] if the region does not fit inside the frame.
    pub fn region_rgb(&self, region: &CropRegion) -> Result<RgbImage, ScanError> {
        let fits = region.side > 0
            && region.x + region.side <= self.size.width
            && region.y + region.side <= self.size.height;
        if !fits {
            return Err(ScanError::InferenceFailed(format!(
                "crop region {region:?} outside {}x{} frame",
                self.size.width, self.size.height
            )));
        }

        let bpp = self.format.bytes_per_pixel();
        let stride = self.size.width as usize * bpp;
        let image = RgbImage::from_fn(region.side, region.side, |x, y| {
            let row = (region.y + y) as usize * stride;
            let col = (region.x + x) as usize * bpp;
            image::Rgb(self.format.rgb_at(&self.data[row + col..row + col + bpp]))
        });
        Ok(image)
    }
}
