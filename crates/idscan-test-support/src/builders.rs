//! Synthetic frame and model-output builders for testing.

use image::{Rgb, RgbImage};
use idscan_core::decode::{ModelOutputs, OutputTensor, BOXES, CLASSES, SCORES};
use idscan_core::domain::{PixelFormat, VideoFrame};

/// Builder for creating synthetic test frames.
pub struct SyntheticFrameBuilder;

impl SyntheticFrameBuilder {
    /// Creates a uniform RGB frame.
    #[must_use]
    pub fn solid(width: u32, height: u32, color: [u8; 3]) -> VideoFrame {
        VideoFrame::from_rgb_image(RgbImage::from_pixel(width, height, Rgb(color)))
    }

    /// Creates a frame whose pixel at `(x, y)` is `[x, y, 0]` (mod 256).
    ///
    /// Useful for checking which region of a frame reached the model.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn coordinates(width: u32, height: u32) -> VideoFrame {
        VideoFrame::from_rgb_image(RgbImage::from_fn(width, height, |x, y| {
            Rgb([x as u8, y as u8, 0])
        }))
    }

    /// Creates a uniform frame in any pixel format.
    ///
    /// `color` is RGB; it is re-encoded for `format` (luma uses the red channel).
    ///
    /// # Panics
    ///
    /// Never for valid dimensions: the buffer is sized for the format.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn solid_in_format(
        width: u32,
        height: u32,
        color: [u8; 3],
        format: PixelFormat,
    ) -> VideoFrame {
        let [r, g, b] = color;
        let pixel: Vec<u8> = match format {
            PixelFormat::Rgb8 => vec![r, g, b],
            PixelFormat::Rgba8 => vec![r, g, b, 255],
            PixelFormat::Bgra8 => vec![b, g, r, 255],
            PixelFormat::Luma8 => vec![r],
            _ => unreachable!("unsupported pixel format {format:?}"),
        };
        let count = width as usize * height as usize;
        let data: Vec<u8> = pixel.iter().copied().cycle().take(count * pixel.len()).collect();
        VideoFrame::new(data, format, width, height).expect("buffer sized for format")
    }
}

/// Builder for detector model outputs.
///
/// Produces `boxes` as `1xNx4`, `scores` as `1xNx1` and, when given,
/// `classes` as `1xNxC`.
#[derive(Debug, Default, Clone)]
pub struct DetectorOutputBuilder {
    boxes: Vec<[f32; 4]>,
    scores: Vec<f32>,
    classes: Option<Vec<Vec<f32>>>,
    extra: Vec<(String, Vec<usize>, Vec<f32>)>,
}

impl DetectorOutputBuilder {
    /// Creates an empty builder (zero candidates).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one candidate row.
    #[must_use]
    pub fn candidate(mut self, bbox: [f32; 4], score: f32) -> Self {
        self.boxes.push(bbox);
        self.scores.push(score);
        self
    }

    /// Adds one candidate row with per-class scores.
    #[must_use]
    pub fn classified(mut self, bbox: [f32; 4], score: f32, classes: &[f32]) -> Self {
        self.boxes.push(bbox);
        self.scores.push(score);
        self.classes
            .get_or_insert_with(Vec::new)
            .push(classes.to_vec());
        self
    }

    /// Adds or overrides a raw tensor, e.g. to produce malformed output.
    #[must_use]
    pub fn raw(mut self, name: &str, shape: &[usize], data: &[f32]) -> Self {
        self.extra.push((name.to_owned(), shape.to_vec(), data.to_vec()));
        self
    }

    /// Builds the outputs.
    ///
    /// # Panics
    ///
    /// Panics if a raw tensor's data does not match its shape, or if class
    /// rows have different lengths.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn build(self) -> ModelOutputs {
        let n = self.boxes.len();
        let mut outputs = ModelOutputs::new()
            .with(
                BOXES,
                OutputTensor::new(vec![1, n, 4], self.boxes.concat()).expect("boxes"),
            )
            .with(
                SCORES,
                OutputTensor::new(vec![1, n, 1], self.scores).expect("scores"),
            );
        if let Some(classes) = self.classes {
            let width = classes.first().map_or(0, Vec::len);
            outputs.insert(
                CLASSES,
                OutputTensor::new(vec![1, classes.len(), width], classes.concat())
                    .expect("classes"),
            );
        }
        for (name, shape, data) in self.extra {
            outputs.insert(name, OutputTensor::new(shape, data).expect("raw tensor"));
        }
        outputs
    }
}
