//! Bounding boxes and detections.

use serde::{Deserialize, Serialize};

/// Axis-aligned box in normalized `[0, 1]` coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge.
    pub x: f32,
    /// Top edge.
    pub y: f32,
    /// Width.
    pub width: f32,
    /// Height.
    pub height: f32,
}

impl BoundingBox {
    /// Creates a box from its origin and size.
    #[must_use]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Creates a box from its min and max corners.
    #[must_use]
    pub fn from_corners(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Self {
        Self::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }

    /// Right edge.
    #[must_use]
    pub fn max_x(&self) -> f32 {
        self.x + self.width
    }

    /// Bottom edge.
    #[must_use]
    pub fn max_y(&self) -> f32 {
        self.y + self.height
    }

    /// Area of the box; zero for degenerate boxes.
    #[must_use]
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Whether the box lies entirely inside the unit square and has a
    /// non-negative size. NaN coordinates are rejected.
    #[must_use]
    pub fn is_within_unit_square(&self) -> bool {
        let unit = 0.0..=1.0;
        self.width >= 0.0
            && self.height >= 0.0
            && unit.contains(&self.x)
            && unit.contains(&self.y)
            && unit.contains(&self.max_x())
            && unit.contains(&self.max_y())
    }

    /// Intersection over union with another box.
    #[must_use]
    pub fn iou(&self, other: &Self) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.max_x().min(other.max_x());
        let y2 = self.max_y().min(other.max_y());

        let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

/// One raw model output row, in the model's square input space.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionCandidate {
    /// Index of the row in the model output.
    pub index: usize,
    /// Box in normalized center-cropped-square coordinates.
    pub bbox: BoundingBox,
    /// Confidence score.
    pub score: f32,
    /// Per-class scores, when the model emits them.
    pub class_scores: Option<Vec<f32>>,
}

/// A thresholded, deduplicated detection in normalized coordinates of the
/// original (uncropped) frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Box in normalized frame coordinates.
    pub bbox: BoundingBox,
    /// Confidence score.
    pub score: f32,
    /// Per-class scores, when the model emits them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_scores: Option<Vec<f32>>,
}
