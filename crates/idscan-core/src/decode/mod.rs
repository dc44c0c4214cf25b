//! Decoding raw detector tensors into [`Detection`]s.
//!
//! The decoder is pure: it validates the `boxes` / `scores` (and optional
//! `classes`) tensors, drops low-score and out-of-bounds rows, runs
//! non-maximum suppression and maps the survivors from the model's square
//! input space back into the original frame.

mod geometry;
mod nms;
mod tensor;

pub use geometry::{crop_to_frame, frame_to_crop};
pub use nms::non_max_suppression;
pub use tensor::{ModelOutputs, OutputTensor};

use crate::domain::{BoundingBox, CropRegion, Detection, DetectionCandidate, ScanError};

/// Name of the box tensor.
pub const BOXES: &str = "boxes";
/// Name of the score tensor.
pub const SCORES: &str = "scores";
/// Name of the optional per-class score tensor.
pub const CLASSES: &str = "classes";

/// How the four values of a box row are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxFormat {
    /// `[x, y, width, height]`
    OriginSize,
    /// `[min_x, min_y, max_x, max_y]`
    Corners,
}

impl BoxFormat {
    fn to_bbox(self, row: &[f32]) -> BoundingBox {
        match self {
            Self::OriginSize => BoundingBox::new(row[0], row[1], row[2], row[3]),
            Self::Corners => BoundingBox::from_corners(row[0], row[1], row[2], row[3]),
        }
    }
}

/// Thresholds and layout for one detector task.
#[derive(Debug, Clone, PartialEq)]
pub struct DecoderConfig {
    /// Candidates scoring below this are dropped.
    pub min_score: f32,
    /// Candidates overlapping a better one by more than this IOU are dropped.
    pub iou_threshold: f32,
    /// Upper bound on returned detections.
    pub max_results: usize,
    /// Layout of the box rows.
    pub box_format: BoxFormat,
    /// When set, a `classes` tensor with this many columns is required.
    pub num_classes: Option<usize>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            min_score: 0.5,
            iou_threshold: 0.5,
            max_results: 1,
            box_format: BoxFormat::OriginSize,
            num_classes: None,
        }
    }
}

/// Decodes one model run into frame-space detections, best first.
///
/// # Errors
///
/// Returns [`ScanError::UnexpectedModelOutput`] when a required tensor is
/// missing or the shapes are not `boxes: 1xNx4`, `scores: 1xNx1` and (when
/// `num_classes` is set) `classes: 1xNxC`.
pub fn decode(
    outputs: &ModelOutputs,
    region: &CropRegion,
    config: &DecoderConfig,
) -> Result<Vec<Detection>, ScanError> {
    let candidates = candidates(outputs, config)?;
    let kept = non_max_suppression(candidates, config.iou_threshold, config.max_results);

    Ok(kept
        .into_iter()
        .map(|c| Detection {
            bbox: crop_to_frame(&c.bbox, region),
            score: c.score,
            class_scores: c.class_scores,
        })
        .collect())
}

/// Validates the tensors and returns the rows that pass the score and bounds filters.
///
/// # Errors
///
/// See [`decode`].
pub fn candidates(
    outputs: &ModelOutputs,
    config: &DecoderConfig,
) -> Result<Vec<DetectionCandidate>, ScanError> {
    let boxes = require(outputs, BOXES)?;
    let scores = require(outputs, SCORES)?;
    let n = rows(outputs, BOXES, boxes, Some(4))?;
    let score_rows = rows(outputs, SCORES, scores, Some(1))?;
    if score_rows != n {
        return Err(unexpected(
            outputs,
            format!("{BOXES} has {n} rows but {SCORES} has {score_rows}"),
        ));
    }

    let classes = match config.num_classes {
        Some(c) => {
            let tensor = require(outputs, CLASSES)?;
            let class_rows = rows(outputs, CLASSES, tensor, Some(c))?;
            if class_rows != n {
                return Err(unexpected(
                    outputs,
                    format!("{BOXES} has {n} rows but {CLASSES} has {class_rows}"),
                ));
            }
            Some((tensor.data(), c))
        }
        None => None,
    };

    let mut out = Vec::new();
    for (index, (row, &score)) in boxes
        .data()
        .chunks_exact(4)
        .zip(scores.data())
        .enumerate()
    {
        if score.is_nan() || score < config.min_score {
            continue;
        }
        let bbox = config.box_format.to_bbox(row);
        if !bbox.is_within_unit_square() {
            continue;
        }
        let class_scores = classes.map(|(data, c)| data[index * c..(index + 1) * c].to_vec());
        out.push(DetectionCandidate {
            index,
            bbox,
            score,
            class_scores,
        });
    }
    Ok(out)
}

fn require<'a>(outputs: &'a ModelOutputs, name: &str) -> Result<&'a OutputTensor, ScanError> {
    outputs
        .get(name)
        .ok_or_else(|| unexpected(outputs, format!("missing `{name}` tensor")))
}

/// Checks a `1xNxD` shape and returns `N`.
fn rows(
    outputs: &ModelOutputs,
    name: &str,
    tensor: &OutputTensor,
    last_dim: Option<usize>,
) -> Result<usize, ScanError> {
    match (tensor.shape(), last_dim) {
        ([1, n, d], Some(expected)) if *d == expected => Ok(*n),
        ([1, n, d], None) if *d > 0 => Ok(*n),
        (shape, _) => Err(unexpected(
            outputs,
            format!(
                "`{name}` has shape {shape:?}, expected [1, N, {}]",
                last_dim.map_or_else(|| String::from("C"), |d| d.to_string())
            ),
        )),
    }
}

fn unexpected(outputs: &ModelOutputs, reason: String) -> ScanError {
    ScanError::UnexpectedModelOutput {
        reason,
        observed: outputs.describe(),
    }
}
