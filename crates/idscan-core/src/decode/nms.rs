//! Greedy non-maximum suppression.

use crate::domain::DetectionCandidate;

/// Keeps the highest-scoring candidates, dropping any whose IOU with an
/// already kept candidate exceeds `iou_threshold`.
///
/// Candidates are visited in descending score order (ties keep their input
/// order) and at most `max_results` are returned. Running this on its own
/// output returns the same output.
#[must_use]
pub fn non_max_suppression(
    mut candidates: Vec<DetectionCandidate>,
    iou_threshold: f32,
    max_results: usize,
) -> Vec<DetectionCandidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<DetectionCandidate> = Vec::with_capacity(max_results.min(candidates.len()));
    for candidate in candidates {
        if kept.len() >= max_results {
            break;
        }
        let overlaps = kept
            .iter()
            .any(|k| k.bbox.iou(&candidate.bbox) > iou_threshold);
        if !overlaps {
            kept.push(candidate);
        }
    }
    kept
}
