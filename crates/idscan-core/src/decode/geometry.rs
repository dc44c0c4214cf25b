//! Mapping between the model's square input space and frame space.

use crate::domain::{BoundingBox, CropRegion};

/// Maps a box from normalized crop coordinates to normalized frame coordinates.
///
/// For a center-cropped square this scales by `side / frame_dim` and offsets by
/// `(max - min) / 2` pixels along the frame's longer axis.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn crop_to_frame(bbox: &BoundingBox, region: &CropRegion) -> BoundingBox {
    let side = region.side as f32;
    let frame_w = region.frame.width as f32;
    let frame_h = region.frame.height as f32;

    BoundingBox::new(
        (bbox.x * side + region.x as f32) / frame_w,
        (bbox.y * side + region.y as f32) / frame_h,
        bbox.width * side / frame_w,
        bbox.height * side / frame_h,
    )
}

/// Inverse of [`crop_to_frame`].
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn frame_to_crop(bbox: &BoundingBox, region: &CropRegion) -> BoundingBox {
    let side = region.side as f32;
    let frame_w = region.frame.width as f32;
    let frame_h = region.frame.height as f32;

    BoundingBox::new(
        (bbox.x * frame_w - region.x as f32) / side,
        (bbox.y * frame_h - region.y as f32) / side,
        bbox.width * frame_w / side,
        bbox.height * frame_h / side,
    )
}
