//! `BlazeFace` short-range face detector.
//!
//! Architecture of "`BlazeFace`: Sub-millisecond Neural Face Detection on
//! Mobile GPUs", loaded from the folded-BatchNorm weights published at
//! <https://github.com/hollance/BlazeFace-PyTorch>. The model emits one
//! candidate per anchor; thresholds and NMS are left to the decoder.

// Allow common ML code patterns
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]

use anyhow::{Context, Result};
use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{conv2d, Conv2d, Conv2dConfig, VarBuilder};
use image::imageops::FilterType;
use image::RgbImage;

use crate::decode::{ModelOutputs, OutputTensor, BOXES, SCORES};
use crate::detector::InferenceModel;

/// Side of the square input `BlazeFace` expects.
pub const INPUT_SIZE: usize = 128;

/// Number of anchors, one candidate each.
pub const NUM_ANCHORS: usize = 896;

/// Regressor values per anchor: box (4) followed by six keypoints (12).
const REGRESSOR_WIDTH: usize = 16;

/// Depthwise-separable residual block. Convolutions carry biases because
/// BatchNorm is folded into the published weights.
struct BlazeBlock {
    depthwise: Conv2d,
    pointwise: Conv2d,
    channel_pad: usize,
    stride: usize,
}

impl BlazeBlock {
    fn new(in_channels: usize, out_channels: usize, stride: usize, vb: &VarBuilder) -> Result<Self> {
        let depthwise = conv2d(
            in_channels,
            in_channels,
            3,
            Conv2dConfig {
                stride,
                // Stride-2 blocks pad asymmetrically in `forward` instead.
                padding: usize::from(stride != 2),
                groups: in_channels,
                dilation: 1,
            },
            vb.pp("depthwise"),
        )?;
        let pointwise = conv2d(
            in_channels,
            out_channels,
            1,
            Conv2dConfig::default(),
            vb.pp("pointwise"),
        )?;

        Ok(Self {
            depthwise,
            pointwise,
            channel_pad: out_channels.saturating_sub(in_channels),
            stride,
        })
    }
}

impl Module for BlazeBlock {
    fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        let (input, residual) = if self.stride == 2 {
            (
                x.pad_with_zeros(2, 0, 2)?.pad_with_zeros(3, 0, 2)?,
                x.max_pool2d(2)?,
            )
        } else {
            (x.clone(), x.clone())
        };

        let h = self.depthwise.forward(&input)?.relu()?;
        let h = self.pointwise.forward(&h)?;

        let residual = if self.channel_pad > 0 {
            residual.pad_with_zeros(1, 0, self.channel_pad)?
        } else {
            residual
        };
        (h + residual)?.relu()
    }
}

/// Builds a chain of blocks from `(in, out, stride)` triples.
fn blocks(config: &[(usize, usize, usize)], vb: &VarBuilder) -> Result<Vec<BlazeBlock>> {
    config
        .iter()
        .enumerate()
        .map(|(i, &(in_c, out_c, stride))| BlazeBlock::new(in_c, out_c, stride, &vb.pp(i.to_string())))
        .collect()
}

/// `BlazeFace` model.
pub struct BlazeFace {
    conv0: Conv2d,

    // 16x16 feature map
    backbone1: Vec<BlazeBlock>,

    // 8x8 feature map
    backbone2: Vec<BlazeBlock>,

    classifier_16: Conv2d,
    regressor_16: Conv2d,
    classifier_8: Conv2d,
    regressor_8: Conv2d,

    /// Anchor centers, `NUM_ANCHORS` rows of `[cx, cy]`.
    anchors: Vec<[f32; 2]>,

    device: Device,
}

impl BlazeFace {
    /// Creates a new `BlazeFace` model from weights.
    ///
    /// # Errors
    ///
    /// Returns an error if model weights cannot be loaded or are invalid.
    #[allow(clippy::needless_pass_by_value)]
    pub fn new(vb: VarBuilder) -> Result<Self> {
        let device = vb.device().clone();

        let conv0 = conv2d(
            3,
            24,
            5,
            Conv2dConfig {
                stride: 2,
                padding: 0,
                ..Conv2dConfig::default()
            },
            vb.pp("conv0"),
        )?;

        let backbone1 = blocks(
            &[
                (24, 24, 1),
                (24, 28, 1),
                (28, 32, 2),
                (32, 36, 1),
                (36, 42, 1),
                (42, 48, 2),
                (48, 56, 1),
                (56, 64, 1),
                (64, 72, 1),
                (72, 80, 1),
                (80, 88, 1),
            ],
            &vb.pp("backbone1"),
        )?;
        let backbone2 = blocks(
            &[(88, 96, 2), (96, 96, 1), (96, 96, 1), (96, 96, 1), (96, 96, 1)],
            &vb.pp("backbone2"),
        )?;

        // Heads: 2 anchors per 16x16 cell, 6 per 8x8 cell.
        let head = |in_c: usize, out_c: usize, name: &str| conv2d(in_c, out_c, 1, Conv2dConfig::default(), vb.pp(name));
        Ok(Self {
            conv0,
            backbone1,
            backbone2,
            classifier_16: head(88, 2, "classifier_16")?,
            regressor_16: head(88, 2 * REGRESSOR_WIDTH, "regressor_16")?,
            classifier_8: head(96, 6, "classifier_8")?,
            regressor_8: head(96, 6 * REGRESSOR_WIDTH, "regressor_8")?,
            anchors: Self::generate_anchors(),
            device,
        })
    }

    /// Anchor centers for the two feature map scales.
    fn generate_anchors() -> Vec<[f32; 2]> {
        let mut anchors = Vec::with_capacity(NUM_ANCHORS);

        // 16x16 feature map: 2 anchors per location = 512 anchors
        for y in 0..16_u8 {
            for x in 0..16_u8 {
                let center = [(f32::from(x) + 0.5) / 16.0, (f32::from(y) + 0.5) / 16.0];
                anchors.extend([center; 2]);
            }
        }

        // 8x8 feature map: 6 anchors per location = 384 anchors
        for y in 0..8_u8 {
            for x in 0..8_u8 {
                let center = [(f32::from(x) + 0.5) / 8.0, (f32::from(y) + 0.5) / 8.0];
                anchors.extend([center; 6]);
            }
        }

        anchors
    }

    /// Converts an RGB image into a `(1, 3, 128, 128)` tensor in `[-1, 1]`.
    fn preprocess(&self, image: &RgbImage) -> Result<Tensor> {
        let size = INPUT_SIZE as u32;
        let resized;
        let image = if image.dimensions() == (size, size) {
            image
        } else {
            resized = image::imageops::resize(image, size, size, FilterType::Triangle);
            &resized
        };

        let data: Vec<f32> = image
            .pixels()
            .flat_map(|p| p.0.map(|c| (f32::from(c) / 127.5) - 1.0))
            .collect();

        Tensor::from_vec(data, (1, INPUT_SIZE, INPUT_SIZE, 3), &self.device)?
            .permute((0, 3, 1, 2))?
            .to_dtype(DType::F32)
            .context("Failed to preprocess image")
    }

    /// Runs the backbone and both detection heads.
    fn forward(&self, x: &Tensor) -> Result<(Tensor, Tensor)> {
        let x = x.pad_with_zeros(2, 1, 2)?.pad_with_zeros(3, 1, 2)?;
        let mut h = self.conv0.forward(&x)?.relu()?;
        for block in &self.backbone1 {
            h = block.forward(&h)?;
        }
        let feature_16 = h.clone();
        for block in &self.backbone2 {
            h = block.forward(&h)?;
        }
        let feature_8 = h;

        // NCHW head outputs to (1, anchors, width).
        let flatten = |head: &Conv2d, features: &Tensor, anchors: usize, width: usize| -> Result<Tensor> {
            Ok(head
                .forward(features)?
                .permute((0, 2, 3, 1))?
                .reshape((1, anchors, width))?)
        };

        let scores = Tensor::cat(
            &[
                flatten(&self.classifier_16, &feature_16, 512, 1)?,
                flatten(&self.classifier_8, &feature_8, 384, 1)?,
            ],
            1,
        )?;
        let regressors = Tensor::cat(
            &[
                flatten(&self.regressor_16, &feature_16, 512, REGRESSOR_WIDTH)?,
                flatten(&self.regressor_8, &feature_8, 384, REGRESSOR_WIDTH)?,
            ],
            1,
        )?;

        Ok((scores, regressors))
    }

    /// Turns raw head outputs into `boxes` (corner format, clamped to the
    /// unit square) and `scores` (sigmoid) tensors.
    fn to_outputs(&self, scores: &Tensor, regressors: &Tensor) -> Result<ModelOutputs> {
        let logits = scores.flatten_all()?.to_vec1::<f32>()?;
        let raw = regressors.flatten_all()?.to_vec1::<f32>()?;
        anyhow::ensure!(
            logits.len() == NUM_ANCHORS && raw.len() == NUM_ANCHORS * REGRESSOR_WIDTH,
            "unexpected head sizes: {} scores, {} regressors",
            logits.len(),
            raw.len()
        );

        let scale = INPUT_SIZE as f32;
        let mut boxes = Vec::with_capacity(NUM_ANCHORS * 4);
        for (anchor, row) in self.anchors.iter().zip(raw.chunks_exact(REGRESSOR_WIDTH)) {
            let cx = anchor[0] + row[0] / scale;
            let cy = anchor[1] + row[1] / scale;
            let w = row[2] / scale;
            let h = row[3] / scale;
            boxes.extend([
                (cx - w / 2.0).clamp(0.0, 1.0),
                (cy - h / 2.0).clamp(0.0, 1.0),
                (cx + w / 2.0).clamp(0.0, 1.0),
                (cy + h / 2.0).clamp(0.0, 1.0),
            ]);
        }
        let scores: Vec<f32> = logits.into_iter().map(logistic).collect();

        let boxes = OutputTensor::new(vec![1, NUM_ANCHORS, 4], boxes)
            .context("box tensor size mismatch")?;
        let scores = OutputTensor::new(vec![1, NUM_ANCHORS, 1], scores)
            .context("score tensor size mismatch")?;
        Ok(ModelOutputs::new().with(BOXES, boxes).with(SCORES, scores))
    }
}

impl InferenceModel for BlazeFace {
    fn input_size(&self) -> u32 {
        INPUT_SIZE as u32
    }

    fn predict(&self, input: &RgbImage) -> Result<ModelOutputs> {
        let tensor = self.preprocess(input)?;
        let (scores, regressors) = self.forward(&tensor)?;
        self.to_outputs(&scores, &regressors)
    }
}

fn logistic(logit: f32) -> f32 {
    1.0 / (1.0 + (-logit).exp())
}
