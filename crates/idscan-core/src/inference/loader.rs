//! Safetensors artifacts: compiling downloads and loading compiled weights.

use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use safetensors::SafeTensors;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use crate::loader::ModelCompiler;

/// Builds a model architecture from its weights.
pub type ModelBuilder<T> = fn(VarBuilder<'static>) -> Result<T>;

/// [`ModelCompiler`] for safetensors weights.
///
/// Compiling casts every tensor to `F32` so the loaded model never depends on
/// the precision the artifact was published in. Loading builds the
/// architecture through `builder`.
pub struct SafetensorsCompiler<T> {
    device: Device,
    builder: ModelBuilder<T>,
}

impl<T> SafetensorsCompiler<T> {
    /// Creates a compiler that loads models onto `device`.
    #[must_use]
    pub fn new(device: Device, builder: ModelBuilder<T>) -> Self {
        Self { device, builder }
    }

    /// Device models are loaded onto.
    #[must_use]
    pub const fn device(&self) -> &Device {
        &self.device
    }
}

impl<T: Send + Sync + 'static> ModelCompiler for SafetensorsCompiler<T> {
    type Model = T;

    fn compile(&self, downloaded: &Path, output: &Path) -> Result<()> {
        let tensors = read_tensors(downloaded, &Device::Cpu)?
            .into_iter()
            .map(|(name, tensor)| {
                let tensor = tensor
                    .to_dtype(DType::F32)
                    .with_context(|| format!("Failed to convert tensor '{name}'"))?;
                Ok((name, tensor))
            })
            .collect::<Result<HashMap<_, _>>>()?;
        debug!(tensors = tensors.len(), "Compiled {}", downloaded.display());

        candle_core::safetensors::save(&tensors, output)
            .with_context(|| format!("Failed to write compiled model: {}", output.display()))
    }

    fn load(&self, compiled: &Path) -> Result<T> {
        let vb = load_safetensors(compiled, &self.device)?;
        (self.builder)(vb)
    }
}

/// Loads a safetensors file and creates a `VarBuilder` for the model.
///
/// # Errors
///
/// Returns an error if:
/// - The file cannot be read
/// - The safetensors data is invalid
pub fn load_safetensors(path: impl AsRef<Path>, device: &Device) -> Result<VarBuilder<'static>> {
    let tensors = read_tensors(path.as_ref(), device)?;
    Ok(VarBuilder::from_tensors(tensors, DType::F32, device))
}

fn read_tensors(path: &Path, device: &Device) -> Result<HashMap<String, Tensor>> {
    debug!("Loading safetensors from {}", path.display());

    let data = std::fs::read(path)
        .with_context(|| format!("Failed to read model file: {}", path.display()))?;
    let tensors = SafeTensors::deserialize(&data)
        .with_context(|| format!("Failed to parse safetensors: {}", path.display()))?;

    tensors
        .tensors()
        .into_iter()
        .map(|(name, view)| {
            let dtype = safetensors_dtype_to_candle(view.dtype())?;
            let tensor = Tensor::from_raw_buffer(view.data(), dtype, view.shape(), device)
                .with_context(|| format!("Failed to create tensor '{name}'"))?;
            Ok((name, tensor))
        })
        .collect()
}

/// Converts safetensors dtype to candle dtype.
fn safetensors_dtype_to_candle(dtype: safetensors::Dtype) -> Result<DType> {
    use safetensors::Dtype as S;
    match dtype {
        S::F32 => Ok(DType::F32),
        S::F64 => Ok(DType::F64),
        S::F16 => Ok(DType::F16),
        S::BF16 => Ok(DType::BF16),
        S::I64 => Ok(DType::I64),
        S::U8 => Ok(DType::U8),
        S::U32 => Ok(DType::U32),
        other => anyhow::bail!("Unsupported dtype: {other:?}"),
    }
}
