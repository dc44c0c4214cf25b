//! Candle-backed inference: device selection, safetensors compilation and
//! the `BlazeFace` face model.

mod blazeface;
mod loader;

pub use blazeface::{BlazeFace, INPUT_SIZE as BLAZEFACE_INPUT_SIZE, NUM_ANCHORS};
pub use loader::{load_safetensors, ModelBuilder, SafetensorsCompiler};

use candle_core::Device;
use tracing::info;

/// Compiler that produces [`BlazeFace`] models.
#[must_use]
pub fn blazeface_compiler(device: Device) -> SafetensorsCompiler<BlazeFace> {
    SafetensorsCompiler::new(device, BlazeFace::new)
}

/// The device models are compiled for: the GPU backend enabled at build time
/// when one is present, otherwise the CPU.
#[must_use]
pub fn get_device() -> Device {
    let device = gpu_device().unwrap_or(Device::Cpu);
    let name = if device.is_metal() {
        "metal"
    } else if device.is_cuda() {
        "cuda"
    } else {
        "cpu"
    };
    info!(device = name, "Selected inference device");
    device
}

#[cfg(feature = "metal")]
fn gpu_device() -> Option<Device> {
    Device::new_metal(0).ok()
}

#[cfg(all(feature = "cuda", not(feature = "metal")))]
fn gpu_device() -> Option<Device> {
    Device::new_cuda(0).ok()
}

#[cfg(not(any(feature = "metal", feature = "cuda")))]
#[allow(clippy::unnecessary_wraps)]
const fn gpu_device() -> Option<Device> {
    None
}
