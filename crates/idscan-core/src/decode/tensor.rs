//! Named output tensors returned by an inference backend.

use std::collections::BTreeMap;
use std::fmt::Write as _;

/// A dense `f32` tensor with a row-major shape.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl OutputTensor {
    /// Creates a tensor.
    ///
    /// Returns `None` if `data.len()` does not equal the product of `shape`.
    #[must_use]
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Option<Self> {
        (shape.iter().product::<usize>() == data.len()).then_some(Self { shape, data })
    }

    /// Tensor shape.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Flat row-major data.
    #[must_use]
    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

/// Every tensor produced by one model run, keyed by output name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelOutputs {
    tensors: BTreeMap<String, OutputTensor>,
}

impl ModelOutputs {
    /// Creates an empty set of outputs.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a named tensor.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, tensor: OutputTensor) -> Self {
        self.insert(name, tensor);
        self
    }

    /// Adds or replaces a named tensor.
    pub fn insert(&mut self, name: impl Into<String>, tensor: OutputTensor) {
        self.tensors.insert(name.into(), tensor);
    }

    /// Looks up a tensor by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&OutputTensor> {
        self.tensors.get(name)
    }

    /// Human-readable `name[d0xd1x...]` list for diagnostics.
    #[must_use]
    pub fn describe(&self) -> String {
        if self.tensors.is_empty() {
            return String::from("<none>");
        }
        let mut out = String::new();
        for (i, (name, tensor)) in self.tensors.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let dims: Vec<String> = tensor.shape.iter().map(ToString::to_string).collect();
            let _ = write!(out, "{name}[{}]", dims.join("x"));
        }
        out
    }
}
