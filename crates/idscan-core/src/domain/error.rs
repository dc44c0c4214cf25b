//! Error taxonomy for scanning and model loading.

use std::fmt;

use thiserror::Error;

/// Per-frame failure. Never fatal for the pipeline: the frame is dropped and
/// scanning continues with the next one.
#[derive(Debug, Clone, Error)]
pub enum ScanError {
    /// The model returned tensors the decoder cannot parse.
    #[error("unexpected model output: {reason} (observed: {observed})")]
    UnexpectedModelOutput {
        /// What was wrong.
        reason: String,
        /// Every tensor the model returned, as `name[shape]`.
        observed: String,
    },

    /// The inference call itself failed.
    #[error("inference failed: {0}")]
    InferenceFailed(String),
}

/// Step of a model load that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStage {
    /// Fetching the artifact.
    Download,
    /// Compiling the downloaded artifact.
    Compile,
    /// Loading a compiled artifact into memory.
    Decode,
}

impl fmt::Display for LoadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            Self::Download => "download",
            Self::Compile => "compile",
            Self::Decode => "decode",
        };
        f.write_str(stage)
    }
}

/// A model could not be made ready. Delivered to every caller waiting on the
/// same reference.
#[derive(Debug, Clone, Error)]
#[error("failed to load model {reference} ({stage}): {message}")]
pub struct ModelLoadError {
    /// The reference that was being loaded.
    pub reference: String,
    /// Step that failed.
    pub stage: LoadStage,
    /// Full error chain of the underlying failure.
    pub message: String,
}

impl ModelLoadError {
    pub(crate) fn new(reference: impl fmt::Display, stage: LoadStage, err: &anyhow::Error) -> Self {
        Self {
            reference: reference.to_string(),
            stage,
            message: format!("{err:#}"),
        }
    }
}
