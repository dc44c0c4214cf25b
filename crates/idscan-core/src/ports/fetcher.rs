//! Network port for model artifacts.

use std::path::Path;

use crate::loader::ModelReference;

/// Downloads model artifacts.
pub trait ModelFetcher: Send + Sync {
    /// Fetches `reference` and writes it to `destination`.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns an error if the artifact cannot be fetched or written.
    fn fetch(&self, reference: &ModelReference, destination: &Path) -> anyhow::Result<u64>;
}
