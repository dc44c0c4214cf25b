//! On-disk cache of compiled model artifacts.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use super::ModelReference;

/// Maps model references to compiled artifacts in a single directory.
///
/// Entries are named after [`ModelReference::cache_key`], so they are found
/// again by any loader pointed at the same directory, including after a
/// restart. Nothing here ever evicts an entry.
#[derive(Debug, Clone)]
pub struct ModelCache {
    dir: PathBuf,
    extension: String,
}

impl ModelCache {
    /// Creates a cache rooted at `dir`. The directory is created lazily.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
        }
    }

    /// The cache directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the compiled artifact for `reference` lives (or would live).
    #[must_use]
    pub fn artifact_path(&self, reference: &ModelReference) -> PathBuf {
        self.dir
            .join(format!("{}.{}", reference.cache_key(), self.extension))
    }

    /// Path of an existing artifact for `reference`.
    #[must_use]
    pub fn lookup(&self, reference: &ModelReference) -> Option<PathBuf> {
        let path = self.artifact_path(reference);
        path.is_file().then_some(path)
    }

    /// Copies a compiled artifact into the cache.
    ///
    /// The copy is written under a temporary name and renamed into place, so
    /// readers never see a partial artifact. `compiled` is left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or written.
    pub fn persist(&self, reference: &ModelReference, compiled: &Path) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let dest = self.artifact_path(reference);

        let mut staging = tempfile::Builder::new()
            .prefix(".partial-")
            .tempfile_in(&self.dir)?;
        io::copy(&mut File::open(compiled)?, staging.as_file_mut())?;
        staging.as_file().sync_all()?;
        staging.persist(&dest).map_err(|e| e.error)?;

        Ok(dest)
    }
}
