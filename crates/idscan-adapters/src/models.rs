//! Model fetchers and the default model cache location.

use anyhow::{bail, Context, Result};
use idscan_core::{ModelFetcher, ModelReference};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Returns the default model cache directory.
///
/// Uses `XDG_DATA_HOME/idscan/models` or `~/.local/share/idscan/models`.
#[must_use]
pub fn models_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("idscan")
        .join("models")
}

/// A compiled artifact found in a cache directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedModel {
    /// Artifact path.
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
}

/// Lists the compiled artifacts in `dir`, skipping partially written files.
///
/// A missing directory is an empty cache.
///
/// # Errors
///
/// Returns an error if the directory exists but cannot be read.
pub fn list_cached(dir: &Path) -> Result<Vec<CachedModel>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut models = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        let entry = entry?;
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        let metadata = entry.metadata()?;
        if metadata.is_file() && !hidden {
            models.push(CachedModel {
                path: entry.path(),
                size: metadata.len(),
            });
        }
    }
    models.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(models)
}

/// Downloads `http://` and `https://` references with a blocking GET.
pub struct HttpModelFetcher {
    client: reqwest::blocking::Client,
}

impl HttpModelFetcher {
    /// Creates a fetcher whose requests give up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("idscan/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

impl ModelFetcher for HttpModelFetcher {
    fn fetch(&self, reference: &ModelReference, destination: &Path) -> Result<u64> {
        info!("Downloading model: {reference}");

        let mut response = self
            .client
            .get(reference.url().clone())
            .send()
            .with_context(|| format!("Failed to download {reference}"))?;

        if !response.status().is_success() {
            bail!("Download failed with status: {}", response.status());
        }

        let mut out = BufWriter::new(
            File::create(destination)
                .with_context(|| format!("Failed to create {}", destination.display()))?,
        );
        let bytes = response
            .copy_to(&mut out)
            .with_context(|| format!("Failed to read response for {reference}"))?;
        out.flush()?;

        info!("Downloaded {reference} ({bytes} bytes)");
        Ok(bytes)
    }
}

/// Copies `file://` references from the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileModelFetcher;

impl ModelFetcher for FileModelFetcher {
    fn fetch(&self, reference: &ModelReference, destination: &Path) -> Result<u64> {
        let source = reference
            .url()
            .to_file_path()
            .map_err(|()| anyhow::anyhow!("Not a local file reference: {reference}"))?;
        debug!("Copying model from {}", source.display());
        fs::copy(&source, destination)
            .with_context(|| format!("Failed to copy {}", source.display()))
    }
}

/// Routes each reference to a fetcher by URL scheme.
pub struct SchemeFetcher {
    http: HttpModelFetcher,
    file: FileModelFetcher,
}

impl SchemeFetcher {
    /// Creates a fetcher for `http`, `https` and `file` references.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: HttpModelFetcher::new(timeout)?,
            file: FileModelFetcher,
        })
    }
}

impl ModelFetcher for SchemeFetcher {
    fn fetch(&self, reference: &ModelReference, destination: &Path) -> Result<u64> {
        match reference.url().scheme() {
            "http" | "https" => self.http.fetch(reference, destination),
            "file" => self.file.fetch(reference, destination),
            other => bail!("Unsupported model URL scheme '{other}': {reference}"),
        }
    }
}
