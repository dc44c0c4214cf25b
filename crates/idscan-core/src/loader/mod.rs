//! Download, compile and cache models, with at most one load per reference
//! in flight at any time.
//!
//! [`ModelLoader::load_model`] consults an in-memory map of compiled artifact
//! locations, then the on-disk [`ModelCache`], and only then goes to the
//! network. Concurrent callers asking for the same reference share a single
//! download and compile and all receive the same outcome.

mod cache;
mod in_flight;
mod reference;

pub use cache::ModelCache;
pub use reference::ModelReference;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::domain::{LoadStage, ModelLoadError};
use crate::ports::ModelFetcher;
use in_flight::{InFlightLoad, LoadResult};

/// A loaded model, shared by every caller that asked for it.
pub type LoadedModel<M> = Arc<M>;

/// Turns downloaded bytes into a loadable artifact and artifacts into models.
pub trait ModelCompiler: Send + Sync {
    /// The in-memory model type.
    type Model: Send + Sync + 'static;

    /// File extension of compiled artifacts.
    fn artifact_extension(&self) -> &str {
        "safetensors"
    }

    /// Compiles the artifact at `downloaded` into `output`.
    ///
    /// # Errors
    ///
    /// Returns an error if the download is not a valid model.
    fn compile(&self, downloaded: &Path, output: &Path) -> anyhow::Result<()>;

    /// Loads a compiled artifact into memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the artifact cannot be read or decoded.
    fn load(&self, compiled: &Path) -> anyhow::Result<Self::Model>;
}

struct LoaderState<M> {
    /// Compiled artifact locations known to be good.
    entries: HashMap<ModelReference, PathBuf>,
    /// Loads currently being driven by some caller.
    in_flight: HashMap<ModelReference, Arc<InFlightLoad<M>>>,
}

/// Loads models by reference.
pub struct ModelLoader<C: ModelCompiler> {
    fetcher: Arc<dyn ModelFetcher>,
    compiler: C,
    cache: ModelCache,
    staging_dir: Option<PathBuf>,
    state: Mutex<LoaderState<C::Model>>,
}

enum Claim<M> {
    Leader(Arc<InFlightLoad<M>>),
    Follower(Arc<InFlightLoad<M>>),
}

impl<C: ModelCompiler> ModelLoader<C> {
    /// Creates a loader that caches compiled artifacts in `cache_dir`.
    pub fn new(fetcher: Arc<dyn ModelFetcher>, compiler: C, cache_dir: impl Into<PathBuf>) -> Self {
        let cache = ModelCache::new(cache_dir, compiler.artifact_extension());
        Self {
            fetcher,
            compiler,
            cache,
            staging_dir: None,
            state: Mutex::new(LoaderState {
                entries: HashMap::new(),
                in_flight: HashMap::new(),
            }),
        }
    }

    /// Stages downloads under `dir` instead of the system temp directory.
    #[must_use]
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    /// The on-disk cache.
    #[must_use]
    pub const fn cache(&self) -> &ModelCache {
        &self.cache
    }

    /// The compiler models are built with.
    #[must_use]
    pub const fn compiler(&self) -> &C {
        &self.compiler
    }

    /// Returns the model for `reference`, downloading and compiling it if no
    /// compiled artifact is available.
    ///
    /// Blocks the calling thread. At most one download and compile per
    /// reference runs at a time; every concurrent caller for the same
    /// reference receives the same result. Models are read from disk without
    /// holding the loader lock, so a slow load never blocks other references.
    ///
    /// # Errors
    ///
    /// Returns a [`ModelLoadError`] naming the stage that failed. A failure is
    /// not cached: the next call starts a fresh load.
    pub fn load_model(&self, reference: &ModelReference) -> Result<LoadedModel<C::Model>, ModelLoadError> {
        let known = self.state.lock().entries.get(reference).cloned();
        if let Some(path) = known {
            match self.compiler.load(&path) {
                Ok(model) => {
                    debug!("Loaded {reference} from {}", path.display());
                    return Ok(Arc::new(model));
                }
                Err(e) => {
                    warn!("Cached model {} is unusable, reloading: {e:#}", path.display());
                    let mut state = self.state.lock();
                    if state.entries.get(reference) == Some(&path) {
                        state.entries.remove(reference);
                    }
                }
            }
        }

        let claim = {
            let mut state = self.state.lock();
            if let Some(pending) = state.in_flight.get(reference) {
                Claim::Follower(Arc::clone(pending))
            } else {
                let pending = Arc::new(InFlightLoad::new());
                state
                    .in_flight
                    .insert(reference.clone(), Arc::clone(&pending));
                Claim::Leader(pending)
            }
        };

        match claim {
            Claim::Follower(pending) => {
                debug!("Waiting on in-flight load of {reference}");
                pending.wait()
            }
            Claim::Leader(pending) => {
                let registration = Registration {
                    state: &self.state,
                    reference,
                    pending,
                };
                let outcome = match self.load_from_disk(reference) {
                    Some(found) => Ok(found),
                    None => self.fetch_and_compile(reference),
                };
                registration.finish(outcome)
            }
        }
    }

    fn load_from_disk(
        &self,
        reference: &ModelReference,
    ) -> Option<(LoadedModel<C::Model>, Option<PathBuf>)> {
        let path = self.cache.lookup(reference)?;
        match self.compiler.load(&path) {
            Ok(model) => {
                info!("Using cached model {}", path.display());
                Some((Arc::new(model), Some(path)))
            }
            Err(e) => {
                warn!("Cached model {} is unusable, re-downloading: {e:#}", path.display());
                None
            }
        }
    }

    /// Downloads, compiles and loads `reference`. On success also returns the
    /// cache path the compiled artifact was persisted to, if any.
    fn fetch_and_compile(
        &self,
        reference: &ModelReference,
    ) -> Result<(LoadedModel<C::Model>, Option<PathBuf>), ModelLoadError> {
        let fail = |stage, e: &anyhow::Error| ModelLoadError::new(reference, stage, e);

        let staging = self
            .staging_dir()
            .map_err(|e| fail(LoadStage::Download, &e))?;
        let downloaded = staging.path().join("download");
        let compiled = staging
            .path()
            .join(format!("compiled.{}", self.compiler.artifact_extension()));

        info!("Downloading model {reference}");
        let bytes = self
            .fetcher
            .fetch(reference, &downloaded)
            .map_err(|e| fail(LoadStage::Download, &e))?;
        debug!(bytes, "Downloaded {reference}");

        self.compiler
            .compile(&downloaded, &compiled)
            .map_err(|e| fail(LoadStage::Compile, &e))?;

        let persisted = match self.cache.persist(reference, &compiled) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(
                    "Could not cache model in {}, using temporary copy: {e}",
                    self.cache.dir().display()
                );
                None
            }
        };

        let load_from = persisted.as_deref().unwrap_or(&compiled);
        let model = self
            .compiler
            .load(load_from)
            .map_err(|e| fail(LoadStage::Decode, &e))?;
        info!("Model {reference} ready");

        Ok((Arc::new(model), persisted))
    }

    fn staging_dir(&self) -> anyhow::Result<tempfile::TempDir> {
        let builder = {
            let mut b = tempfile::Builder::new();
            b.prefix("idscan-model-");
            b
        };
        match &self.staging_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
                builder.tempdir_in(dir)
            }
            None => builder.tempdir(),
        }
        .context("Failed to create staging directory")
    }
}

/// The leader's claim on an in-flight load.
///
/// Dropping it without calling [`Registration::finish`] (for example when
/// the leader panics) still wakes every waiter with an error and clears the
/// in-flight entry so later calls can retry.
struct Registration<'a, M> {
    state: &'a Mutex<LoaderState<M>>,
    reference: &'a ModelReference,
    pending: Arc<InFlightLoad<M>>,
}

impl<M> Registration<'_, M> {
    fn finish(self, outcome: Result<(Arc<M>, Option<PathBuf>), ModelLoadError>) -> LoadResult<M> {
        let result = {
            let mut state = self.state.lock();
            self.release(&mut state);
            match outcome {
                Ok((model, persisted)) => {
                    if let Some(path) = persisted {
                        state.entries.insert(self.reference.clone(), path);
                    }
                    Ok(model)
                }
                Err(e) => Err(e),
            }
        };
        if let Err(e) = &result {
            warn!("{e}");
        }
        self.pending.complete(result.clone());
        result
    }

    fn release(&self, state: &mut LoaderState<M>) {
        if state
            .in_flight
            .get(self.reference)
            .is_some_and(|p| Arc::ptr_eq(p, &self.pending))
        {
            state.in_flight.remove(self.reference);
        }
    }
}

impl<M> Drop for Registration<'_, M> {
    fn drop(&mut self) {
        self.release(&mut self.state.lock());
        self.pending.complete(Err(ModelLoadError::new(
            self.reference,
            LoadStage::Download,
            &anyhow::anyhow!("load abandoned before completion"),
        )));
    }
}
