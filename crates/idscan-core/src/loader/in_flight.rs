//! Shared slot through which concurrent callers wait on one load.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::domain::ModelLoadError;

/// Outcome of one load, shared by every caller that waited on it.
pub(crate) type LoadResult<M> = Result<Arc<M>, ModelLoadError>;

/// A load in progress. The first caller for a reference drives it; later
/// callers block in [`InFlightLoad::wait`] until it completes.
pub(crate) struct InFlightLoad<M> {
    slot: Mutex<Option<LoadResult<M>>>,
    ready: Condvar,
}

impl<M> InFlightLoad<M> {
    pub(crate) fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    /// Blocks until the load completes.
    pub(crate) fn wait(&self) -> LoadResult<M> {
        let mut slot = self.slot.lock();
        loop {
            if let Some(result) = slot.as_ref() {
                return result.clone();
            }
            self.ready.wait(&mut slot);
        }
    }

    /// Publishes the outcome. Only the first call has any effect.
    pub(crate) fn complete(&self, result: LoadResult<M>) {
        let mut slot = self.slot.lock();
        if slot.is_none() {
            *slot = Some(result);
        }
        self.ready.notify_all();
    }
}
