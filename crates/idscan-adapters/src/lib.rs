//! idscan adapters - collaborators at the pipeline boundary.
//!
//! This crate provides adapters for:
//! - Filesystem frame source (image files as frames)
//! - Model fetching over HTTP and from local files
//! - The default model cache location

pub mod fs;
pub mod models;

pub use fs::{load_frame, FsFrameSource};
pub use models::{
    list_cached, models_dir, CachedModel, FileModelFetcher, HttpModelFetcher, SchemeFetcher,
};
