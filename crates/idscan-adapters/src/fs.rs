//! Still images on disk as a frame source.
//!
//! Lets the pipeline run against photos instead of a live camera: every
//! decodable image under the given paths becomes one RGB [`VideoFrame`].

use anyhow::{Context, Result};
use idscan_core::{FrameSource, SourceFrame, VideoFrame};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Extensions decoded by the enabled `image` codecs, lowercase.
const FRAME_EXTENSIONS: &[&str] = &["bmp", "gif", "jpeg", "jpg", "png", "tif", "tiff", "webp"];

/// Frames decoded from image files and directories of image files.
pub struct FsFrameSource {
    roots: Vec<PathBuf>,
    recursive: bool,
}

impl FsFrameSource {
    /// Creates a source over `roots`, which may mix files and directories.
    /// Subdirectories are only entered when `recursive` is set.
    #[must_use]
    pub const fn new(roots: Vec<PathBuf>, recursive: bool) -> Self {
        Self { roots, recursive }
    }

    /// The image files this source yields, in yield order.
    ///
    /// Explicit file arguments keep their position; the contents of each
    /// directory argument are sorted by path.
    #[must_use]
    pub fn files(&self) -> Vec<PathBuf> {
        let mut out = Vec::new();
        for root in &self.roots {
            if root.is_dir() {
                let mut found = Vec::new();
                walk(root, self.recursive, &mut found);
                found.sort();
                out.append(&mut found);
            } else if !root.exists() {
                warn!("Path does not exist: {}", root.display());
            } else if has_frame_extension(root) {
                out.push(root.clone());
            } else {
                warn!("Not an image file, skipping: {}", root.display());
            }
        }
        out
    }
}

fn walk(dir: &Path, recursive: bool, out: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot list {}: {e}", dir.display());
            return;
        }
    };

    for path in entries.filter_map(|entry| entry.ok().map(|e| e.path())) {
        if path.is_dir() {
            if recursive {
                walk(&path, recursive, out);
            }
        } else if has_frame_extension(&path) {
            out.push(path);
        }
    }
}

impl FrameSource for FsFrameSource {
    fn frames(&self) -> Box<dyn Iterator<Item = Result<SourceFrame>> + Send + '_> {
        let files = self.files();
        debug!(count = files.len(), "Decoding image files as frames");
        Box::new(files.into_iter().map(|path| load_frame(&path)))
    }

    fn count_hint(&self) -> Option<usize> {
        Some(self.files().len())
    }
}

fn has_frame_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            FRAME_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

/// Decodes one image file into an RGB frame tagged with its path.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a decodable image.
pub fn load_frame(path: &Path) -> Result<SourceFrame> {
    let decoded =
        image::open(path).with_context(|| format!("Cannot decode {}", path.display()))?;

    Ok(SourceFrame {
        origin: path.display().to_string(),
        frame: VideoFrame::from_rgb_image(decoded.into_rgb8()),
    })
}
