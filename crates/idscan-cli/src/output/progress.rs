//! Progress bar adapter using indicatif.

use indicatif::{ProgressBar as IndicatifBar, ProgressStyle};

/// Progress reporting for a scan run. Cheap to clone across threads.
#[derive(Clone)]
pub struct ScanProgress {
    bar: Option<IndicatifBar>,
}

impl ScanProgress {
    /// Creates a progress reporter.
    ///
    /// # Arguments
    ///
    /// * `total` - Total number of frames, if known
    /// * `show_bar` - If false, nothing is drawn
    #[must_use]
    pub fn new(total: Option<u64>, show_bar: bool) -> Self {
        if !show_bar {
            return Self { bar: None };
        }

        let bar = total.map_or_else(IndicatifBar::new_spinner, IndicatifBar::new);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("#>-"));
        }

        Self { bar: Some(bar) }
    }

    /// A frame was handed to the dispatcher.
    pub fn submitted(&self, origin: &str) {
        if let Some(bar) = &self.bar {
            bar.inc(1);
            bar.set_message(origin.to_owned());
        }
    }

    /// A frame could not be read and was skipped.
    pub fn skipped(&self, reason: &str) {
        if let Some(bar) = &self.bar {
            bar.inc(1);
            bar.println(format!("WARN: Skipping {reason}"));
        } else {
            eprintln!("WARN: Skipping {reason}");
        }
    }

    /// All frames are done.
    pub fn finish(&self, scanned: usize, dropped: u64) {
        if let Some(bar) = &self.bar {
            bar.finish_with_message(format!("Done: {scanned} scanned, {dropped} dropped"));
        }
    }
}
