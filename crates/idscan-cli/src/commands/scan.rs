//! Scan command - detect faces in images through the concurrent pipeline.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Args, ValueEnum};
use crossbeam_channel::Sender;
use idscan_adapters::{models_dir, FsFrameSource, SchemeFetcher};
use idscan_core::execution::mark_primary_thread;
use idscan_core::inference::{blazeface_compiler, get_device};
use idscan_core::scanner::InferenceTracker;
use idscan_core::{
    CameraProperties, CompletionContext, ConcurrencyConfig, ConcurrencyManager, Detection,
    DetectorScanner, FaceDetector, FaceDetectorConfig, FaceDetectorOutput, FrameScan, FrameSize,
    FrameSource, ModelLoader, ModelReference, Scanner, SerialQueue, SourceFrame,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::ExitCode;
use crate::config::AppConfig;
use crate::output::{JsonOutput, ScanProgress};

/// Output format for results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// JSON Lines (one JSON object per line, in completion order)
    #[default]
    Jsonl,
    /// Single JSON array (in input order)
    Json,
}

/// Hardcoded default values.
mod defaults {
    pub const DOWNLOAD_TIMEOUT_SECS: u64 = 300;
}

/// Parse and validate a score or IOU threshold (0.0-1.0).
fn parse_unit(s: &str) -> Result<f32, String> {
    let value: f32 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("{value} is not in 0.0..=1.0"))
    }
}

/// Arguments for scanning images.
#[derive(Args, Clone)]
pub struct ScanArgs {
    /// Files or directories to scan
    pub paths: Vec<PathBuf>,

    /// Recurse into subdirectories
    #[arg(short, long)]
    pub recursive: bool,

    /// Face model location (https:// or file:// URL)
    #[arg(long, value_name = "URL")]
    pub model_url: Option<String>,

    /// Minimum face confidence (0.0-1.0)
    #[arg(long, value_parser = parse_unit)]
    pub min_score: Option<f32>,

    /// NMS IOU threshold (0.0-1.0)
    #[arg(long, value_parser = parse_unit)]
    pub iou_threshold: Option<f32>,

    /// Maximum number of scans in flight
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    pub max_concurrency: Option<u16>,

    /// Worker threads running scans
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    pub worker_threads: Option<u16>,

    /// Show progress bar
    #[arg(long)]
    pub progress: bool,

    /// Suppress progress output
    #[arg(short, long)]
    pub quiet: bool,

    /// Output format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Pretty-print JSON output (only affects --format json)
    #[arg(long)]
    pub pretty: bool,

    /// Custom models directory (overrides default and config)
    #[arg(long, value_name = "DIR")]
    pub models_dir: Option<PathBuf>,

    /// Settings only reachable through config files.
    #[arg(skip)]
    timeout_secs: Option<u64>,
    #[arg(skip)]
    config_max_concurrency: Option<usize>,
    #[arg(skip)]
    config_worker_threads: Option<usize>,
}

impl ScanArgs {
    /// Apply configuration file values, respecting CLI precedence.
    ///
    /// Layering priority (lowest to highest):
    /// 1. Hardcoded defaults (in accessor methods)
    /// 2. Config file values (XDG, then project-local)
    /// 3. CLI arguments (already set on self)
    pub fn with_config(mut args: Self, config: &AppConfig) -> Self {
        if !args.recursive {
            args.recursive = config.scanner.recursive.unwrap_or(false);
        }

        if args.model_url.is_none() {
            args.model_url.clone_from(&config.face.model_url);
        }
        args.min_score = args.min_score.or(config.face.min_score);
        args.iou_threshold = args.iou_threshold.or(config.face.iou_threshold);

        args.config_max_concurrency = config.scanner.max_concurrency;
        args.config_worker_threads = config.scanner.worker_threads;
        args.timeout_secs = config.models.timeout_secs;

        if args.format.is_none() {
            args.format = config
                .output
                .format
                .as_deref()
                .and_then(|s| OutputFormat::from_str(s, true).ok());
        }
        if !args.pretty {
            args.pretty = config.output.pretty.unwrap_or(false);
        }
        if !args.progress {
            args.progress = config.output.progress.unwrap_or(false);
        }

        if args.models_dir.is_none() {
            args.models_dir.clone_from(&config.models.dir);
        }

        args
    }

    fn format(&self) -> OutputFormat {
        self.format.unwrap_or_default()
    }

    fn detector_config(&self) -> FaceDetectorConfig {
        let defaults = FaceDetectorConfig::default();
        let min_score = self.min_score.unwrap_or(defaults.min_score);
        let iou_threshold = self.iou_threshold.unwrap_or(defaults.iou_threshold);
        defaults
            .with_min_score(min_score)
            .with_iou_threshold(iou_threshold)
    }

    fn concurrency_config(&self) -> ConcurrencyConfig {
        let defaults = ConcurrencyConfig::default();
        let permits = self
            .max_concurrency
            .map(usize::from)
            .or(self.config_max_concurrency)
            .unwrap_or(defaults.max_concurrent_scans);
        let workers = self
            .worker_threads
            .map(usize::from)
            .or(self.config_worker_threads)
            .unwrap_or(defaults.worker_threads);
        defaults
            .with_max_concurrent_scans(permits)
            .with_worker_threads(workers)
    }

    fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(defaults::DOWNLOAD_TIMEOUT_SECS))
    }

    fn models_dir(&self) -> PathBuf {
        self.models_dir.clone().unwrap_or_else(models_dir)
    }
}

/// Outcome of the scan command.
#[derive(Debug)]
pub struct ScanResult {
    /// Frames that produced a record.
    pub scanned: usize,
    /// Files that could not be read.
    pub skipped: usize,
    /// Frames whose scan failed.
    pub dropped: u64,
    /// Exit code.
    pub exit_code: ExitCode,
}

/// One output record.
#[derive(Debug, Serialize)]
pub struct ScanRecord {
    #[serde(skip)]
    index: usize,
    /// Source file.
    pub path: String,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Faces found, in normalized frame coordinates.
    pub faces: Vec<Detection>,
    /// Camera state, when the source provides one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera: Option<CameraProperties>,
    /// Running inference cost of the face model.
    pub inference: InferenceReport,
}

/// Inference cost as of a record's completion.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct InferenceReport {
    /// Model name.
    pub model: &'static str,
    /// Inference calls so far.
    pub calls: u64,
    /// Mean inference time in milliseconds.
    pub mean_ms: f64,
}

impl InferenceReport {
    fn from_tracker(tracker: &InferenceTracker) -> Self {
        let summary = tracker.summary();
        Self {
            model: summary.name,
            calls: summary.count,
            mean_ms: summary.mean.as_secs_f64() * 1000.0,
        }
    }
}

impl ScanRecord {
    fn new(
        index: usize,
        path: String,
        size: FrameSize,
        scan: FrameScan<FaceDetectorOutput>,
        tracker: &InferenceTracker,
    ) -> Self {
        Self {
            index,
            path,
            width: size.width,
            height: size.height,
            faces: scan.output.faces,
            camera: scan.camera,
            inference: InferenceReport::from_tracker(tracker),
        }
    }
}

type FaceScanner = DetectorScanner<FaceDetector>;

/// Run the scan command.
///
/// Expects `args` to have been processed through `with_config()` first
/// to apply configuration file settings.
pub fn run(args: &ScanArgs) -> Result<ScanResult> {
    info!("Running scan command on {} paths", args.paths.len());

    if args.paths.is_empty() {
        anyhow::bail!("No paths specified");
    }

    let source = FsFrameSource::new(args.paths.clone(), args.recursive);
    let total = source.count_hint();
    if total == Some(0) {
        warn!("No images found, nothing to scan");
        return Ok(ScanResult {
            scanned: 0,
            skipped: 0,
            dropped: 0,
            exit_code: ExitCode::Success,
        });
    }

    let scanner = Arc::new(build_scanner(args)?);
    let manager = ConcurrencyManager::new(args.concurrency_config())
        .context("Failed to start scan workers")?;

    let show_progress = !args.quiet && (args.progress || std::io::stderr().is_terminal());
    let progress = ScanProgress::new(total.map(|t| t as u64), show_progress);
    let output = JsonOutput::stdout();

    let result = process_frames(&source, &scanner, &manager, &output, &progress, args)?;
    progress.finish(result.scanned, result.dropped);
    if result.skipped > 0 {
        warn!("{} file(s) could not be read", result.skipped);
    }
    Ok(result)
}

/// Loads the face model and wraps it in a scanner.
fn build_scanner(args: &ScanArgs) -> Result<FaceScanner> {
    let url = args.model_url.as_deref().ok_or_else(|| {
        anyhow!("No face model configured. Pass --model-url or set [face] model_url in .idscan.toml")
    })?;
    let reference: ModelReference = url
        .parse()
        .with_context(|| format!("Invalid model URL '{url}'"))?;

    let models_dir = args.models_dir();
    debug!("Using models directory: {}", models_dir.display());

    let fetcher = Arc::new(SchemeFetcher::new(args.download_timeout())?);
    let loader = ModelLoader::new(fetcher, blazeface_compiler(get_device()), models_dir);
    let model = loader.load_model(&reference)?;

    Ok(DetectorScanner::new(FaceDetector::new(
        model,
        &args.detector_config(),
    )))
}

#[derive(Debug, Default)]
struct FeedCounts {
    submitted: usize,
    skipped: usize,
}

/// Feeds every frame into the dispatcher from a worker thread and writes the
/// records as they arrive on this one.
fn process_frames(
    source: &FsFrameSource,
    scanner: &Arc<FaceScanner>,
    manager: &ConcurrencyManager,
    output: &JsonOutput,
    progress: &ScanProgress,
    args: &ScanArgs,
) -> Result<ScanResult> {
    let context: Arc<dyn CompletionContext> = Arc::new(SerialQueue::new("idscan-output")?);
    let tracker = scanner
        .inference_trackers()
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Face scanner has no inference tracker"))?;
    let (sender, receiver) = crossbeam_channel::unbounded::<ScanRecord>();

    // Only the feeder thread may block on permits.
    mark_primary_thread();

    let (counts, mut records) = thread::scope(|scope| -> Result<_> {
        let context = &context;
        let tracker = &tracker;
        let feeder = thread::Builder::new()
            .name("idscan-feeder".to_owned())
            .spawn_scoped(scope, move || {
                feed(source, scanner, manager, context, tracker, &sender, progress)
            })
            .context("Failed to start frame feeder")?;

        let mut records = Vec::new();
        for record in &receiver {
            match args.format() {
                OutputFormat::Jsonl => output.write_line(&record)?,
                OutputFormat::Json => records.push(record),
            }
        }

        let counts = feeder
            .join()
            .map_err(|_| anyhow!("Frame feeder panicked"))?;
        Ok((counts, records))
    })?;

    if args.format() == OutputFormat::Json {
        records.sort_by_key(|r| r.index);
        output.write_array(&records, args.pretty)?;
    }
    output.flush()?;

    let stats = manager.stats();
    info!(
        frames = stats.frames_processed,
        dropped = stats.frames_dropped,
        fps = stats.frames_per_second(),
        "Scan finished"
    );

    let scanned = counts.submitted.saturating_sub(usize::try_from(stats.frames_dropped)?);
    let exit_code = if counts.skipped > 0 || stats.frames_dropped > 0 {
        ExitCode::FramesDropped
    } else {
        ExitCode::Success
    };

    Ok(ScanResult {
        scanned,
        skipped: counts.skipped,
        dropped: stats.frames_dropped,
        exit_code,
    })
}

/// Submits every readable frame. Each completion sends one record.
fn feed(
    source: &FsFrameSource,
    scanner: &Arc<FaceScanner>,
    manager: &ConcurrencyManager,
    context: &Arc<dyn CompletionContext>,
    tracker: &Arc<InferenceTracker>,
    records: &Sender<ScanRecord>,
    progress: &ScanProgress,
) -> FeedCounts {
    let mut counts = FeedCounts::default();

    for (index, item) in source.frames().enumerate() {
        let SourceFrame { origin, frame } = match item {
            Ok(frame) => frame,
            Err(e) => {
                progress.skipped(&format!("{e:#}"));
                counts.skipped += 1;
                continue;
            }
        };

        progress.submitted(&origin);
        let size = frame.size();
        let records = records.clone();
        let tracker = Arc::clone(tracker);

        manager.scan_frame(
            scanner,
            frame,
            None,
            context,
            move |scan: FrameScan<FaceDetectorOutput>| {
                let record = ScanRecord::new(index, origin, size, scan, &tracker);
                if records.send(record).is_err() {
                    debug!("Output closed, discarding record");
                }
            },
        );
        counts.submitted += 1;
    }

    counts
}
