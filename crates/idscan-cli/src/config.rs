//! Configuration file support for idscan.
//!
//! Supports TOML configuration from:
//! - XDG config: `~/.config/idscan/config.toml` (lowest priority)
//! - Project-local: `.idscan.toml` (searched up directory tree)
//! - CLI flags (highest priority, applied separately)

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info, warn};

/// Top-level configuration structure.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Dispatcher settings.
    pub scanner: ScannerConfig,
    /// Face detection settings.
    pub face: FaceConfig,
    /// Model cache settings.
    pub models: ModelsConfig,
    /// Output formatting settings.
    pub output: OutputConfig,
}

/// Concurrency settings for the frame dispatcher.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Maximum number of scans in flight.
    pub max_concurrency: Option<usize>,
    /// Worker threads running scans.
    pub worker_threads: Option<usize>,
    /// Recurse into subdirectories by default.
    pub recursive: Option<bool>,
}

/// Face detector configuration.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct FaceConfig {
    /// Where to fetch the face model from (`https://` or `file://`).
    pub model_url: Option<String>,
    /// Minimum face confidence (0.0-1.0).
    pub min_score: Option<f32>,
    /// NMS IOU threshold (0.0-1.0).
    pub iou_threshold: Option<f32>,
}

/// Model configuration.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Custom models directory path.
    pub dir: Option<PathBuf>,
    /// Download timeout in seconds.
    pub timeout_secs: Option<u64>,
}

/// Output formatting configuration.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output format: "json" or "jsonl".
    pub format: Option<String>,
    /// Pretty-print JSON output.
    pub pretty: Option<bool>,
    /// Show progress bar.
    pub progress: Option<bool>,
}

impl AppConfig {
    /// Load configuration from XDG and project-local files.
    ///
    /// Missing files are silently ignored. Out-of-range values are reported
    /// and dropped so the hardcoded defaults apply instead.
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(xdg_path) = xdg_config_path() {
            if xdg_path.exists() {
                info!("Loading XDG config: {}", xdg_path.display());
                if let Some(xdg_config) = load_file(&xdg_path) {
                    config = xdg_config;
                }
            } else {
                debug!("XDG config not found: {}", xdg_path.display());
            }
        }

        if let Some(project_path) = find_project_config() {
            info!("Loading project config: {}", project_path.display());
            if let Some(project_config) = load_file(&project_path) {
                config.merge(project_config);
            }
        }

        for problem in config.validate() {
            eprintln!("warning: {problem}, ignoring");
        }

        config
    }

    /// Clears every out-of-range value and returns a description of each.
    fn validate(&mut self) -> Vec<String> {
        let mut problems = Vec::new();

        check_unit(&mut self.face.min_score, "face.min_score", &mut problems);
        check_unit(
            &mut self.face.iou_threshold,
            "face.iou_threshold",
            &mut problems,
        );
        check_positive(
            &mut self.scanner.max_concurrency,
            "scanner.max_concurrency",
            &mut problems,
        );
        check_positive(
            &mut self.scanner.worker_threads,
            "scanner.worker_threads",
            &mut problems,
        );

        if self.models.timeout_secs == Some(0) {
            problems.push("models.timeout_secs must be positive, got 0".to_string());
            self.models.timeout_secs = None;
        }

        let unknown_format = self
            .output
            .format
            .as_deref()
            .filter(|f| *f != "json" && *f != "jsonl")
            .map(str::to_owned);
        if let Some(f) = unknown_format {
            problems.push(format!("output.format must be 'json' or 'jsonl', got '{f}'"));
            self.output.format = None;
        }

        problems
    }

    /// Merge another config into this one.
    /// Values from `other` override values in `self` when present.
    fn merge(&mut self, other: Self) {
        self.scanner.max_concurrency = other
            .scanner
            .max_concurrency
            .or(self.scanner.max_concurrency);
        self.scanner.worker_threads = other
            .scanner
            .worker_threads
            .or(self.scanner.worker_threads);
        self.scanner.recursive = other.scanner.recursive.or(self.scanner.recursive);

        self.face.model_url = other.face.model_url.or_else(|| self.face.model_url.take());
        self.face.min_score = other.face.min_score.or(self.face.min_score);
        self.face.iou_threshold = other.face.iou_threshold.or(self.face.iou_threshold);

        self.models.dir = other.models.dir.or_else(|| self.models.dir.take());
        self.models.timeout_secs = other.models.timeout_secs.or(self.models.timeout_secs);

        self.output.format = other.output.format.or_else(|| self.output.format.take());
        self.output.pretty = other.output.pretty.or(self.output.pretty);
        self.output.progress = other.output.progress.or(self.output.progress);
    }
}

fn check_unit(value: &mut Option<f32>, key: &str, problems: &mut Vec<String>) {
    if let Some(v) = *value {
        if !(0.0..=1.0).contains(&v) {
            problems.push(format!("{key} must be 0.0-1.0, got {v}"));
            *value = None;
        }
    }
}

fn check_positive(value: &mut Option<usize>, key: &str, problems: &mut Vec<String>) {
    if *value == Some(0) {
        problems.push(format!("{key} must be at least 1, got 0"));
        *value = None;
    }
}

/// Get the XDG config file path.
fn xdg_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("idscan").join("config.toml"))
}

/// Find project-local config by searching up from current directory.
fn find_project_config() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    find_config_in_parents(&cwd)
}

/// Search for `.idscan.toml` in the given directory and its parents.
fn find_config_in_parents(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(".idscan.toml"))
        .find(|path| path.exists())
}

/// Load and parse a TOML config file.
fn load_file(path: &Path) -> Option<AppConfig> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return None;
        }
    };

    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            warn!("Failed to parse config file {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_config() {
        let config: AppConfig = toml::from_str("").expect("parse empty config");
        assert!(config.face.model_url.is_none());
        assert!(config.scanner.max_concurrency.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r"
[scanner]
max_concurrency = 3
worker_threads = 4
recursive = true

[face]
model_url = 'https://models.example.com/blazeface-v2.safetensors'
min_score = 0.6
iou_threshold = 0.4

[models]
dir = '/var/cache/idscan'
timeout_secs = 30

[output]
format = 'json'
pretty = true
progress = false
";
        let config: AppConfig = toml::from_str(toml).expect("parse full config");

        assert_eq!(config.scanner.max_concurrency, Some(3));
        assert_eq!(config.scanner.worker_threads, Some(4));
        assert_eq!(config.scanner.recursive, Some(true));
        assert_eq!(
            config.face.model_url.as_deref(),
            Some("https://models.example.com/blazeface-v2.safetensors")
        );
        assert_eq!(config.face.min_score, Some(0.6));
        assert_eq!(config.face.iou_threshold, Some(0.4));
        assert_eq!(config.models.dir, Some(PathBuf::from("/var/cache/idscan")));
        assert_eq!(config.models.timeout_secs, Some(30));
        assert_eq!(config.output.format.as_deref(), Some("json"));
        assert_eq!(config.output.pretty, Some(true));
        assert_eq!(config.output.progress, Some(false));
    }

    #[test]
    fn test_merge_overrides_present_values_only() {
        let mut base: AppConfig = toml::from_str(
            r"
[scanner]
max_concurrency = 2
worker_threads = 2

[face]
min_score = 0.5
",
        )
        .expect("parse base");

        let project: AppConfig = toml::from_str(
            r"
[scanner]
max_concurrency = 4

[output]
format = 'jsonl'
",
        )
        .expect("parse override");

        base.merge(project);

        assert_eq!(base.scanner.max_concurrency, Some(4));
        assert_eq!(base.scanner.worker_threads, Some(2));
        assert_eq!(base.face.min_score, Some(0.5));
        assert_eq!(base.output.format.as_deref(), Some("jsonl"));
    }

    #[test]
    fn test_merge_empty_override_preserves_base() {
        let mut base: AppConfig = toml::from_str(
            r"
[face]
model_url = 'file:///opt/models/face.safetensors'
",
        )
        .expect("parse base");

        base.merge(AppConfig::default());

        assert_eq!(
            base.face.model_url.as_deref(),
            Some("file:///opt/models/face.safetensors")
        );
    }

    #[test]
    fn test_partial_face_config() {
        let config: AppConfig = toml::from_str(
            r"
[face]
iou_threshold = 0.25
",
        )
        .expect("parse partial face");

        assert_eq!(config.face.iou_threshold, Some(0.25));
        assert!(config.face.min_score.is_none());
        assert!(config.face.model_url.is_none());
    }

    #[test]
    fn test_invalid_toml_syntax_is_error() {
        let result: Result<AppConfig, _> = toml::from_str("[face\nmin_score = 0.5\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_field_type_is_error() {
        let result: Result<AppConfig, _> = toml::from_str("[scanner]\nmax_concurrency = 'two'\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_drops_out_of_range_scores() {
        let mut config = AppConfig::default();
        config.face.min_score = Some(1.5);
        config.face.iou_threshold = Some(0.3);

        let problems = config.validate();

        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("face.min_score"));
        assert!(config.face.min_score.is_none());
        assert_eq!(config.face.iou_threshold, Some(0.3));
    }

    #[test]
    fn test_validate_drops_zero_concurrency() {
        let mut config = AppConfig::default();
        config.scanner.max_concurrency = Some(0);
        config.scanner.worker_threads = Some(0);

        let problems = config.validate();

        assert_eq!(problems.len(), 2);
        assert!(config.scanner.max_concurrency.is_none());
        assert!(config.scanner.worker_threads.is_none());
    }

    #[test]
    fn test_validate_drops_unknown_format() {
        let mut config = AppConfig::default();
        config.output.format = Some("xml".to_string());

        let problems = config.validate();

        assert!(problems[0].contains("output.format"));
        assert!(config.output.format.is_none());
    }

    #[test]
    fn test_validate_accepts_valid_config() {
        let mut config: AppConfig = toml::from_str(
            r"
[scanner]
max_concurrency = 1

[face]
min_score = 0.0
iou_threshold = 1.0

[output]
format = 'json'
",
        )
        .expect("parse valid config");

        assert!(config.validate().is_empty());
        assert_eq!(config.face.min_score, Some(0.0));
    }

    #[test]
    fn test_find_config_in_parents() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(root.path().join(".idscan.toml"), "").unwrap();

        let found = find_config_in_parents(&nested).unwrap();
        assert_eq!(found, root.path().join(".idscan.toml"));
    }
}
