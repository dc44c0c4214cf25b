//! CLI command definitions and handlers.

pub mod models;
pub mod scan;

use clap::{Parser, Subcommand};

/// idscan - document and face detection on still images
#[derive(Parser)]
#[command(name = "idscan")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Shared scan arguments (paths, thresholds, flags).
    #[command(flatten)]
    pub scan: scan::ScanArgs,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Detect faces in images
    Scan(scan::ScanArgs),
    /// Manage cached models
    Models(models::ModelsArgs),
}

/// Process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Every frame produced a result.
    Success,
    /// At least one frame was skipped or dropped.
    FramesDropped,
    /// The command could not run.
    Error,
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        match code {
            ExitCode::Success => Self::SUCCESS,
            ExitCode::FramesDropped => Self::from(1),
            ExitCode::Error => Self::from(2),
        }
    }
}
