//! idscan CLI - face detection on still images through the scanning pipeline.

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;
mod output;

use commands::{scan::ScanArgs, Cli, Commands, ExitCode};
use config::AppConfig;

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = AppConfig::load();

    let exit_code = match cli.command {
        Some(Commands::Scan(args)) => scan(ScanArgs::with_config(args, &config)),
        Some(Commands::Models(ref args)) => match commands::models::run(args, &config) {
            Ok(()) => ExitCode::Success,
            Err(e) => {
                eprintln!("error: {e:#}");
                ExitCode::Error
            }
        },
        None => {
            // Default behavior: scan with flattened args
            if cli.scan.paths.is_empty() {
                eprintln!("error: No paths specified. Use --help for usage information.");
                return ExitCode::Error.into();
            }
            scan(ScanArgs::with_config(cli.scan, &config))
        }
    };

    exit_code.into()
}

fn scan(args: ScanArgs) -> ExitCode {
    match commands::scan::run(&args) {
        Ok(result) => result.exit_code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::Error
        }
    }
}
