//! Models command - manage the compiled model cache.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use idscan_adapters::{list_cached, models_dir, SchemeFetcher};
use idscan_core::inference::{blazeface_compiler, get_device};
use idscan_core::{ModelLoader, ModelReference};
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::AppConfig;

/// Arguments for the models command
#[derive(Args)]
pub struct ModelsArgs {
    /// Custom models directory (overrides default and config)
    #[arg(long, value_name = "DIR", global = true)]
    pub models_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: ModelsCommand,
}

/// Models subcommands
#[derive(Subcommand)]
pub enum ModelsCommand {
    /// Download, compile and cache face models
    Fetch {
        /// Model locations (https:// or file:// URLs)
        #[arg(required = true, value_name = "URL")]
        urls: Vec<ModelReference>,
    },
    /// List cached models
    List,
    /// Print model directory path
    Path,
}

/// Run the models command.
pub fn run(args: &ModelsArgs, config: &AppConfig) -> Result<()> {
    let dir = args
        .models_dir
        .clone()
        .or_else(|| config.models.dir.clone())
        .unwrap_or_else(models_dir);

    match &args.command {
        ModelsCommand::Fetch { urls } => {
            let timeout = Duration::from_secs(config.models.timeout_secs.unwrap_or(300));
            fetch_models(urls, dir, timeout)
        }
        ModelsCommand::List => list_models(&dir),
        ModelsCommand::Path => {
            println!("{}", dir.display());
            Ok(())
        }
    }
}

fn fetch_models(urls: &[ModelReference], dir: PathBuf, timeout: Duration) -> Result<()> {
    let fetcher = Arc::new(SchemeFetcher::new(timeout)?);
    let loader = ModelLoader::new(fetcher, blazeface_compiler(get_device()), dir);

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .map_err(|e| anyhow::anyhow!("Invalid progress template: {e}"))?,
    );
    pb.enable_steady_tick(Duration::from_millis(120));

    for reference in urls {
        pb.set_message(reference.to_string());
        loader
            .load_model(reference)
            .with_context(|| format!("Failed to fetch {reference}"))?;
        let path = loader.cache().artifact_path(reference);
        pb.println(format!("✓ {reference} -> {}", path.display()));
    }

    pb.finish_with_message(format!("{} model(s) ready", urls.len()));
    Ok(())
}

fn list_models(dir: &Path) -> Result<()> {
    let models = list_cached(dir)?;

    println!("Models directory: {}", dir.display());
    println!();

    for model in &models {
        let name = model.path.file_name().map_or_else(
            || model.path.display().to_string(),
            |n| n.to_string_lossy().into_owned(),
        );
        println!("  {name} ({} bytes)", model.size);
    }

    println!();
    println!("{} model(s) cached", models.len());

    Ok(())
}
