//! Weights command - manage pretrained backbone weights.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, Subcommand};
use rt_gene_adapters::weights::{ensure_weights, list_weights, weights_info};
use rt_gene_adapters::default_weights_dir;
use rt_gene_core::BackboneVariant;

use crate::config::AppConfig;
use crate::output::download_progress;

/// Arguments for the weights command
#[derive(Args)]
pub struct WeightsArgs {
    /// Custom weights directory (overrides default and config)
    #[arg(long, value_name = "DIR", global = true)]
    pub weights_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: WeightsCommand,
}

/// Weights subcommands
#[derive(Subcommand)]
pub enum WeightsCommand {
    /// Download pretrained backbone weights
    Fetch {
        /// Only fetch this backbone (default: all)
        #[arg(long)]
        variant: Option<BackboneVariant>,
    },
    /// List cached weights
    List,
    /// Print weights directory path
    Path,
}

/// Run the weights command.
pub fn run(args: &WeightsArgs, config: &AppConfig) -> Result<()> {
    let dir = args
        .weights_dir
        .clone()
        .or_else(|| config.weights.dir.clone())
        .unwrap_or_else(default_weights_dir);

    match args.command {
        WeightsCommand::Fetch { variant } => fetch_weights(&dir, variant),
        WeightsCommand::List => {
            list(&dir);
            Ok(())
        }
        WeightsCommand::Path => {
            println!("{}", dir.display());
            Ok(())
        }
    }
}

fn fetch_weights(dir: &Path, variant: Option<BackboneVariant>) -> Result<()> {
    let variants = variant.map_or_else(|| BackboneVariant::ALL.to_vec(), |v| vec![v]);
    let (pb, progress) = download_progress()?;

    for variant in variants {
        ensure_weights(dir, variant, Some(&progress))?;
    }

    pb.finish_with_message("All weights downloaded");
    Ok(())
}

fn list(dir: &Path) {
    let weights = list_weights(dir);

    println!("Weights directory: {}", dir.display());
    println!();

    for (variant, installed) in &weights {
        let status = if *installed { "✓" } else { "✗" };
        println!("  {status} {variant} ({})", weights_info(*variant).filename);
    }

    println!();
    let installed_count = weights.iter().filter(|(_, installed)| *installed).count();
    println!("{}/{} weights cached", installed_count, weights.len());
}
