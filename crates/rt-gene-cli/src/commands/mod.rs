//! CLI command definitions and handlers.

pub mod describe;
pub mod predict;
pub mod weights;

use clap::{Parser, Subcommand};

/// RT-GENE - Gaze estimation from left/right eye crops and head pose
#[derive(Parser)]
#[command(name = "rt-gene")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Estimate gaze for one or more eye image pairs
    Predict(predict::PredictArgs),
    /// Print the architecture of a model configuration as JSON
    Describe(describe::DescribeArgs),
    /// Manage pretrained backbone weights
    Weights(weights::WeightsArgs),
}

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Command completed.
    Success = 0,
    /// Command failed.
    Error = 1,
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        Self::from(code as u8)
    }
}

/// Parse a positive output count.
pub fn parse_num_outputs(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid count"))?;
    if value == 0 {
        Err("must be at least 1".to_string())
    } else {
        Ok(value)
    }
}
