//! Predict command - estimate gaze for eye image pairs.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use clap::{Args, ValueEnum};
use rt_gene_adapters::{default_weights_dir, load_eye_image, HubWeights};
use rt_gene_core::inference::{preprocess_eye, select_device, stack_batch};
use rt_gene_core::{
    BackboneVariant, DualBranchGazeRegressor, GazeAngles, GazePrediction, HeadPose, ModelConfig,
    ResultOutput, DEFAULT_NUM_OUTPUTS,
};
use tracing::{debug, info, warn};

use super::parse_num_outputs;
use crate::config::AppConfig;
use crate::output::{clear_after, download_progress, JsonOutput};

/// Output format for predictions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// JSON Lines (one JSON object per line)
    #[default]
    Jsonl,
    /// Single JSON array
    Json,
}

/// Parse a `PITCH,YAW` head pose in radians.
fn parse_head_pose(s: &str) -> Result<HeadPose, String> {
    let (pitch, yaw) = s
        .split_once(',')
        .ok_or_else(|| format!("'{s}' is not PITCH,YAW"))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<f32>()
            .ok()
            .filter(|x| x.is_finite())
            .ok_or_else(|| format!("'{}' is not a valid angle", v.trim()))
    };
    Ok(HeadPose::new(parse(pitch)?, parse(yaw)?))
}

/// Arguments for gaze prediction.
#[derive(Args, Clone)]
pub struct PredictArgs {
    /// Left eye image (repeat for a batch)
    #[arg(long, value_name = "IMAGE", required = true)]
    pub left: Vec<PathBuf>,

    /// Right eye image, paired with --left by position
    #[arg(long, value_name = "IMAGE", required = true)]
    pub right: Vec<PathBuf>,

    /// Head pose in radians; one per pair, or one shared by all pairs
    #[arg(
        long,
        value_name = "PITCH,YAW",
        value_parser = parse_head_pose,
        allow_hyphen_values = true
    )]
    pub head_pose: Vec<HeadPose>,

    /// Backbone: resnet18, resnet50, resnet101 (or small, medium, large)
    #[arg(long)]
    pub variant: Option<BackboneVariant>,

    /// Number of regression outputs
    #[arg(long, value_parser = parse_num_outputs)]
    pub num_outputs: Option<usize>,

    /// Trained model checkpoint (safetensors); skips pretrained backbones
    #[arg(long, value_name = "FILE")]
    pub checkpoint: Option<PathBuf>,

    /// Re-initialise the regression head with the variant's policy
    #[arg(long)]
    pub init_head: bool,

    /// Custom weights directory (overrides default and config)
    #[arg(long, value_name = "DIR")]
    pub weights_dir: Option<PathBuf>,

    /// Run on the CPU even when an accelerator is available
    #[arg(long)]
    pub cpu: bool,

    /// Output format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Pretty-print JSON output (only affects --format json)
    #[arg(long)]
    pub pretty: bool,
}

impl PredictArgs {
    /// Apply configuration file values, respecting CLI precedence.
    ///
    /// Layering priority (lowest to highest):
    /// 1. Hardcoded defaults (in accessor methods)
    /// 2. Config file values (XDG, then project-local)
    /// 3. CLI arguments (already set on self)
    pub fn with_config(mut args: Self, config: &AppConfig) -> Self {
        args.variant = args.variant.or_else(|| config.variant());
        args.num_outputs = args
            .num_outputs
            .or(config.model.num_outputs.filter(|n| *n > 0));
        if args.checkpoint.is_none() {
            args.checkpoint.clone_from(&config.model.checkpoint);
        }
        if !args.init_head {
            args.init_head = config.model.init_head.unwrap_or(false);
        }
        if args.weights_dir.is_none() {
            args.weights_dir.clone_from(&config.weights.dir);
        }
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
        args
    }

    /// Model configuration with fallback to hardcoded defaults.
    fn model_config(&self) -> ModelConfig {
        ModelConfig::new(self.variant.unwrap_or_default())
            .with_num_outputs(self.num_outputs.unwrap_or(DEFAULT_NUM_OUTPUTS))
    }

    /// Weights directory with fallback to the default cache.
    fn weights_dir(&self) -> PathBuf {
        self.weights_dir.clone().unwrap_or_else(default_weights_dir)
    }

    /// Output format with fallback to JSONL.
    fn format(&self) -> OutputFormat {
        self.format.unwrap_or_default()
    }

    /// One head pose per eye pair.
    fn head_poses(&self) -> Result<Vec<HeadPose>> {
        let pairs = self.left.len();
        match self.head_pose.len() {
            0 => {
                warn!("No --head-pose given, assuming 0,0 for every pair");
                Ok(vec![HeadPose::default(); pairs])
            }
            1 => Ok(vec![self.head_pose[0]; pairs]),
            n if n == pairs => Ok(self.head_pose.clone()),
            n => anyhow::bail!("Got {n} head poses for {pairs} eye pairs"),
        }
    }
}

/// Run the predict command.
///
/// Expects `args` to have been processed through `with_config()` first
/// to apply configuration file settings.
pub fn run(args: &PredictArgs) -> Result<()> {
    if args.left.len() != args.right.len() {
        anyhow::bail!(
            "Got {} left and {} right eye images; they must pair up",
            args.left.len(),
            args.right.len()
        );
    }
    let poses = args.head_poses()?;
    let config = args.model_config();
    info!(
        "Predicting gaze for {} pairs with {}",
        args.left.len(),
        config.variant
    );

    let device = select_device(args.cpu);
    let model = build_model(args, config, &device)?;

    let left = load_batch(&args.left, &device)?;
    let right = load_batch(&args.right, &device)?;
    let head_pose = HeadPose::batch_tensor(&poses, &device)?;

    let outputs = model
        .forward(&left, &right, &head_pose)?
        .to_dtype(DType::F32)?
        .to_vec2::<f32>()?;

    let predictions = to_predictions(args, &poses, config.variant, outputs);
    let output = JsonOutput::stdout().pretty(args.pretty);
    emit(&output, &predictions, args.format())
}

/// Builds the regressor from a checkpoint or from pretrained backbones.
fn build_model(
    args: &PredictArgs,
    config: ModelConfig,
    device: &Device,
) -> Result<DualBranchGazeRegressor> {
    let model = if let Some(ref checkpoint) = args.checkpoint {
        DualBranchGazeRegressor::from_checkpoint(config, checkpoint, device)
            .with_context(|| format!("Failed to load checkpoint {}", checkpoint.display()))?
    } else {
        let (bar, progress) = download_progress()?;
        let weights = HubWeights::new(args.weights_dir()).with_progress(progress);
        debug!("Using weights directory: {}", weights.dir().display());
        let (model, _varmap) = clear_after(&bar, || {
            DualBranchGazeRegressor::from_pretrained(config, &weights, device)
        })?;
        model
    };

    if args.init_head {
        let policy = config.variant.default_init();
        debug!("Re-initialising regression head with {policy:?}");
        model
            .init_weights(policy)
            .context("Cannot re-initialise the head of a checkpoint model")?;
    }
    if args.checkpoint.is_none() {
        warn!("Regression head is untrained; pass --checkpoint for meaningful gaze angles");
    }

    Ok(model)
}

/// Loads and preprocesses eye images into one `(batch, 3, 224, 224)` tensor.
fn load_batch(paths: &[PathBuf], device: &Device) -> Result<Tensor> {
    let tensors = paths
        .iter()
        .map(|path| {
            let image = load_eye_image(path)?;
            preprocess_eye(&image, device)
                .with_context(|| format!("Failed to preprocess {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(stack_batch(&tensors)?)
}

/// Pairs each output row with its inputs.
fn to_predictions(
    args: &PredictArgs,
    poses: &[HeadPose],
    variant: BackboneVariant,
    outputs: Vec<Vec<f32>>,
) -> Vec<GazePrediction> {
    let timestamp = iso_timestamp();
    args.left
        .iter()
        .zip(&args.right)
        .zip(poses)
        .zip(outputs)
        .map(|(((left, right), pose), outputs)| GazePrediction {
            left: display(left),
            right: display(right),
            head_pose: *pose,
            variant,
            gaze: GazeAngles::from_outputs(&outputs),
            outputs,
            timestamp: timestamp.clone(),
        })
        .collect()
}

/// Writes predictions in the requested format.
fn emit(
    output: &dyn ResultOutput,
    predictions: &[GazePrediction],
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Jsonl => {
            for prediction in predictions {
                output.write(prediction)?;
            }
        }
        OutputFormat::Json => output.write_batch(predictions)?,
    }
    output.flush()
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

/// Generate ISO 8601 UTC timestamp (RFC 3339 format).
fn iso_timestamp() -> String {
    match time::OffsetDateTime::now_utc().format(&time::format_description::well_known::Rfc3339) {
        Ok(ts) => ts,
        Err(e) => {
            debug!("Timestamp format failed: {e}");
            String::from("1970-01-01T00:00:00Z")
        }
    }
}
