//! Describe command - print a model configuration's architecture.

use anyhow::Result;
use clap::Args;
use rt_gene_core::inference::resnet::backbone_parameter_count;
use rt_gene_core::inference::{RegressionHead, CROP_SIZE};
use rt_gene_core::{
    BackboneVariant, BlockKind, DualBranchGazeRegressor, HeadInit, ModelConfig,
    DEFAULT_NUM_OUTPUTS, HEAD_POSE_DIM,
};
use serde::Serialize;

use super::parse_num_outputs;
use crate::config::AppConfig;

/// Arguments for the describe command
#[derive(Args, Clone)]
pub struct DescribeArgs {
    /// Backbone: resnet18, resnet50, resnet101 (or small, medium, large)
    #[arg(long)]
    pub variant: Option<BackboneVariant>,

    /// Number of regression outputs
    #[arg(long, value_parser = parse_num_outputs)]
    pub num_outputs: Option<usize>,
}

impl DescribeArgs {
    /// Apply configuration file values, respecting CLI precedence.
    pub fn with_config(mut args: Self, config: &AppConfig) -> Self {
        args.variant = args.variant.or_else(|| config.variant());
        args.num_outputs = args
            .num_outputs
            .or(config.model.num_outputs.filter(|n| *n > 0));
        args
    }

    fn model_config(&self) -> ModelConfig {
        ModelConfig::new(self.variant.unwrap_or_default())
            .with_num_outputs(self.num_outputs.unwrap_or(DEFAULT_NUM_OUTPUTS))
    }
}

/// Architecture summary printed by `describe`.
#[derive(Debug, Serialize)]
struct Architecture {
    variant: BackboneVariant,
    block: &'static str,
    stage_blocks: [usize; 4],
    input: [usize; 3],
    embedding_width: usize,
    head_pose_width: usize,
    fused_width: usize,
    num_outputs: usize,
    head_init: HeadInit,
    parameters: ParameterCounts,
}

/// Learnable parameter counts, running statistics excluded.
#[derive(Debug, Serialize)]
struct ParameterCounts {
    backbone: usize,
    head: usize,
    total: usize,
}

impl Architecture {
    fn new(config: ModelConfig) -> Self {
        let variant = config.variant;
        let crop = CROP_SIZE as usize;
        Self {
            variant,
            block: match variant.block_kind() {
                BlockKind::Basic => "basic",
                BlockKind::Bottleneck => "bottleneck",
            },
            stage_blocks: variant.stage_blocks(),
            input: [3, crop, crop],
            embedding_width: variant.embedding_width(),
            head_pose_width: HEAD_POSE_DIM,
            fused_width: variant.fused_width(),
            num_outputs: config.num_outputs,
            head_init: variant.default_init(),
            parameters: ParameterCounts {
                backbone: backbone_parameter_count(variant),
                head: RegressionHead::parameter_count(variant.fused_width(), config.num_outputs),
                total: DualBranchGazeRegressor::parameter_count(config),
            },
        }
    }
}

/// Run the describe command.
pub fn run(args: &DescribeArgs) -> Result<()> {
    let config = args.model_config();
    config.validate()?;
    println!(
        "{}",
        serde_json::to_string_pretty(&Architecture::new(config))?
    );
    Ok(())
}
