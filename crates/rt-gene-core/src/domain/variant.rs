//! Backbone variants and model configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{GazeError, Result};

/// Number of head pose components concatenated with the eye embeddings.
pub const HEAD_POSE_DIM: usize = 2;

/// Default number of regression outputs (pitch, yaw).
pub const DEFAULT_NUM_OUTPUTS: usize = 2;

/// Residual block flavour used by a backbone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Two 3x3 convolutions.
    Basic,
    /// 1x1 reduce, 3x3, 1x1 expand (4x).
    Bottleneck,
}

impl BlockKind {
    /// Channel multiplier between a block's width and its output channels.
    #[must_use]
    pub const fn expansion(self) -> usize {
        match self {
            Self::Basic => 1,
            Self::Bottleneck => 4,
        }
    }
}

/// Pretrained ResNet depth used for both eye branches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackboneVariant {
    /// ResNet-18, the small capacity option.
    Resnet18,
    /// ResNet-50, the medium capacity option.
    #[default]
    Resnet50,
    /// ResNet-101, the large capacity option.
    Resnet101,
}

impl BackboneVariant {
    /// All variants, smallest first.
    pub const ALL: [Self; 3] = [Self::Resnet18, Self::Resnet50, Self::Resnet101];

    /// Canonical lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Resnet18 => "resnet18",
            Self::Resnet50 => "resnet50",
            Self::Resnet101 => "resnet101",
        }
    }

    /// Residual block type.
    #[must_use]
    pub const fn block_kind(self) -> BlockKind {
        match self {
            Self::Resnet18 => BlockKind::Basic,
            Self::Resnet50 | Self::Resnet101 => BlockKind::Bottleneck,
        }
    }

    /// Number of residual blocks in each of the four stages.
    #[must_use]
    pub const fn stage_blocks(self) -> [usize; 4] {
        match self {
            Self::Resnet18 => [2, 2, 2, 2],
            Self::Resnet50 => [3, 4, 6, 3],
            Self::Resnet101 => [3, 4, 23, 3],
        }
    }

    /// Width of the pooled embedding one backbone produces.
    #[must_use]
    pub const fn embedding_width(self) -> usize {
        512 * self.block_kind().expansion()
    }

    /// Width of `[left, right, head_pose]`.
    #[must_use]
    pub const fn fused_width(self) -> usize {
        2 * self.embedding_width() + HEAD_POSE_DIM
    }

    /// Head initialiser historically paired with this variant.
    #[must_use]
    pub const fn default_init(self) -> HeadInit {
        match self {
            Self::Resnet18 => HeadInit::Orthogonal,
            Self::Resnet50 | Self::Resnet101 => HeadInit::Normal { std: 0.01 },
        }
    }
}

impl fmt::Display for BackboneVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackboneVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "resnet18" | "small" => Ok(Self::Resnet18),
            "resnet50" | "medium" => Ok(Self::Resnet50),
            "resnet101" | "large" => Ok(Self::Resnet101),
            other => Err(format!(
                "unknown backbone '{other}', expected resnet18, resnet50 or resnet101"
            )),
        }
    }
}

/// Weight initialisation policy for the regression head's linear layers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HeadInit {
    /// Zero-mean Gaussian weights.
    Normal {
        /// Standard deviation.
        std: f64,
    },
    /// Orthogonal weight matrices.
    Orthogonal,
}

/// Construction parameters for a gaze regressor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Backbone depth shared by both branches.
    pub variant: BackboneVariant,
    /// Size of the output vector.
    pub num_outputs: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::new(BackboneVariant::default())
    }
}

impl ModelConfig {
    /// Config for `variant` with the default two outputs.
    #[must_use]
    pub const fn new(variant: BackboneVariant) -> Self {
        Self {
            variant,
            num_outputs: DEFAULT_NUM_OUTPUTS,
        }
    }

    /// Sets the number of outputs.
    #[must_use]
    pub const fn with_num_outputs(mut self, num_outputs: usize) -> Self {
        self.num_outputs = num_outputs;
        self
    }

    /// Checks the configuration is buildable.
    ///
    /// # Errors
    ///
    /// Returns [`GazeError::InvalidConfig`] when `num_outputs` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.num_outputs == 0 {
            return Err(GazeError::InvalidConfig(
                "num_outputs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_widths() {
        assert_eq!(BackboneVariant::Resnet18.embedding_width(), 512);
        assert_eq!(BackboneVariant::Resnet50.embedding_width(), 2048);
        assert_eq!(BackboneVariant::Resnet101.embedding_width(), 2048);
    }

    #[test]
    fn test_fused_width_is_both_embeddings_plus_head_pose() {
        for variant in BackboneVariant::ALL {
            assert_eq!(
                variant.fused_width(),
                variant.embedding_width() * 2 + HEAD_POSE_DIM
            );
        }
        assert_eq!(BackboneVariant::Resnet18.fused_width(), 1026);
        assert_eq!(BackboneVariant::Resnet50.fused_width(), 4098);
    }

    #[test]
    fn test_parse_names_and_capacities() {
        assert_eq!("resnet18".parse(), Ok(BackboneVariant::Resnet18));
        assert_eq!("ResNet101".parse(), Ok(BackboneVariant::Resnet101));
        assert_eq!("small".parse(), Ok(BackboneVariant::Resnet18));
        assert_eq!("medium".parse(), Ok(BackboneVariant::Resnet50));
        assert_eq!("large".parse(), Ok(BackboneVariant::Resnet101));
        assert!("resnet34".parse::<BackboneVariant>().is_err());
    }

    #[test]
    fn test_display_round_trips() {
        for variant in BackboneVariant::ALL {
            assert_eq!(variant.to_string().parse(), Ok(variant));
        }
    }

    #[test]
    fn test_default_init_policy() {
        assert_eq!(
            BackboneVariant::Resnet18.default_init(),
            HeadInit::Orthogonal
        );
        assert_eq!(
            BackboneVariant::Resnet50.default_init(),
            HeadInit::Normal { std: 0.01 }
        );
        // The wide heads must not default to the cubic orthogonal init.
        for variant in [BackboneVariant::Resnet50, BackboneVariant::Resnet101] {
            assert!(variant.fused_width() > 4000);
            assert!(matches!(variant.default_init(), HeadInit::Normal { .. }));
        }
    }

    #[test]
    fn test_default_config() {
        let config = ModelConfig::default();
        assert_eq!(config.variant, BackboneVariant::Resnet50);
        assert_eq!(config.num_outputs, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_outputs_rejected() {
        let config = ModelConfig::new(BackboneVariant::Resnet18).with_num_outputs(0);
        assert!(matches!(
            config.validate(),
            Err(GazeError::InvalidConfig(_))
        ));
    }
}
