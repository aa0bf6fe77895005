//! ResNet feature extractors with the classification layer removed.
//!
//! Implements the torchvision ResNet-18/50/101 topology (v1.5: the stride of a
//! bottleneck sits on its 3x3 convolution) up to and including the adaptive
//! average pool. Parameters are laid out under the indices of the
//! `nn.Sequential` that wraps `conv1, bn1, relu, maxpool, layer1..layer4,
//! avgpool`, so trained gaze checkpoints load without renaming.

use candle_core::{Module, ModuleT, Tensor, D};
use candle_nn::{
    batch_norm, conv2d_no_bias, BatchNorm, BatchNormConfig, Conv2d, Conv2dConfig, VarBuilder,
};

use crate::domain::{BackboneVariant, BlockKind};
use crate::error::{GazeError, Result};

/// Input channels expected by every backbone (RGB).
pub const INPUT_CHANNELS: usize = 3;

/// Channels produced by the stem.
const STEM_WIDTH: usize = 64;

/// Base width of each of the four stages.
const STAGE_WIDTHS: [usize; 4] = [64, 128, 256, 512];

/// Sequential index of the stem convolution.
const STEM_CONV_INDEX: usize = 0;
/// Sequential index of the stem batch norm.
const STEM_BN_INDEX: usize = 1;
/// Sequential index of `layer1`; later stages follow consecutively.
const FIRST_STAGE_INDEX: usize = 4;

/// Maps a torchvision ResNet parameter name onto the sequential layout.
///
/// Returns `None` for parameters outside the feature extractor (`fc.*`).
#[must_use]
pub fn to_sequential_name(torchvision: &str) -> Option<String> {
    let (module, rest) = torchvision.split_once('.')?;
    let index = match module {
        "conv1" => STEM_CONV_INDEX,
        "bn1" => STEM_BN_INDEX,
        "layer1" => FIRST_STAGE_INDEX,
        "layer2" => FIRST_STAGE_INDEX + 1,
        "layer3" => FIRST_STAGE_INDEX + 2,
        "layer4" => FIRST_STAGE_INDEX + 3,
        _ => return None,
    };
    Some(format!("{index}.{rest}"))
}

/// Inverse of [`to_sequential_name`].
#[must_use]
pub fn to_torchvision_name(sequential: &str) -> Option<String> {
    let (index, rest) = sequential.split_once('.')?;
    let module = match index.parse::<usize>().ok()? {
        STEM_CONV_INDEX => "conv1".to_string(),
        STEM_BN_INDEX => "bn1".to_string(),
        i @ FIRST_STAGE_INDEX..=7 => format!("layer{}", i - FIRST_STAGE_INDEX + 1),
        _ => return None,
    };
    Some(format!("{module}.{rest}"))
}

/// Number of learnable parameters in a backbone (running statistics excluded).
#[must_use]
pub fn backbone_parameter_count(variant: BackboneVariant) -> usize {
    let conv = |c_in: usize, c_out: usize, k: usize| c_in * c_out * k * k;
    let bn = |c: usize| 2 * c;

    let kind = variant.block_kind();
    let expansion = kind.expansion();
    let mut total = conv(INPUT_CHANNELS, STEM_WIDTH, 7) + bn(STEM_WIDTH);
    let mut in_channels = STEM_WIDTH;

    let stages = STAGE_WIDTHS.iter().zip(variant.stage_blocks());
    for (stage, (&width, blocks)) in stages.enumerate() {
        let out_channels = width * expansion;
        for block in 0..blocks {
            let stride = if stage > 0 && block == 0 { 2 } else { 1 };
            total += match kind {
                BlockKind::Basic => {
                    conv(in_channels, width, 3) + bn(width) + conv(width, width, 3) + bn(width)
                }
                BlockKind::Bottleneck => {
                    conv(in_channels, width, 1)
                        + bn(width)
                        + conv(width, width, 3)
                        + bn(width)
                        + conv(width, out_channels, 1)
                        + bn(out_channels)
                }
            };
            if stride != 1 || in_channels != out_channels {
                total += conv(in_channels, out_channels, 1) + bn(out_channels);
            }
            in_channels = out_channels;
        }
    }

    total
}

/// Convolution without bias followed by batch norm.
#[derive(Debug)]
struct ConvBn {
    conv: Conv2d,
    bn: BatchNorm,
}

impl ConvBn {
    fn new(
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        stride: usize,
        padding: usize,
        conv_vb: VarBuilder,
        bn_vb: VarBuilder,
    ) -> Result<Self> {
        let conv = conv2d_no_bias(
            in_channels,
            out_channels,
            kernel,
            Conv2dConfig {
                stride,
                padding,
                ..Conv2dConfig::default()
            },
            conv_vb,
        )?;
        let bn = batch_norm(out_channels, BatchNormConfig::default(), bn_vb)?;
        Ok(Self { conv, bn })
    }

    fn forward_t(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor> {
        self.conv.forward(xs)?.apply_t(&self.bn, train)
    }
}

/// Basic or bottleneck residual block.
#[derive(Debug)]
struct ResidualBlock {
    branch: Vec<ConvBn>,
    shortcut: Option<ConvBn>,
}

impl ResidualBlock {
    fn new(
        kind: BlockKind,
        in_channels: usize,
        width: usize,
        stride: usize,
        vb: &VarBuilder,
    ) -> Result<Self> {
        let out_channels = width * kind.expansion();
        let layer = |name: usize, c_in, c_out, kernel, stride, padding| {
            ConvBn::new(
                c_in,
                c_out,
                kernel,
                stride,
                padding,
                vb.pp(format!("conv{name}")),
                vb.pp(format!("bn{name}")),
            )
        };

        let branch = match kind {
            BlockKind::Basic => vec![
                layer(1, in_channels, width, 3, stride, 1)?,
                layer(2, width, width, 3, 1, 1)?,
            ],
            BlockKind::Bottleneck => vec![
                layer(1, in_channels, width, 1, 1, 0)?,
                layer(2, width, width, 3, stride, 1)?,
                layer(3, width, out_channels, 1, 1, 0)?,
            ],
        };

        let shortcut = if stride != 1 || in_channels != out_channels {
            let ds = vb.pp("downsample");
            Some(ConvBn::new(
                in_channels,
                out_channels,
                1,
                stride,
                0,
                ds.pp("0"),
                ds.pp("1"),
            )?)
        } else {
            None
        };

        Ok(Self { branch, shortcut })
    }
}

impl ModuleT for ResidualBlock {
    fn forward_t(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor> {
        let last = self.branch.len() - 1;
        let mut ys = xs.clone();
        for (i, layer) in self.branch.iter().enumerate() {
            ys = layer.forward_t(&ys, train)?;
            if i < last {
                ys = ys.relu()?;
            }
        }
        let identity = match &self.shortcut {
            Some(shortcut) => shortcut.forward_t(xs, train)?,
            None => xs.clone(),
        };
        (ys + identity)?.relu()
    }
}

/// Truncated ResNet producing one pooled embedding per image.
#[derive(Debug)]
pub struct ResNetBackbone {
    variant: BackboneVariant,
    stem: ConvBn,
    stages: Vec<Vec<ResidualBlock>>,
}

impl ResNetBackbone {
    /// Builds a backbone whose parameters come from `vb`.
    ///
    /// # Errors
    ///
    /// Returns an error if a parameter is missing from `vb` or has the wrong shape.
    #[allow(clippy::needless_pass_by_value)]
    pub fn new(variant: BackboneVariant, vb: VarBuilder) -> Result<Self> {
        let stem = ConvBn::new(
            INPUT_CHANNELS,
            STEM_WIDTH,
            7,
            2,
            3,
            vb.pp(STEM_CONV_INDEX.to_string()),
            vb.pp(STEM_BN_INDEX.to_string()),
        )?;

        let kind = variant.block_kind();
        let mut in_channels = STEM_WIDTH;
        let mut stages = Vec::with_capacity(STAGE_WIDTHS.len());

        let layout = STAGE_WIDTHS.iter().zip(variant.stage_blocks());
        for (stage, (&width, blocks)) in layout.enumerate() {
            let stage_vb = vb.pp((FIRST_STAGE_INDEX + stage).to_string());
            let mut layer = Vec::with_capacity(blocks);
            for block in 0..blocks {
                let stride = if stage > 0 && block == 0 { 2 } else { 1 };
                layer.push(ResidualBlock::new(
                    kind,
                    in_channels,
                    width,
                    stride,
                    &stage_vb.pp(block.to_string()),
                )?);
                in_channels = width * kind.expansion();
            }
            stages.push(layer);
        }

        Ok(Self {
            variant,
            stem,
            stages,
        })
    }

    /// Backbone depth.
    #[must_use]
    pub const fn variant(&self) -> BackboneVariant {
        self.variant
    }

    /// Width of the embeddings this backbone produces.
    #[must_use]
    pub const fn embedding_width(&self) -> usize {
        self.variant.embedding_width()
    }

    /// Embeds a `(batch, 3, height, width)` image tensor into `(batch, embedding_width)`.
    ///
    /// Any spatial size works thanks to the adaptive pool.
    ///
    /// # Errors
    ///
    /// Returns [`GazeError::Shape`] for a non-4D input or a channel count other than 3.
    pub fn embed(&self, images: &Tensor, train: bool) -> Result<Tensor> {
        let dims = images.dims();
        if dims.len() != 4 || dims[1] != INPUT_CHANNELS {
            return Err(GazeError::shape(
                "eye image",
                "(batch, 3, height, width)",
                dims,
            ));
        }
        Ok(self.forward_t(images, train)?)
    }
}

impl ModuleT for ResNetBackbone {
    fn forward_t(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor> {
        // Stem: conv, bn, relu, 3x3/2 max pool with padding 1. Inputs are
        // non-negative after the ReLU, so edge padding matches -inf padding.
        let mut xs = self
            .stem
            .forward_t(xs, train)?
            .relu()?
            .pad_with_same(D::Minus1, 1, 1)?
            .pad_with_same(D::Minus2, 1, 1)?
            .max_pool2d_with_stride(3, 2)?;

        for stage in &self.stages {
            for block in stage {
                xs = block.forward_t(&xs, train)?;
            }
        }

        // Adaptive average pool to 1x1, then flatten.
        xs.mean(D::Minus1)?.mean(D::Minus1)?.flatten_from(1)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    fn build(variant: BackboneVariant) -> (ResNetBackbone, VarMap) {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let backbone = ResNetBackbone::new(variant, vb).unwrap();
        (backbone, varmap)
    }

    #[test]
    fn test_sequential_name_mapping() {
        assert_eq!(
            to_sequential_name("conv1.weight").as_deref(),
            Some("0.weight")
        );
        assert_eq!(
            to_sequential_name("bn1.running_var").as_deref(),
            Some("1.running_var")
        );
        assert_eq!(
            to_sequential_name("layer1.0.conv1.weight").as_deref(),
            Some("4.0.conv1.weight")
        );
        assert_eq!(
            to_sequential_name("layer4.2.downsample.1.bias").as_deref(),
            Some("7.2.downsample.1.bias")
        );
        assert!(to_sequential_name("fc.weight").is_none());
        assert!(to_sequential_name("conv1").is_none());
    }

    #[test]
    fn test_torchvision_name_mapping_inverts() {
        for name in [
            "conv1.weight",
            "bn1.bias",
            "layer2.1.bn2.running_mean",
            "layer3.22.conv3.weight",
        ] {
            let sequential = to_sequential_name(name).unwrap();
            assert_eq!(to_torchvision_name(&sequential).as_deref(), Some(name));
        }
        assert!(to_torchvision_name("8.weight").is_none());
        assert!(to_torchvision_name("2.weight").is_none());
    }

    #[test]
    fn test_parameter_counts_match_torchvision() {
        // torchvision totals minus the 1000-class fc layer
        let expected = [
            (BackboneVariant::Resnet18, 11_176_512),
            (BackboneVariant::Resnet50, 23_508_032),
            (BackboneVariant::Resnet101, 42_500_160),
        ];
        for (variant, count) in expected {
            assert_eq!(backbone_parameter_count(variant), count, "{variant}");
        }
    }

    #[test]
    fn test_built_parameters_match_count() {
        let (_, varmap) = build(BackboneVariant::Resnet18);
        let data = varmap.data().lock().unwrap();
        let learnable: usize = data
            .iter()
            .filter(|(name, _)| !name.contains("running_"))
            .map(|(_, var)| var.elem_count())
            .sum();
        assert_eq!(
            learnable,
            backbone_parameter_count(BackboneVariant::Resnet18)
        );
        assert!(data.contains_key("7.1.bn2.running_var"));
        assert!(data.contains_key("5.0.downsample.0.weight"));
        assert!(!data.contains_key("4.0.downsample.0.weight"));
    }

    #[test]
    fn test_bottleneck_first_stage_projects() {
        let (_, varmap) = build(BackboneVariant::Resnet50);
        let data = varmap.data().lock().unwrap();
        // 64 -> 256 channels needs a projection even at stride 1
        assert!(data.contains_key("4.0.downsample.0.weight"));
        assert!(data.contains_key("7.2.conv3.weight"));
        assert_eq!(data["7.2.conv3.weight"].dims(), &[2048, 512, 1, 1]);
    }

    #[test]
    fn test_embed_shape_basic() {
        let (backbone, _) = build(BackboneVariant::Resnet18);
        let images = Tensor::randn(0f32, 1.0, (2, 3, 64, 64), &Device::Cpu).unwrap();
        let embedding = backbone.embed(&images, false).unwrap();
        assert_eq!(embedding.dims(), &[2, 512]);
    }

    #[test]
    fn test_embed_accepts_non_square_input() {
        let (backbone, _) = build(BackboneVariant::Resnet18);
        let images = Tensor::randn(0f32, 1.0, (1, 3, 36, 60), &Device::Cpu).unwrap();
        let embedding = backbone.embed(&images, false).unwrap();
        assert_eq!(embedding.dims(), &[1, 512]);
    }

    #[test]
    fn test_embed_rejects_wrong_channels() {
        let (backbone, _) = build(BackboneVariant::Resnet18);
        let gray = Tensor::zeros((1, 1, 64, 64), DType::F32, &Device::Cpu).unwrap();
        assert!(backbone.embed(&gray, false).unwrap_err().is_shape());

        let unbatched = Tensor::zeros((3, 64, 64), DType::F32, &Device::Cpu).unwrap();
        assert!(backbone.embed(&unbatched, false).unwrap_err().is_shape());
    }
}
