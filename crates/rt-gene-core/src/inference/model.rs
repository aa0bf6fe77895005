//! Dual-branch gaze regressor.
//!
//! Two ResNet branches embed the left and right eye crops; the embeddings are
//! concatenated with the head pose and regressed to gaze angles.

use std::collections::HashSet;
use std::path::Path;
use std::sync::PoisonError;

use candle_core::{DType, Device, ModuleT, Tensor, Var};
use candle_nn::{VarBuilder, VarMap};
use tracing::{debug, info};

use super::head::RegressionHead;
use super::loader::load_safetensors;
use super::resnet::{self, backbone_parameter_count, ResNetBackbone};
use crate::domain::{BackboneVariant, HeadInit, ModelConfig, HEAD_POSE_DIM};
use crate::error::{GazeError, Result};
use crate::ports::PretrainedWeights;

/// Parameter prefix of the left eye branch.
pub const LEFT_PREFIX: &str = "left_features";
/// Parameter prefix of the right eye branch.
pub const RIGHT_PREFIX: &str = "right_features";
/// Parameter prefix of the regression head.
pub const HEAD_PREFIX: &str = "classifier";

/// Gaze regressor over a left/right eye pair and a head pose.
///
/// Input: two `(batch, 3, H, W)` eye tensors (224x224 after
/// [`preprocess_eye`](super::preprocess_eye)) and a `(batch, 2)` head pose.
/// Output: `(batch, num_outputs)`, by default `(pitch, yaw)`.
#[derive(Debug)]
pub struct DualBranchGazeRegressor {
    config: ModelConfig,
    left_features: ResNetBackbone,
    right_features: ResNetBackbone,
    classifier: RegressionHead,
    device: Device,
}

impl DualBranchGazeRegressor {
    /// Builds the regressor from `vb`.
    ///
    /// The regression head keeps whatever initialisation `vb` provides; see
    /// [`DualBranchGazeRegressor::init_weights`].
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or a parameter is missing
    /// from `vb` or has the wrong shape.
    #[allow(clippy::needless_pass_by_value)]
    pub fn new(config: ModelConfig, vb: VarBuilder) -> Result<Self> {
        config.validate()?;
        let device = vb.device().clone();
        let variant = config.variant;

        let left_features = ResNetBackbone::new(variant, vb.pp(LEFT_PREFIX))?;
        let right_features = ResNetBackbone::new(variant, vb.pp(RIGHT_PREFIX))?;
        let classifier =
            RegressionHead::new(variant.fused_width(), config.num_outputs, vb.pp(HEAD_PREFIX))?;

        Ok(Self {
            config,
            left_features,
            right_features,
            classifier,
            device,
        })
    }

    /// Builds a trainable regressor whose branches start from pretrained weights.
    ///
    /// Both branches receive independent copies of the backbone tensors; the
    /// classification layer of the pretrained network is discarded. Returns
    /// the model with the `VarMap` holding every parameter, all of which are
    /// trainable.
    ///
    /// # Errors
    ///
    /// - [`GazeError::WeightsUnavailable`] if the provider fails
    /// - [`GazeError::MissingTensor`] if a backbone parameter was not provided
    /// - a candle error if a provided tensor has the wrong shape
    pub fn from_pretrained(
        config: ModelConfig,
        weights: &dyn PretrainedWeights,
        device: &Device,
    ) -> Result<(Self, VarMap)> {
        config.validate()?;
        let variant = config.variant;

        let tensors = weights.backbone_tensors(variant, device).map_err(|e| {
            GazeError::WeightsUnavailable {
                variant,
                reason: format!("{e:#}"),
            }
        })?;

        let varmap = VarMap::new();
        let mut seeded = HashSet::new();
        {
            let mut data = varmap.data().lock().unwrap_or_else(PoisonError::into_inner);
            for (name, tensor) in &tensors {
                if !tensor.dtype().is_float() {
                    continue;
                }
                let Some(local) = resnet::to_sequential_name(name) else {
                    continue;
                };
                let tensor = tensor.to_device(device)?.to_dtype(DType::F32)?.detach();
                for prefix in [LEFT_PREFIX, RIGHT_PREFIX] {
                    let full = format!("{prefix}.{local}");
                    data.insert(full.clone(), Var::from_tensor(&tensor)?);
                    seeded.insert(full);
                }
            }
        }
        debug!("Seeded {} backbone tensors for {variant}", seeded.len());

        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let model = Self::new(config, vb)?;

        {
            let data = varmap.data().lock().unwrap_or_else(PoisonError::into_inner);
            let mut missing: Vec<&String> = data
                .keys()
                .filter(|name| name.starts_with(LEFT_PREFIX) || name.starts_with(RIGHT_PREFIX))
                .filter(|name| !seeded.contains(*name))
                .collect();
            missing.sort();
            if let Some(name) = missing.first() {
                return Err(GazeError::MissingTensor((*name).clone()));
            }
        }

        info!("Built {variant} gaze regressor from pretrained backbones");
        Ok((model, varmap))
    }

    /// Loads a complete trained regressor from a safetensors checkpoint.
    ///
    /// The parameters are frozen tensors, suitable for inference only.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or lacks a parameter.
    pub fn from_checkpoint(
        config: ModelConfig,
        path: impl AsRef<Path>,
        device: &Device,
    ) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading {} checkpoint from {}", config.variant, path.display());
        let vb = load_safetensors(path, device)?;
        Self::new(config, vb)
    }

    /// Model configuration.
    #[must_use]
    pub const fn config(&self) -> ModelConfig {
        self.config
    }

    /// Backbone depth of both branches.
    #[must_use]
    pub const fn variant(&self) -> BackboneVariant {
        self.config.variant
    }

    /// Size of the output vector.
    #[must_use]
    pub const fn num_outputs(&self) -> usize {
        self.config.num_outputs
    }

    /// Width of the fused `[left, right, head_pose]` vector.
    #[must_use]
    pub const fn fused_width(&self) -> usize {
        self.config.variant.fused_width()
    }

    /// Device the parameters live on.
    #[must_use]
    pub const fn device(&self) -> &Device {
        &self.device
    }

    /// Learnable parameter count for `config` (running statistics excluded).
    #[must_use]
    pub fn parameter_count(config: ModelConfig) -> usize {
        2 * backbone_parameter_count(config.variant)
            + RegressionHead::parameter_count(config.variant.fused_width(), config.num_outputs)
    }

    /// Re-initialises the regression head's linear layers.
    ///
    /// Never called during construction.
    ///
    /// # Errors
    ///
    /// Returns [`GazeError::NotTrainable`] for a checkpoint-loaded model.
    pub fn init_weights(&self, policy: HeadInit) -> Result<()> {
        debug!("Initialising regression head with {policy:?}");
        self.classifier.init_weights(policy)
    }

    /// Evaluation-mode forward pass.
    ///
    /// # Errors
    ///
    /// Returns [`GazeError::Shape`] for mis-shaped inputs and
    /// [`GazeError::Dtype`] for a head pose in another dtype.
    pub fn forward(&self, left: &Tensor, right: &Tensor, head_pose: &Tensor) -> Result<Tensor> {
        self.forward_t(left, right, head_pose, false)
    }

    /// Forward pass; `train` selects batch statistics in the batch norms.
    ///
    /// # Errors
    ///
    /// Returns [`GazeError::Shape`] for mis-shaped inputs and
    /// [`GazeError::Dtype`] for a head pose in another dtype.
    pub fn forward_t(
        &self,
        left: &Tensor,
        right: &Tensor,
        head_pose: &Tensor,
        train: bool,
    ) -> Result<Tensor> {
        let batch = check_image_pair(left, right)?;
        check_head_pose(head_pose, batch, left.dtype())?;

        let left_x = self.left_features.embed(left, train)?;
        let right_x = self.right_features.embed(right, train)?;
        let fused = self.fuse(&left_x, &right_x, head_pose)?;

        Ok(self.classifier.forward_t(&fused, train)?)
    }

    /// Concatenates `[left, right, head_pose]` along the feature axis.
    ///
    /// # Errors
    ///
    /// Returns [`GazeError::Shape`] if an embedding has the wrong width or
    /// batch sizes disagree, and [`GazeError::Dtype`] if the head pose is
    /// not in the embeddings' dtype.
    pub fn fuse(&self, left: &Tensor, right: &Tensor, head_pose: &Tensor) -> Result<Tensor> {
        let width = self.variant().embedding_width();
        let batch = embedding_batch(left, "left embedding", width)?;
        if embedding_batch(right, "right embedding", width)? != batch {
            return Err(GazeError::shape(
                "right embedding",
                format!("({batch}, {width})"),
                right.dims(),
            ));
        }
        check_head_pose(head_pose, batch, left.dtype())?;

        Ok(Tensor::cat(&[left, right, head_pose], 1)?)
    }
}

/// Validates a left/right image pair and returns the batch size.
fn check_image_pair(left: &Tensor, right: &Tensor) -> Result<usize> {
    let expected = "(batch, 3, height, width)";
    let left_dims = left.dims();
    if left_dims.len() != 4 || left_dims[1] != resnet::INPUT_CHANNELS {
        return Err(GazeError::shape("left eye image", expected, left_dims));
    }
    let right_dims = right.dims();
    if right_dims.len() != 4
        || right_dims[1] != resnet::INPUT_CHANNELS
        || right_dims[0] != left_dims[0]
    {
        return Err(GazeError::shape("right eye image", expected, right_dims));
    }
    Ok(left_dims[0])
}

/// Returns the batch size of a `(batch, width)` embedding.
fn embedding_batch(embedding: &Tensor, what: &'static str, width: usize) -> Result<usize> {
    match *embedding.dims() {
        [batch, w] if w == width => Ok(batch),
        ref dims => Err(GazeError::shape(what, format!("(batch, {width})"), dims)),
    }
}

/// The pose must be `(batch, 2)` in the dtype of the tensors it joins.
fn check_head_pose(head_pose: &Tensor, batch: usize, dtype: DType) -> Result<()> {
    let dims = head_pose.dims();
    if dims != [batch, HEAD_POSE_DIM].as_slice() {
        return Err(GazeError::shape(
            "head pose",
            format!("({batch}, {HEAD_POSE_DIM})"),
            dims,
        ));
    }
    if head_pose.dtype() != dtype {
        return Err(GazeError::Dtype {
            what: "head pose",
            expected: dtype,
            actual: head_pose.dtype(),
        });
    }
    Ok(())
}
