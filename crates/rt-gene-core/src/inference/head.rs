//! Fully-connected regression head.

use candle_core::{Module, ModuleT, Tensor, Var};
use candle_nn::{batch_norm, linear, BatchNorm, BatchNormConfig, Linear, VarBuilder};

use super::init;
use crate::domain::HeadInit;
use crate::error::{GazeError, Result};

/// Parameter names of the three linear layers, relative to the head.
const LINEAR_NAMES: [(&str, &str); 3] = [
    ("0.weight", "0.bias"),
    ("3.weight", "3.bias"),
    ("6.weight", "6.bias"),
];

/// Regression head mapping fused features to the output vector.
///
/// Architecture: `Linear(F, F) -> BatchNorm1d -> ReLU`, twice, then
/// `Linear(F, num_outputs)`. Layers sit at the indices `0, 1, 3, 4, 6` of the
/// original sequential container; the ReLUs carry no parameters.
#[derive(Debug)]
pub struct RegressionHead {
    fc1: Linear,
    bn1: BatchNorm,
    fc2: Linear,
    bn2: BatchNorm,
    out: Linear,
    in_features: usize,
    num_outputs: usize,
}

impl RegressionHead {
    /// Creates a head with `in_features` inputs and `num_outputs` outputs.
    ///
    /// Linear layers start from candle's default initialisation; call
    /// [`RegressionHead::init_weights`] to apply a specific policy.
    ///
    /// # Errors
    ///
    /// Returns an error if a parameter is missing from `vb` or has the wrong shape.
    #[allow(clippy::needless_pass_by_value)]
    pub fn new(in_features: usize, num_outputs: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            fc1: linear(in_features, in_features, vb.pp("0"))?,
            bn1: batch_norm(in_features, BatchNormConfig::default(), vb.pp("1"))?,
            fc2: linear(in_features, in_features, vb.pp("3"))?,
            bn2: batch_norm(in_features, BatchNormConfig::default(), vb.pp("4"))?,
            out: linear(in_features, num_outputs, vb.pp("6"))?,
            in_features,
            num_outputs,
        })
    }

    /// Width of the fused feature vector this head consumes.
    #[must_use]
    pub const fn in_features(&self) -> usize {
        self.in_features
    }

    /// Size of the output vector.
    #[must_use]
    pub const fn num_outputs(&self) -> usize {
        self.num_outputs
    }

    /// Number of learnable parameters (batch norm running statistics excluded).
    #[must_use]
    pub const fn parameter_count(in_features: usize, num_outputs: usize) -> usize {
        let hidden = in_features * in_features + in_features;
        let norm = 2 * in_features;
        2 * (hidden + norm) + in_features * num_outputs + num_outputs
    }

    /// Re-initialises the linear layers in place: weights per `policy`, biases zeroed.
    ///
    /// # Errors
    ///
    /// Returns [`GazeError::NotTrainable`] if the head was loaded from frozen
    /// tensors, or an error if sampling fails.
    pub fn init_weights(&self, policy: HeadInit) -> Result<()> {
        let layers = [&self.fc1, &self.fc2, &self.out];
        for (layer, (weight_name, bias_name)) in layers.into_iter().zip(LINEAR_NAMES) {
            let weight = as_var(weight_name, layer.weight())?;
            let (rows, cols) = weight.dims2()?;
            let values = match policy {
                HeadInit::Normal { std } => init::normal(rows, cols, std, weight.device())?,
                HeadInit::Orthogonal => init::orthogonal(rows, cols, weight.device())?,
            };
            weight.set(&values.to_dtype(weight.dtype())?)?;

            if let Some(bias) = layer.bias() {
                let bias = as_var(bias_name, bias)?;
                bias.set(&bias.zeros_like()?)?;
            }
        }
        Ok(())
    }
}

/// Views a parameter tensor as the variable it was created from.
fn as_var(name: &'static str, tensor: &Tensor) -> Result<Var> {
    if !tensor.is_variable() {
        return Err(GazeError::NotTrainable(name));
    }
    Ok(Var::from_tensor(tensor)?)
}

impl ModuleT for RegressionHead {
    fn forward_t(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor> {
        let xs = self.fc1.forward(xs)?.apply_t(&self.bn1, train)?.relu()?;
        let xs = self.fc2.forward(&xs)?.apply_t(&self.bn2, train)?.relu()?;
        self.out.forward(&xs)
    }
}
