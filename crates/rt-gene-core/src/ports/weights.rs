//! Pretrained weight provider port.

use std::collections::HashMap;

use candle_core::{Device, Tensor};

use crate::domain::BackboneVariant;

/// Port for obtaining ImageNet-pretrained backbone weights.
///
/// Tensors are keyed by their torchvision parameter names (`conv1.weight`,
/// `layer1.0.bn1.running_mean`, `fc.bias`, ...). Providers may include the
/// classification layer and integer buffers; consumers ignore what they do
/// not need.
pub trait PretrainedWeights: Send + Sync {
    /// Returns the backbone tensors for `variant`, placed on `device`.
    ///
    /// # Errors
    ///
    /// Returns an error if the weights cannot be fetched, read or decoded.
    fn backbone_tensors(
        &self,
        variant: BackboneVariant,
        device: &Device,
    ) -> anyhow::Result<HashMap<String, Tensor>>;
}
