//! Mock implementations of core port traits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use rt_gene_core::domain::GazePrediction;
use rt_gene_core::inference::resnet::to_torchvision_name;
use rt_gene_core::inference::ResNetBackbone;
use rt_gene_core::ports::{PretrainedWeights, ResultOutput};
use rt_gene_core::BackboneVariant;

/// Classes of the ImageNet classifier shipped with pretrained backbones.
const IMAGENET_CLASSES: usize = 1000;

/// Mock implementation of `PretrainedWeights` for testing.
///
/// Serves random tensors under torchvision parameter names, including the
/// `fc.*` classifier and an integer `num_batches_tracked` buffer, the way a
/// real hub checkpoint does.
pub struct MockWeights {
    variant: BackboneVariant,
    tensors: HashMap<String, Tensor>,
    calls: AtomicUsize,
}

impl MockWeights {
    /// Creates random weights for `variant` on the CPU.
    ///
    /// # Errors
    ///
    /// Returns an error if building the reference backbone fails.
    pub fn for_variant(variant: BackboneVariant) -> anyhow::Result<Self> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        ResNetBackbone::new(variant, vb)?;

        let mut tensors = HashMap::new();
        {
            let data = varmap.data().lock().unwrap_or_else(PoisonError::into_inner);
            for (name, var) in data.iter() {
                if let Some(torchvision) = to_torchvision_name(name) {
                    tensors.insert(torchvision, var.as_tensor().copy()?);
                }
            }
        }

        let width = variant.embedding_width();
        tensors.insert(
            "fc.weight".to_string(),
            Tensor::randn(0f32, 0.01, (IMAGENET_CLASSES, width), &device)?,
        );
        tensors.insert(
            "fc.bias".to_string(),
            Tensor::zeros(IMAGENET_CLASSES, DType::F32, &device)?,
        );
        tensors.insert(
            "bn1.num_batches_tracked".to_string(),
            Tensor::new(0i64, &device)?,
        );

        Ok(Self {
            variant,
            tensors,
            calls: AtomicUsize::new(0),
        })
    }

    /// Removes a tensor, simulating an incomplete checkpoint.
    #[must_use]
    pub fn without(mut self, name: &str) -> Self {
        self.tensors.remove(name);
        self
    }

    /// Replaces or adds a tensor.
    #[must_use]
    pub fn with_tensor(mut self, name: &str, tensor: Tensor) -> Self {
        self.tensors.insert(name.to_string(), tensor);
        self
    }

    /// Returns the served tensors.
    #[must_use]
    pub const fn tensors(&self) -> &HashMap<String, Tensor> {
        &self.tensors
    }

    /// Returns how many times the weights were requested.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PretrainedWeights for MockWeights {
    fn backbone_tensors(
        &self,
        variant: BackboneVariant,
        device: &Device,
    ) -> anyhow::Result<HashMap<String, Tensor>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if variant != self.variant {
            anyhow::bail!("mock holds {} weights, not {variant}", self.variant);
        }
        self.tensors
            .iter()
            .map(|(name, t)| Ok((name.clone(), t.to_device(device)?)))
            .collect()
    }
}

/// `PretrainedWeights` that always fails, like an unreachable hub.
pub struct FailingWeights {
    message: String,
}

impl FailingWeights {
    /// Creates a provider failing with `message`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl PretrainedWeights for FailingWeights {
    fn backbone_tensors(
        &self,
        _variant: BackboneVariant,
        _device: &Device,
    ) -> anyhow::Result<HashMap<String, Tensor>> {
        anyhow::bail!("{}", self.message)
    }
}

/// Mock implementation of `ResultOutput` for testing.
///
/// Captures predictions for later assertions.
pub struct MockResultOutput {
    predictions: Arc<Mutex<Vec<GazePrediction>>>,
    flush_count: Arc<Mutex<usize>>,
}

impl MockResultOutput {
    /// Creates a new mock output.
    #[must_use]
    pub fn new() -> Self {
        Self {
            predictions: Arc::new(Mutex::new(Vec::new())),
            flush_count: Arc::new(Mutex::new(0)),
        }
    }

    /// Returns all captured predictions.
    #[must_use]
    pub fn predictions(&self) -> Vec<GazePrediction> {
        self.predictions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the number of times `flush()` was called.
    #[must_use]
    pub fn flush_count(&self) -> usize {
        *self
            .flush_count
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MockResultOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultOutput for MockResultOutput {
    fn write(&self, prediction: &GazePrediction) -> anyhow::Result<()> {
        self.predictions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(prediction.clone());
        Ok(())
    }

    fn flush(&self) -> anyhow::Result<()> {
        if let Ok(mut c) = self.flush_count.lock() {
            *c += 1;
        }
        Ok(())
    }
}
