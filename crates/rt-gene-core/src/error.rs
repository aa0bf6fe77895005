//! Error types for model construction and inference.

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::BackboneVariant;

/// Errors raised while building or running a gaze regressor.
#[derive(Debug, Error)]
pub enum GazeError {
    /// An input tensor does not have the shape the network expects.
    #[error("shape mismatch for {what}: expected {expected}, got {actual:?}")]
    Shape {
        /// Which input was rejected.
        what: &'static str,
        /// Human readable description of the expected shape.
        expected: String,
        /// Dimensions actually received.
        actual: Vec<usize>,
    },

    /// An input tensor has a different dtype from the tensors it is combined with.
    #[error("dtype mismatch for {what}: expected {expected:?}, got {actual:?}")]
    Dtype {
        /// Which input was rejected.
        what: &'static str,
        /// Dtype of the tensors it joins.
        expected: candle_core::DType,
        /// Dtype actually received.
        actual: candle_core::DType,
    },

    /// The pretrained weight provider could not supply backbone tensors.
    #[error("pretrained weights unavailable for {variant}: {reason}")]
    WeightsUnavailable {
        /// Backbone that was requested.
        variant: BackboneVariant,
        /// Provider error, rendered with its context chain.
        reason: String,
    },

    /// A backbone parameter was not present in the pretrained tensors.
    #[error("pretrained weights are missing tensor '{0}'")]
    MissingTensor(String),

    /// The parameter is a frozen tensor and cannot be re-initialised.
    #[error("parameter '{0}' is not trainable")]
    NotTrainable(&'static str),

    /// The model configuration is unusable.
    #[error("invalid model configuration: {0}")]
    InvalidConfig(String),

    /// A weights file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A weights file is not valid safetensors.
    #[error("invalid safetensors data: {0}")]
    Safetensors(#[from] safetensors::SafeTensorError),

    /// A safetensors dtype has no candle equivalent.
    #[error("unsupported dtype: {0}")]
    UnsupportedDtype(String),

    /// Tensor operation failure inside candle.
    #[error(transparent)]
    Candle(#[from] candle_core::Error),
}

/// Convenience alias for results in this crate.
pub type Result<T, E = GazeError> = std::result::Result<T, E>;

impl GazeError {
    /// Builds a [`GazeError::Shape`] from the offending dimensions.
    pub(crate) fn shape(what: &'static str, expected: impl Into<String>, actual: &[usize]) -> Self {
        Self::Shape {
            what,
            expected: expected.into(),
            actual: actual.to_vec(),
        }
    }

    /// Returns true if this is a shape mismatch.
    #[must_use]
    pub const fn is_shape(&self) -> bool {
        matches!(self, Self::Shape { .. })
    }
}
