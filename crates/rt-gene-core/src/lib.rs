//! RT-GENE Core - Dual-branch gaze regression on candle
//!
//! This crate contains the domain types, the ResNet backbones, the regression
//! head and the [`DualBranchGazeRegressor`] that ties them together, plus the
//! ports used to plug in pretrained weights and result sinks.

pub mod domain;
pub mod error;
pub mod inference;
pub mod ports;

pub use domain::{
    BackboneVariant, BlockKind, GazeAngles, GazePrediction, HeadInit, HeadPose, ModelConfig,
    DEFAULT_NUM_OUTPUTS, HEAD_POSE_DIM,
};
pub use error::{GazeError, Result};
pub use inference::{select_device, DualBranchGazeRegressor};
pub use ports::{PretrainedWeights, ResultOutput};
