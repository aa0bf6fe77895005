//! Core domain types for gaze regression.

mod pose;
mod prediction;
mod variant;

pub use pose::{GazeAngles, HeadPose};
pub use prediction::GazePrediction;
pub use variant::{
    BackboneVariant, BlockKind, HeadInit, ModelConfig, DEFAULT_NUM_OUTPUTS, HEAD_POSE_DIM,
};
