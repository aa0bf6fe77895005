//! Prediction records emitted per eye pair.

use serde::{Deserialize, Serialize};

use super::{BackboneVariant, GazeAngles, HeadPose};

/// Result of running the regressor on one left/right eye pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GazePrediction {
    /// Path of the left eye image.
    pub left: String,
    /// Path of the right eye image.
    pub right: String,
    /// Head pose used for this pair.
    pub head_pose: HeadPose,
    /// Backbone that produced the prediction.
    pub variant: BackboneVariant,
    /// Raw regression outputs.
    pub outputs: Vec<f32>,
    /// Pitch/yaw view of `outputs` when the model has two outputs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gaze: Option<GazeAngles>,
    /// Timestamp of inference (ISO 8601).
    pub timestamp: String,
}
