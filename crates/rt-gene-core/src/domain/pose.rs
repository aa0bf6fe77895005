//! Head pose inputs and gaze outputs.

use candle_core::{Device, Tensor};
use serde::{Deserialize, Serialize};

use super::HEAD_POSE_DIM;
use crate::error::Result;

/// Head orientation fed alongside the eye images, in radians.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadPose {
    /// Rotation about the horizontal axis.
    pub pitch: f32,
    /// Rotation about the vertical axis.
    pub yaw: f32,
}

impl HeadPose {
    /// Creates a head pose.
    #[must_use]
    pub const fn new(pitch: f32, yaw: f32) -> Self {
        Self { pitch, yaw }
    }

    /// Stacks poses into a `(batch, 2)` tensor.
    ///
    /// # Errors
    ///
    /// Returns an error if tensor creation fails.
    pub fn batch_tensor(poses: &[Self], device: &Device) -> Result<Tensor> {
        let data: Vec<f32> = poses.iter().flat_map(|p| [p.pitch, p.yaw]).collect();
        Ok(Tensor::from_vec(data, (poses.len(), HEAD_POSE_DIM), device)?)
    }
}

/// Estimated gaze direction, in radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GazeAngles {
    /// Vertical gaze angle.
    pub pitch: f32,
    /// Horizontal gaze angle.
    pub yaw: f32,
}

impl GazeAngles {
    /// Interprets a two-element output row as `(pitch, yaw)`.
    #[must_use]
    pub fn from_outputs(outputs: &[f32]) -> Option<Self> {
        match outputs {
            [pitch, yaw] => Some(Self {
                pitch: *pitch,
                yaw: *yaw,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_tensor_shape_and_order() {
        let poses = [HeadPose::new(0.1, -0.2), HeadPose::new(0.3, 0.4)];
        let t = HeadPose::batch_tensor(&poses, &Device::Cpu).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(t.dims(), &[2, 2]);
        let rows = t.to_vec2::<f32>().unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(rows, vec![vec![0.1, -0.2], vec![0.3, 0.4]]);
    }

    #[test]
    fn test_gaze_from_outputs() {
        assert_eq!(
            GazeAngles::from_outputs(&[0.5, -0.25]),
            Some(GazeAngles {
                pitch: 0.5,
                yaw: -0.25
            })
        );
        assert!(GazeAngles::from_outputs(&[1.0, 2.0, 3.0]).is_none());
    }
}
