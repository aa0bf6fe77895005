//! Model inference and construction using Candle.
//!
//! Provides:
//! - ResNet-18/50/101 feature extractors
//! - The fully-connected regression head and its initialisers
//! - `DualBranchGazeRegressor`, which fuses both eye branches with head pose
//! - Eye image preprocessing and safetensors loading

mod device;
mod head;
pub mod init;
mod loader;
mod model;
mod preprocess;
pub mod resnet;

pub use device::{device_name, select_device};
pub use head::RegressionHead;
pub use loader::{load_safetensors, read_safetensors};
pub use model::{DualBranchGazeRegressor, HEAD_PREFIX, LEFT_PREFIX, RIGHT_PREFIX};
pub use preprocess::{
    crop_offset, preprocess_eye, resize_and_crop, resized_dimensions, stack_batch, CROP_SIZE,
    IMAGENET_MEAN, IMAGENET_STD, RESIZE_SHORT_SIDE,
};
pub use resnet::ResNetBackbone;
