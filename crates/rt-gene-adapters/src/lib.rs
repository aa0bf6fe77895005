//! RT-GENE Adapters - External adapters for rt-gene.
//!
//! This crate provides adapters for:
//! - Pretrained backbone weight downloading and caching
//! - Eye image loading from the filesystem

pub mod fs;
pub mod weights;

pub use fs::{is_supported_image, load_eye_image};
pub use weights::{default_weights_dir, HubWeights, ProgressCallback};
