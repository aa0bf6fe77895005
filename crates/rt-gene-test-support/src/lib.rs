//! Test support utilities for rt-gene.
//!
//! Provides mock weight providers, synthetic eye images, and a capturing
//! result output for testing the gaze regressor and its adapters.
//!
//! # Example
//!
//! ```
//! use rt_gene_core::BackboneVariant;
//! use rt_gene_test_support::{MockWeights, SyntheticEyeBuilder};
//!
//! // Torchvision-named random weights for the small backbone
//! let weights = MockWeights::for_variant(BackboneVariant::Resnet18).unwrap();
//! assert!(weights.tensors().contains_key("fc.weight"));
//!
//! // A synthetic eye crop in RT-GENE's 60x36 format
//! let eye = SyntheticEyeBuilder::eye(60, 36);
//! assert_eq!(eye.width(), 60);
//! ```

mod builders;
mod mocks;

pub use builders::SyntheticEyeBuilder;
pub use mocks::{FailingWeights, MockResultOutput, MockWeights};
