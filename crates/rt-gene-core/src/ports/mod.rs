//! Port definitions for hexagonal architecture.
//!
//! These traits define the boundaries between the model core and external adapters.

mod result_output;
mod weights;

pub use result_output::ResultOutput;
pub use weights::PretrainedWeights;
