//! Result output port for writing gaze predictions.

use crate::domain::GazePrediction;

/// Port for outputting gaze predictions.
pub trait ResultOutput: Send + Sync {
    /// Writes a single prediction.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write(&self, prediction: &GazePrediction) -> anyhow::Result<()>;

    /// Writes a complete batch of predictions as one unit.
    ///
    /// Defaults to writing each prediction in turn.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_batch(&self, predictions: &[GazePrediction]) -> anyhow::Result<()> {
        predictions.iter().try_for_each(|p| self.write(p))
    }

    /// Flushes any buffered output.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing fails.
    fn flush(&self) -> anyhow::Result<()>;
}
