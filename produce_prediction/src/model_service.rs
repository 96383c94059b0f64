use crate::classifier::ClassifierError;
use ndarray::Array4;

/// A loaded classification model. Implementations are immutable after
/// construction and shared across requests.
pub trait ModelService: Send + Sync + 'static {
    /// Runs one forward pass on a `(1, H, W, 3)` batch and returns the raw
    /// score vector, one entry per category.
    fn predict(&self, input: &Array4<f32>) -> Result<Vec<f32>, ClassifierError>;
}
