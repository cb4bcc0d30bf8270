use ndarray::{Array1, ArrayView1};

use crate::error::{DqnError, Result};

/// Trait defining the interface for loss functions
pub trait Loss: Send + Sync {
    /// Compute the loss between predictions and targets
    fn compute(&self, predictions: ArrayView1<f32>, targets: ArrayView1<f32>) -> Result<f32>;

    /// Compute the gradient of the loss with respect to predictions
    fn gradient(&self, predictions: ArrayView1<f32>, targets: ArrayView1<f32>) -> Result<Array1<f32>>;
}

/// Mean Squared Error loss: `mean((prediction - target)^2)`
#[derive(Clone, Copy, Debug, Default)]
pub struct MeanSquaredError;

fn check(predictions: &ArrayView1<f32>, targets: &ArrayView1<f32>) -> Result<()> {
    if predictions.is_empty() {
        return Err(DqnError::EmptyBuffer("loss over zero predictions".to_string()));
    }
    if predictions.len() != targets.len() {
        return Err(DqnError::dimension_mismatch(
            format!("{} targets", predictions.len()),
            format!("{}", targets.len()),
        ));
    }
    Ok(())
}

impl Loss for MeanSquaredError {
    fn compute(&self, predictions: ArrayView1<f32>, targets: ArrayView1<f32>) -> Result<f32> {
        check(&predictions, &targets)?;
        let diff = &predictions - &targets;
        Ok(diff.mapv(|x| x * x).sum() / predictions.len() as f32)
    }

    fn gradient(&self, predictions: ArrayView1<f32>, targets: ArrayView1<f32>) -> Result<Array1<f32>> {
        check(&predictions, &targets)?;
        Ok((&predictions - &targets) * (2.0 / predictions.len() as f32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn mse_value_and_gradient() {
        let pred = array![1.0, 3.0];
        let target = array![0.0, 1.0];
        assert_eq!(MeanSquaredError.compute(pred.view(), target.view()).unwrap(), 2.5);
        assert_eq!(MeanSquaredError.gradient(pred.view(), target.view()).unwrap(), array![1.0, 2.0]);
    }

    #[test]
    fn mse_rejects_empty_and_ragged_inputs() {
        let empty = Array1::<f32>::zeros(0);
        assert!(MeanSquaredError.compute(empty.view(), empty.view()).is_err());
        assert!(MeanSquaredError.compute(array![1.0].view(), array![1.0, 2.0].view()).is_err());
    }
}
