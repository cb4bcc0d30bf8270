use ndarray::{Array1, Array2, ArrayD, ArrayView2, ArrayViewD, ArrayViewMutD, Axis};
use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::activations::Activation;
use crate::error::{DqnError, Result};
use super::initialization::WeightInit;

/// A fully connected (dense) layer in a neural network
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DenseLayer {
    pub weights: Array2<f32>,
    pub biases: Array1<f32>,
    pub activation: Activation,
    #[serde(skip)]
    pre_activation_output: Option<Array2<f32>>,
    #[serde(skip)]
    inputs: Option<Array2<f32>>,
}

impl DenseLayer {
    /// Create a new dense layer with the given input size, output size, and activation function.
    /// Weights are drawn with the initialization recommended for the activation; biases start at zero.
    pub fn new<R: Rng + ?Sized>(input_size: usize, output_size: usize, activation: Activation, rng: &mut R) -> Result<Self> {
        let weights = WeightInit::for_activation(&activation)
            .initialize((input_size, output_size), input_size, output_size, rng)?;
        let biases = Array1::zeros(output_size);
        Ok(DenseLayer {
            weights,
            biases,
            activation,
            pre_activation_output: None,
            inputs: None,
        })
    }

    pub fn with_weights(mut self, weights: Array2<f32>) -> Result<Self> {
        if weights.dim() != self.weights.dim() {
            return Err(DqnError::dimension_mismatch(
                format!("{:?}", self.weights.dim()),
                format!("{:?}", weights.dim()),
            ));
        }
        self.weights = weights;
        Ok(self)
    }

    pub fn with_biases(mut self, biases: Array1<f32>) -> Result<Self> {
        if biases.dim() != self.biases.dim() {
            return Err(DqnError::dimension_mismatch(
                format!("{:?}", self.biases.dim()),
                format!("{:?}", biases.dim()),
            ));
        }
        self.biases = biases;
        Ok(self)
    }

    pub fn input_size(&self) -> usize {
        self.weights.shape()[0]
    }

    pub fn output_size(&self) -> usize {
        self.weights.shape()[1]
    }

    fn check_input(&self, inputs: &ArrayView2<f32>) -> Result<()> {
        if inputs.shape()[1] != self.input_size() {
            return Err(DqnError::dimension_mismatch(
                format!("[batch, {}]", self.input_size()),
                format!("{:?}", inputs.shape()),
            ));
        }
        Ok(())
    }

    fn affine(&self, inputs: ArrayView2<f32>) -> Array2<f32> {
        inputs.dot(&self.weights) + &self.biases.view().insert_axis(Axis(0))
    }

    /// Forward pass without touching the backward cache.
    pub fn predict(&self, inputs: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.check_input(&inputs)?;
        let mut outputs = self.affine(inputs);
        self.activation.apply(&mut outputs);
        Ok(outputs)
    }

    /// Forward pass that remembers inputs and pre-activations for `backward_batch`.
    pub fn forward_batch(&mut self, inputs: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.check_input(&inputs)?;
        let pre_activation = self.affine(inputs);
        let mut outputs = pre_activation.clone();
        self.activation.apply(&mut outputs);
        self.inputs = Some(inputs.to_owned());
        self.pre_activation_output = Some(pre_activation);
        Ok(outputs)
    }

    /// Back-propagate `output_errors` (dL/d output) through the layer.
    ///
    /// Returns `(input_gradients, weight_gradients, bias_gradients)`.
    pub fn backward_batch(&self, output_errors: ArrayView2<f32>) -> Result<(Array2<f32>, Array2<f32>, Array1<f32>)> {
        let (pre_activation_output, inputs) = match (&self.pre_activation_output, &self.inputs) {
            (Some(pre), Some(inputs)) => (pre, inputs),
            _ => {
                return Err(DqnError::NumericalError(
                    "forward_batch() must be called before backward_batch()".to_string(),
                ))
            }
        };
        if output_errors.dim() != pre_activation_output.dim() {
            return Err(DqnError::dimension_mismatch(
                format!("{:?}", pre_activation_output.dim()),
                format!("{:?}", output_errors.dim()),
            ));
        }

        let adjusted_error = &output_errors * &self.activation.derivative(pre_activation_output);
        let weight_gradients = inputs.t().dot(&adjusted_error);
        let bias_gradients = adjusted_error.sum_axis(Axis(0));
        let input_gradients = adjusted_error.dot(&self.weights.t());

        Ok((input_gradients, weight_gradients, bias_gradients))
    }

    pub fn parameters(&self) -> Vec<ArrayViewD<'_, f32>> {
        vec![self.weights.view().into_dyn(), self.biases.view().into_dyn()]
    }

    pub fn parameters_mut(&mut self) -> Vec<ArrayViewMutD<'_, f32>> {
        vec![self.weights.view_mut().into_dyn(), self.biases.view_mut().into_dyn()]
    }

    /// Gradients in the same order as `parameters`.
    pub(crate) fn gradient_tensors(weight_gradients: Array2<f32>, bias_gradients: Array1<f32>) -> [ArrayD<f32>; 2] {
        [weight_gradients.into_dyn(), bias_gradients.into_dyn()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn layer(activation: Activation) -> DenseLayer {
        DenseLayer::new(2, 2, activation, &mut StdRng::seed_from_u64(1))
            .unwrap()
            .with_weights(array![[1.0, -1.0], [0.5, 2.0]])
            .unwrap()
            .with_biases(array![0.0, 0.5])
            .unwrap()
    }

    #[test]
    fn forward_applies_affine_then_activation() {
        let layer = layer(Activation::Relu);
        let out = layer.predict(array![[1.0, 1.0]].view()).unwrap();
        assert_eq!(out, array![[1.5, 1.5]]);

        let out = layer.predict(array![[0.0, -1.0]].view()).unwrap();
        assert_eq!(out, array![[0.0, 0.0]]);
    }

    #[test]
    fn backward_matches_hand_computed_gradients() {
        let mut layer = layer(Activation::Linear);
        let inputs = array![[1.0, 2.0]];
        layer.forward_batch(inputs.view()).unwrap();
        let (input_grad, weight_grad, bias_grad) = layer.backward_batch(array![[1.0, 0.0]].view()).unwrap();

        assert_eq!(weight_grad, array![[1.0, 0.0], [2.0, 0.0]]);
        assert_eq!(bias_grad, array![1.0, 0.0]);
        assert_eq!(input_grad, array![[1.0, 0.5]]);
    }

    #[test]
    fn backward_without_forward_fails() {
        let layer = layer(Activation::Relu);
        assert!(layer.backward_batch(array![[1.0, 1.0]].view()).is_err());
    }

    #[test]
    fn wrong_input_width_is_rejected() {
        let layer = layer(Activation::Relu);
        assert!(matches!(
            layer.predict(array![[1.0, 2.0, 3.0]].view()),
            Err(DqnError::DimensionMismatch { .. })
        ));
    }
}
