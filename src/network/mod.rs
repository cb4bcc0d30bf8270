//! Value networks mapping observations to one Q-value per action.
//!
//! Two variants share the [`QNetwork`] interface:
//!
//! - [`ConvQNetwork`] for single-channel grid observations
//! - [`DenseQNetwork`] for flat feature vectors (grids are flattened row-major)
//!
//! [`ValueNetwork`] picks one of them at construction time and dispatches to it.

mod conv;
mod dense;

pub use conv::ConvQNetwork;
pub use dense::DenseQNetwork;

use ndarray::{stack, Array2, ArrayD, ArrayView2, ArrayViewD, ArrayViewMutD, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::activations::Activation;
use crate::device::{Device, Tensor};
use crate::error::{DqnError, Result};
use crate::layers::DenseLayer;

/// Hidden widths of the fully-connected head shared by both variants.
pub const HIDDEN_SIZES: [usize; 2] = [64, 32];

/// Parameter gradients, one entry per tensor returned by [`QNetwork::parameters`], same order.
pub type Gradients = Vec<ArrayD<f32>>;

/// Capability shared by every value network.
pub trait QNetwork {
    /// Q-values for a batch `[B, ..observation_shape]`, shaped `[B, num_actions]`.
    ///
    /// Does not record anything for a later backward pass.
    fn forward(&self, states: &Tensor) -> Result<Array2<f32>>;

    /// Same as `forward`, but caches the activations `backward` needs.
    fn forward_train(&mut self, states: &Tensor) -> Result<Array2<f32>>;

    /// Back-propagates dL/dQ (`[B, num_actions]`) from the last `forward_train` call.
    fn backward(&mut self, output_grad: ArrayView2<f32>) -> Result<Gradients>;

    fn parameters(&self) -> Vec<ArrayViewD<'_, f32>>;

    fn parameters_mut(&mut self) -> Vec<ArrayViewMutD<'_, f32>>;

    fn device(&self) -> Device;

    fn num_actions(&self) -> usize;

    /// Shape of a single observation, without the batch axis.
    fn input_shape(&self) -> &[usize];
}

/// The value network variant owned by an agent.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub enum ValueNetwork {
    Conv(ConvQNetwork),
    Dense(DenseQNetwork),
}

impl ValueNetwork {
    /// Builds the convolutional variant when `use_conv` is set, the fully-connected one otherwise.
    pub fn new<R: Rng + ?Sized>(
        use_conv: bool,
        input_shape: &[usize],
        num_actions: usize,
        device: Device,
        rng: &mut R,
    ) -> Result<Self> {
        if use_conv {
            Ok(ValueNetwork::Conv(ConvQNetwork::new(input_shape, num_actions, device, rng)?))
        } else {
            Ok(ValueNetwork::Dense(DenseQNetwork::new(input_shape, num_actions, device, rng)?))
        }
    }

    pub fn is_conv(&self) -> bool {
        matches!(self, ValueNetwork::Conv(_))
    }
}

impl QNetwork for ValueNetwork {
    fn forward(&self, states: &Tensor) -> Result<Array2<f32>> {
        match self {
            ValueNetwork::Conv(net) => net.forward(states),
            ValueNetwork::Dense(net) => net.forward(states),
        }
    }

    fn forward_train(&mut self, states: &Tensor) -> Result<Array2<f32>> {
        match self {
            ValueNetwork::Conv(net) => net.forward_train(states),
            ValueNetwork::Dense(net) => net.forward_train(states),
        }
    }

    fn backward(&mut self, output_grad: ArrayView2<f32>) -> Result<Gradients> {
        match self {
            ValueNetwork::Conv(net) => net.backward(output_grad),
            ValueNetwork::Dense(net) => net.backward(output_grad),
        }
    }

    fn parameters(&self) -> Vec<ArrayViewD<'_, f32>> {
        match self {
            ValueNetwork::Conv(net) => net.parameters(),
            ValueNetwork::Dense(net) => net.parameters(),
        }
    }

    fn parameters_mut(&mut self) -> Vec<ArrayViewMutD<'_, f32>> {
        match self {
            ValueNetwork::Conv(net) => net.parameters_mut(),
            ValueNetwork::Dense(net) => net.parameters_mut(),
        }
    }

    fn device(&self) -> Device {
        match self {
            ValueNetwork::Conv(net) => net.device(),
            ValueNetwork::Dense(net) => net.device(),
        }
    }

    fn num_actions(&self) -> usize {
        match self {
            ValueNetwork::Conv(net) => net.num_actions(),
            ValueNetwork::Dense(net) => net.num_actions(),
        }
    }

    fn input_shape(&self) -> &[usize] {
        match self {
            ValueNetwork::Conv(net) => net.input_shape(),
            ValueNetwork::Dense(net) => net.input_shape(),
        }
    }
}

/// Stacks observations along a new leading batch axis and places them on `device`.
pub fn batch_observations(observations: &[ArrayD<f32>], device: Device) -> Result<Tensor> {
    if observations.is_empty() {
        return Err(DqnError::EmptyBuffer("cannot batch zero observations".to_string()));
    }
    let views: Vec<ArrayViewD<f32>> = observations.iter().map(|o| o.view()).collect();
    Ok(Tensor::new(stack(Axis(0), &views)?, device))
}

/// Dense stack `input -> 64 -> 32 -> num_actions`, ReLU between hidden layers, linear output.
fn q_head<R: Rng + ?Sized>(input_size: usize, num_actions: usize, rng: &mut R) -> Result<Vec<DenseLayer>> {
    let sizes = [input_size, HIDDEN_SIZES[0], HIDDEN_SIZES[1], num_actions];
    let mut activations = vec![Activation::Relu; sizes.len() - 2];
    activations.push(Activation::Linear);

    sizes
        .windows(2)
        .zip(activations)
        .map(|(window, activation)| DenseLayer::new(window[0], window[1], activation, rng))
        .collect()
}

fn head_predict(layers: &[DenseLayer], inputs: Array2<f32>) -> Result<Array2<f32>> {
    layers.iter().try_fold(inputs, |x, layer| layer.predict(x.view()))
}

fn head_forward(layers: &mut [DenseLayer], inputs: Array2<f32>) -> Result<Array2<f32>> {
    layers.iter_mut().try_fold(inputs, |x, layer| layer.forward_batch(x.view()))
}

/// Returns the gradient w.r.t. the head's input and the parameter gradients in forward order.
fn head_backward(layers: &[DenseLayer], output_grad: ArrayView2<f32>) -> Result<(Array2<f32>, Gradients)> {
    let mut current = output_grad.to_owned();
    let mut per_layer = Vec::with_capacity(layers.len());
    for layer in layers.iter().rev() {
        let (input_grad, weight_grad, bias_grad) = layer.backward_batch(current.view())?;
        per_layer.push(DenseLayer::gradient_tensors(weight_grad, bias_grad));
        current = input_grad;
    }
    per_layer.reverse();
    Ok((current, per_layer.into_iter().flatten().collect()))
}

/// Number of observations in `states` after checking device and per-sample shape.
fn check_batch(states: &Tensor, device: Device, input_shape: &[usize]) -> Result<usize> {
    device.ensure_same(states.device)?;
    let shape = states.shape();
    if shape.is_empty() || shape[0] == 0 {
        return Err(DqnError::EmptyBuffer("state batch is empty".to_string()));
    }
    let per_sample: usize = shape[1..].iter().product();
    let expected: usize = input_shape.iter().product();
    if per_sample != expected {
        return Err(DqnError::dimension_mismatch(
            format!("[batch, {:?}]", input_shape),
            format!("{:?}", shape),
        ));
    }
    Ok(shape[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn batching_adds_leading_axis() {
        let obs = vec![ArrayD::zeros(IxDyn(&[12, 12])), ArrayD::ones(IxDyn(&[12, 12]))];
        let batch = batch_observations(&obs, Device::Cpu).unwrap();
        assert_eq!(batch.shape(), &[2, 12, 12]);
    }

    #[test]
    fn batching_rejects_ragged_observations() {
        let obs = vec![ArrayD::zeros(IxDyn(&[3])), ArrayD::zeros(IxDyn(&[4]))];
        assert!(batch_observations(&obs, Device::Cpu).is_err());
        assert!(batch_observations(&[], Device::Cpu).is_err());
    }

    #[test]
    fn flag_selects_variant() {
        let mut rng = StdRng::seed_from_u64(5);
        let conv = ValueNetwork::new(true, &[12, 12], 10, Device::Cpu, &mut rng).unwrap();
        let dense = ValueNetwork::new(false, &[12, 12], 10, Device::Cpu, &mut rng).unwrap();
        assert!(conv.is_conv());
        assert!(!dense.is_conv());
        assert_eq!(conv.num_actions(), 10);
        assert_eq!(dense.input_shape(), &[12, 12]);
    }
}
