use ndarray::{Array2, Array4, ArrayView2, ArrayViewD, ArrayViewMutD};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::activations::Activation;
use crate::device::{Device, Tensor};
use crate::error::{DqnError, Result};
use crate::layers::{Conv2DLayer, DenseLayer};
use super::{check_batch, head_backward, head_forward, head_predict, q_head, Gradients, QNetwork};

/// Convolutional Q-network for single-channel grids.
///
/// `conv(1->32, k4, s2) -> ReLU -> conv(32->16, k3, s1) -> ReLU -> flatten -> 64 -> 32 -> actions`
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ConvQNetwork {
    pub conv: Vec<Conv2DLayer>,
    pub fc: Vec<DenseLayer>,
    input_shape: Vec<usize>,
    grid: (usize, usize),
    feature_size: usize,
    num_actions: usize,
    device: Device,
    #[serde(skip)]
    cached_feature_dim: Option<(usize, usize, usize, usize)>,
}

impl ConvQNetwork {
    /// `input_shape` is `[height, width]` or `[1, height, width]`.
    pub fn new<R: Rng + ?Sized>(input_shape: &[usize], num_actions: usize, device: Device, rng: &mut R) -> Result<Self> {
        let grid = match input_shape {
            [h, w] | [1, h, w] => (*h, *w),
            _ => {
                return Err(DqnError::dimension_mismatch(
                    "[height, width] or [1, height, width]".to_string(),
                    format!("{:?}", input_shape),
                ))
            }
        };
        if num_actions == 0 {
            return Err(DqnError::invalid_parameter("num_actions", "at least one action is required"));
        }

        let conv = vec![
            Conv2DLayer::new(1, 32, (4, 4), (2, 2), (0, 0), Activation::Relu, rng)?,
            Conv2DLayer::new(32, 16, (3, 3), (1, 1), (0, 0), Activation::Relu, rng)?,
        ];

        // Probe the convolution stack with a zero grid instead of hardcoding its output size.
        let probe = Array4::<f32>::zeros((1, 1, grid.0, grid.1));
        let feature_size = conv
            .iter()
            .try_fold(probe, |x, layer| layer.predict(x.view()))?
            .len();

        let fc = q_head(feature_size, num_actions, rng)?;

        Ok(ConvQNetwork {
            conv,
            fc,
            input_shape: input_shape.to_vec(),
            grid,
            feature_size,
            num_actions,
            device,
            cached_feature_dim: None,
        })
    }

    /// Length of the flattened convolution output fed to the dense head.
    pub fn feature_size(&self) -> usize {
        self.feature_size
    }

    fn to_images(&self, states: &Tensor) -> Result<Array4<f32>> {
        let batch = check_batch(states, self.device, &self.input_shape)?;
        Ok(states
            .data
            .as_standard_layout()
            .into_owned()
            .into_shape((batch, 1, self.grid.0, self.grid.1))?)
    }

    fn flatten(features: Array4<f32>) -> Result<Array2<f32>> {
        let batch = features.shape()[0];
        let width = features.len() / batch;
        Ok(features.into_shape((batch, width))?)
    }
}

impl QNetwork for ConvQNetwork {
    fn forward(&self, states: &Tensor) -> Result<Array2<f32>> {
        let images = self.to_images(states)?;
        let features = self.conv.iter().try_fold(images, |x, layer| layer.predict(x.view()))?;
        head_predict(&self.fc, Self::flatten(features)?)
    }

    fn forward_train(&mut self, states: &Tensor) -> Result<Array2<f32>> {
        let images = self.to_images(states)?;
        let features = self
            .conv
            .iter_mut()
            .try_fold(images, |x, layer| layer.forward_batch(x.view()))?;
        self.cached_feature_dim = Some(features.dim());
        head_forward(&mut self.fc, Self::flatten(features)?)
    }

    fn backward(&mut self, output_grad: ArrayView2<f32>) -> Result<Gradients> {
        let feature_dim = self.cached_feature_dim.ok_or_else(|| {
            DqnError::NumericalError("forward_train() must be called before backward()".to_string())
        })?;

        let (feature_grad, head_grads) = head_backward(&self.fc, output_grad)?;
        let mut current: Array4<f32> = feature_grad.into_shape(feature_dim)?;

        let mut conv_grads = Vec::with_capacity(self.conv.len());
        for layer in self.conv.iter().rev() {
            let (input_grad, kernel_grad, bias_grad) = layer.backward_batch(current.view())?;
            conv_grads.push([kernel_grad.into_dyn(), bias_grad.into_dyn()]);
            current = input_grad;
        }
        conv_grads.reverse();

        Ok(conv_grads.into_iter().flatten().chain(head_grads).collect())
    }

    fn parameters(&self) -> Vec<ArrayViewD<'_, f32>> {
        self.conv
            .iter()
            .flat_map(|layer| layer.parameters())
            .chain(self.fc.iter().flat_map(|layer| layer.parameters()))
            .collect()
    }

    fn parameters_mut(&mut self) -> Vec<ArrayViewMutD<'_, f32>> {
        let ConvQNetwork { conv, fc, .. } = self;
        conv.iter_mut()
            .flat_map(|layer| layer.parameters_mut())
            .chain(fc.iter_mut().flat_map(|layer| layer.parameters_mut()))
            .collect()
    }

    fn device(&self) -> Device {
        self.device
    }

    fn num_actions(&self) -> usize {
        self.num_actions
    }

    fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn feature_size_follows_conv_arithmetic() {
        // 12 -> (12 - 4) / 2 + 1 = 5 -> 5 - 3 + 1 = 3, times 16 channels.
        let net = ConvQNetwork::new(&[12, 12], 10, Device::Cpu, &mut StdRng::seed_from_u64(0)).unwrap();
        assert_eq!(net.feature_size(), 16 * 3 * 3);

        let net = ConvQNetwork::new(&[1, 16, 10], 3, Device::Cpu, &mut StdRng::seed_from_u64(0)).unwrap();
        // 16 -> 7 -> 5, 10 -> 4 -> 2
        assert_eq!(net.feature_size(), 16 * 5 * 2);
    }

    #[test]
    fn grid_too_small_for_kernels_is_rejected() {
        assert!(ConvQNetwork::new(&[4, 4], 2, Device::Cpu, &mut StdRng::seed_from_u64(0)).is_err());
        assert!(ConvQNetwork::new(&[144], 2, Device::Cpu, &mut StdRng::seed_from_u64(0)).is_err());
    }

    #[test]
    fn gradients_line_up_with_parameters() {
        let mut net = ConvQNetwork::new(&[12, 12], 4, Device::Cpu, &mut StdRng::seed_from_u64(2)).unwrap();
        let states = Tensor::new(ArrayD::from_elem(IxDyn(&[2, 12, 12]), 1.0), Device::Cpu);
        let q = net.forward_train(&states).unwrap();
        let grads = net.backward(Array2::ones(q.dim()).view()).unwrap();

        let params = net.parameters();
        assert_eq!(grads.len(), params.len());
        for (g, p) in grads.iter().zip(params.iter()) {
            assert_eq!(g.shape(), p.shape());
        }
    }
}
