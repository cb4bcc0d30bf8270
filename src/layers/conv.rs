//! Convolutional layer for grid-shaped observations
//!
//! Tensors use the `[batch, channels, height, width]` layout.

use ndarray::{Array1, Array4, ArrayView4, ArrayViewD, ArrayViewMutD, s};
use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::activations::Activation;
use crate::error::{DqnError, Result};
use super::initialization::WeightInit;

/// 2D Convolutional Layer
///
/// Applies 2D convolution over an input signal composed of several input planes.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Conv2DLayer {
    /// Convolution kernels/filters [out_channels, in_channels, kernel_height, kernel_width]
    pub kernels: Array4<f32>,

    /// Bias terms for each output channel
    pub biases: Array1<f32>,

    pub activation: Activation,

    pub stride: (usize, usize),

    pub padding: (usize, usize),

    pub in_channels: usize,

    pub out_channels: usize,

    pub kernel_size: (usize, usize),

    /// Cached input for backward pass
    #[serde(skip)]
    cached_input: Option<Array4<f32>>,

    /// Cached pre-activation output
    #[serde(skip)]
    cached_pre_activation: Option<Array4<f32>>,
}

impl Conv2DLayer {
    pub fn new<R: Rng + ?Sized>(
        in_channels: usize,
        out_channels: usize,
        kernel_size: (usize, usize),
        stride: (usize, usize),
        padding: (usize, usize),
        activation: Activation,
        rng: &mut R,
    ) -> Result<Self> {
        if stride.0 == 0 || stride.1 == 0 {
            return Err(DqnError::invalid_parameter("stride", "stride must be positive"));
        }
        let fan_in = in_channels * kernel_size.0 * kernel_size.1;
        let fan_out = out_channels * kernel_size.0 * kernel_size.1;

        let kernels = WeightInit::for_activation(&activation).initialize(
            (out_channels, in_channels, kernel_size.0, kernel_size.1),
            fan_in,
            fan_out,
            rng,
        )?;

        Ok(Conv2DLayer {
            kernels,
            biases: Array1::zeros(out_channels),
            activation,
            stride,
            padding,
            in_channels,
            out_channels,
            kernel_size,
            cached_input: None,
            cached_pre_activation: None,
        })
    }

    /// Spatial output size for an input of `height x width`.
    pub fn output_hw(&self, height: usize, width: usize) -> Result<(usize, usize)> {
        let padded_h = height + 2 * self.padding.0;
        let padded_w = width + 2 * self.padding.1;
        if padded_h < self.kernel_size.0 || padded_w < self.kernel_size.1 {
            return Err(DqnError::dimension_mismatch(
                format!("input of at least {:?}", self.kernel_size),
                format!("{}x{} (padded {}x{})", height, width, padded_h, padded_w),
            ));
        }
        Ok((
            (padded_h - self.kernel_size.0) / self.stride.0 + 1,
            (padded_w - self.kernel_size.1) / self.stride.1 + 1,
        ))
    }

    fn check_input(&self, input: &ArrayView4<f32>) -> Result<()> {
        let channels = input.shape()[1];
        if channels != self.in_channels {
            return Err(DqnError::dimension_mismatch(
                format!("{} input channels", self.in_channels),
                format!("{}", channels),
            ));
        }
        Ok(())
    }

    /// Perform 2D convolution
    fn convolve2d(&self, input: ArrayView4<f32>) -> Result<Array4<f32>> {
        let (batch_size, _, in_height, in_width) = input.dim();
        let (out_height, out_width) = self.output_hw(in_height, in_width)?;

        let mut output = Array4::zeros((batch_size, self.out_channels, out_height, out_width));
        let padded_input = self.pad_input(input);

        for b in 0..batch_size {
            for oc in 0..self.out_channels {
                for oh in 0..out_height {
                    for ow in 0..out_width {
                        let h_start = oh * self.stride.0;
                        let w_start = ow * self.stride.1;

                        let mut sum = 0.0;
                        for ic in 0..self.in_channels {
                            for kh in 0..self.kernel_size.0 {
                                for kw in 0..self.kernel_size.1 {
                                    sum += padded_input[[b, ic, h_start + kh, w_start + kw]]
                                        * self.kernels[[oc, ic, kh, kw]];
                                }
                            }
                        }

                        output[[b, oc, oh, ow]] = sum + self.biases[oc];
                    }
                }
            }
        }

        Ok(output)
    }

    /// Pad input with zeros
    fn pad_input(&self, input: ArrayView4<f32>) -> Array4<f32> {
        if self.padding == (0, 0) {
            return input.to_owned();
        }
        let (batch_size, channels, height, width) = input.dim();
        let mut padded = Array4::zeros((
            batch_size,
            channels,
            height + 2 * self.padding.0,
            width + 2 * self.padding.1,
        ));
        padded
            .slice_mut(s![.., .., self.padding.0..self.padding.0 + height, self.padding.1..self.padding.1 + width])
            .assign(&input);
        padded
    }

    /// Forward pass without touching the backward cache.
    pub fn predict(&self, input: ArrayView4<f32>) -> Result<Array4<f32>> {
        self.check_input(&input)?;
        let mut output = self.convolve2d(input)?;
        self.activation.apply(&mut output);
        Ok(output)
    }

    /// Forward pass for batch of images [batch, channels, height, width]
    pub fn forward_batch(&mut self, input: ArrayView4<f32>) -> Result<Array4<f32>> {
        self.check_input(&input)?;
        let pre_activation = self.convolve2d(input)?;
        let mut output = pre_activation.clone();
        self.activation.apply(&mut output);

        self.cached_input = Some(input.to_owned());
        self.cached_pre_activation = Some(pre_activation);
        Ok(output)
    }

    /// Backward pass.
    ///
    /// Returns `(input_gradients, kernel_gradients, bias_gradients)`.
    pub fn backward_batch(&self, output_gradient: ArrayView4<f32>) -> Result<(Array4<f32>, Array4<f32>, Array1<f32>)> {
        let (input, pre_activation) = match (&self.cached_input, &self.cached_pre_activation) {
            (Some(input), Some(pre)) => (input, pre),
            _ => {
                return Err(DqnError::NumericalError(
                    "forward_batch() must be called before backward_batch()".to_string(),
                ))
            }
        };
        if output_gradient.dim() != pre_activation.dim() {
            return Err(DqnError::dimension_mismatch(
                format!("{:?}", pre_activation.dim()),
                format!("{:?}", output_gradient.dim()),
            ));
        }

        let grad = &output_gradient * &self.activation.derivative(pre_activation);

        let padded_input = self.pad_input(input.view());
        let kernel_gradients = self.compute_kernel_gradients(&padded_input, &grad);
        let bias_gradients = self.compute_bias_gradients(&grad);
        let input_gradients = self.compute_input_gradients(&grad, input.dim());

        Ok((input_gradients, kernel_gradients, bias_gradients))
    }

    fn compute_kernel_gradients(&self, padded_input: &Array4<f32>, grad_output: &Array4<f32>) -> Array4<f32> {
        let mut kernel_grads = Array4::zeros(self.kernels.dim());
        let (batch_size, _, out_height, out_width) = grad_output.dim();

        for oc in 0..self.out_channels {
            for ic in 0..self.in_channels {
                for kh in 0..self.kernel_size.0 {
                    for kw in 0..self.kernel_size.1 {
                        let mut sum = 0.0;
                        for b in 0..batch_size {
                            for oh in 0..out_height {
                                for ow in 0..out_width {
                                    sum += padded_input[[b, ic, oh * self.stride.0 + kh, ow * self.stride.1 + kw]]
                                        * grad_output[[b, oc, oh, ow]];
                                }
                            }
                        }
                        kernel_grads[[oc, ic, kh, kw]] = sum;
                    }
                }
            }
        }

        kernel_grads
    }

    fn compute_bias_gradients(&self, grad_output: &Array4<f32>) -> Array1<f32> {
        Array1::from_shape_fn(self.out_channels, |oc| grad_output.slice(s![.., oc, .., ..]).sum())
    }

    /// Transpose convolution back onto the (unpadded) input shape.
    fn compute_input_gradients(&self, grad_output: &Array4<f32>, input_dim: (usize, usize, usize, usize)) -> Array4<f32> {
        let (batch_size, _, in_height, in_width) = input_dim;
        let (_, _, out_height, out_width) = grad_output.dim();

        // Rows/cols the strided window never reached keep a zero gradient.
        let mut grad_input_padded = Array4::zeros((
            batch_size,
            self.in_channels,
            in_height + 2 * self.padding.0,
            in_width + 2 * self.padding.1,
        ));

        for b in 0..batch_size {
            for oc in 0..self.out_channels {
                for oh in 0..out_height {
                    for ow in 0..out_width {
                        let g = grad_output[[b, oc, oh, ow]];
                        if g == 0.0 {
                            continue;
                        }
                        for ic in 0..self.in_channels {
                            for kh in 0..self.kernel_size.0 {
                                for kw in 0..self.kernel_size.1 {
                                    grad_input_padded[[b, ic, oh * self.stride.0 + kh, ow * self.stride.1 + kw]] +=
                                        g * self.kernels[[oc, ic, kh, kw]];
                                }
                            }
                        }
                    }
                }
            }
        }

        if self.padding == (0, 0) {
            grad_input_padded
        } else {
            grad_input_padded
                .slice(s![.., .., self.padding.0..self.padding.0 + in_height, self.padding.1..self.padding.1 + in_width])
                .to_owned()
        }
    }

    pub fn parameters(&self) -> Vec<ArrayViewD<'_, f32>> {
        vec![self.kernels.view().into_dyn(), self.biases.view().into_dyn()]
    }

    pub fn parameters_mut(&mut self) -> Vec<ArrayViewMutD<'_, f32>> {
        vec![self.kernels.view_mut().into_dyn(), self.biases.view_mut().into_dyn()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(11)
    }

    #[test]
    fn test_conv2d_forward_shape() {
        let mut layer = Conv2DLayer::new(1, 32, (4, 4), (2, 2), (0, 0), Activation::Relu, &mut rng()).unwrap();

        let input = Array4::<f32>::zeros((3, 1, 12, 12));
        let output = layer.forward_batch(input.view()).unwrap();
        assert_eq!(output.dim(), (3, 32, 5, 5));
    }

    #[test]
    fn test_padding_keeps_spatial_size() {
        let layer = Conv2DLayer::new(1, 2, (3, 3), (1, 1), (1, 1), Activation::Relu, &mut rng()).unwrap();
        let input = Array4::from_shape_fn((1, 1, 4, 4), |(_, _, h, w)| (h * 4 + w) as f32);
        assert_eq!(layer.predict(input.view()).unwrap().dim(), (1, 2, 4, 4));
    }

    #[test]
    fn test_input_gradient_matches_input_shape_with_uneven_stride() {
        // (11 - 4) / 2 + 1 = 4 windows; the last input column is never covered.
        let mut layer = Conv2DLayer::new(1, 2, (4, 4), (2, 2), (0, 0), Activation::Linear, &mut rng()).unwrap();
        let input = Array4::from_elem((2, 1, 11, 11), 1.0);
        let output = layer.forward_batch(input.view()).unwrap();
        let (input_grad, kernel_grad, bias_grad) =
            layer.backward_batch(Array4::ones(output.dim()).view()).unwrap();

        assert_eq!(input_grad.dim(), (2, 1, 11, 11));
        assert_eq!(input_grad[[0, 0, 10, 10]], 0.0);
        assert_eq!(kernel_grad.dim(), (2, 1, 4, 4));
        // Every output cell contributes 1 to each channel bias: 2 batches * 4 * 4 cells.
        assert_eq!(bias_grad[0], 32.0);
    }

    #[test]
    fn test_kernel_gradient_matches_finite_difference() {
        let mut layer = Conv2DLayer::new(1, 1, (2, 2), (1, 1), (0, 0), Activation::Linear, &mut rng()).unwrap();
        let input = Array4::from_shape_fn((1, 1, 3, 3), |(_, _, h, w)| (h as f32) - 0.5 * w as f32);

        let output = layer.forward_batch(input.view()).unwrap();
        let (_, kernel_grad, _) = layer.backward_batch(Array4::ones(output.dim()).view()).unwrap();

        let eps = 1e-2;
        let base = layer.predict(input.view()).unwrap().sum();
        layer.kernels[[0, 0, 1, 0]] += eps;
        let bumped = layer.predict(input.view()).unwrap().sum();
        let numeric = (bumped - base) / eps;
        assert!((numeric - kernel_grad[[0, 0, 1, 0]]).abs() < 1e-2);
    }

    #[test]
    fn test_wrong_channel_count_is_rejected() {
        let layer = Conv2DLayer::new(1, 2, (3, 3), (1, 1), (0, 0), Activation::Relu, &mut rng()).unwrap();
        let input = Array4::<f32>::zeros((1, 3, 5, 5));
        assert!(layer.predict(input.view()).is_err());
    }
}
