use ndarray::{Array2, ArrayView2, ArrayViewD, ArrayViewMutD};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::device::{Device, Tensor};
use crate::error::{DqnError, Result};
use crate::layers::DenseLayer;
use super::{check_batch, head_backward, head_forward, head_predict, q_head, Gradients, QNetwork};

/// Fully-connected Q-network: `input_dim -> 64 -> 32 -> actions`.
///
/// Observations of any shape are flattened row-major, so `input_dim` is the product of
/// `input_shape`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DenseQNetwork {
    pub fc: Vec<DenseLayer>,
    input_shape: Vec<usize>,
    input_dim: usize,
    num_actions: usize,
    device: Device,
}

impl DenseQNetwork {
    pub fn new<R: Rng + ?Sized>(input_shape: &[usize], num_actions: usize, device: Device, rng: &mut R) -> Result<Self> {
        let input_dim: usize = input_shape.iter().product();
        if input_shape.is_empty() || input_dim == 0 {
            return Err(DqnError::invalid_parameter(
                "input_shape".to_string(),
                format!("{:?} has no features", input_shape),
            ));
        }
        if num_actions == 0 {
            return Err(DqnError::invalid_parameter("num_actions", "at least one action is required"));
        }

        Ok(DenseQNetwork {
            fc: q_head(input_dim, num_actions, rng)?,
            input_shape: input_shape.to_vec(),
            input_dim,
            num_actions,
            device,
        })
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    fn to_rows(&self, states: &Tensor) -> Result<Array2<f32>> {
        let batch = check_batch(states, self.device, &self.input_shape)?;
        Ok(states
            .data
            .as_standard_layout()
            .into_owned()
            .into_shape((batch, self.input_dim))?)
    }
}

impl QNetwork for DenseQNetwork {
    fn forward(&self, states: &Tensor) -> Result<Array2<f32>> {
        head_predict(&self.fc, self.to_rows(states)?)
    }

    fn forward_train(&mut self, states: &Tensor) -> Result<Array2<f32>> {
        let rows = self.to_rows(states)?;
        head_forward(&mut self.fc, rows)
    }

    fn backward(&mut self, output_grad: ArrayView2<f32>) -> Result<Gradients> {
        let (_, grads) = head_backward(&self.fc, output_grad)?;
        Ok(grads)
    }

    fn parameters(&self) -> Vec<ArrayViewD<'_, f32>> {
        self.fc.iter().flat_map(|layer| layer.parameters()).collect()
    }

    fn parameters_mut(&mut self) -> Vec<ArrayViewMutD<'_, f32>> {
        self.fc.iter_mut().flat_map(|layer| layer.parameters_mut()).collect()
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
