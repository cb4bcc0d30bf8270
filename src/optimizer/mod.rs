use ndarray::{ArrayD, ArrayViewMutD};
use serde::{Serialize, Deserialize};

use crate::error::{DqnError, Result};

/// Applies one parameter update from a set of gradients.
///
/// `params` and `gradients` are parallel: entry `i` of one belongs to entry `i` of the other,
/// and the order must stay the same from one call to the next so per-parameter state lines up.
pub trait Optimizer {
    fn step(&mut self, params: Vec<ArrayViewMutD<'_, f32>>, gradients: &[ArrayD<f32>], learning_rate: f32) -> Result<()>;
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub enum OptimizerWrapper {
    SGD(SGD),
    Adam(Adam),
}

impl Optimizer for OptimizerWrapper {
    fn step(&mut self, params: Vec<ArrayViewMutD<'_, f32>>, gradients: &[ArrayD<f32>], learning_rate: f32) -> Result<()> {
        match self {
            OptimizerWrapper::SGD(optimizer) => optimizer.step(params, gradients, learning_rate),
            OptimizerWrapper::Adam(optimizer) => optimizer.step(params, gradients, learning_rate),
        }
    }
}

fn check_pairs(params: &[ArrayViewMutD<'_, f32>], gradients: &[ArrayD<f32>]) -> Result<()> {
    if params.len() != gradients.len() {
        return Err(DqnError::dimension_mismatch(
            format!("{} gradient tensors", params.len()),
            format!("{}", gradients.len()),
        ));
    }
    for (p, g) in params.iter().zip(gradients) {
        if p.shape() != g.shape() {
            return Err(DqnError::dimension_mismatch(
                format!("{:?}", p.shape()),
                format!("{:?}", g.shape()),
            ));
        }
    }
    Ok(())
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct SGD;

impl SGD {
    pub fn new() -> SGD {
        SGD
    }
}

impl Optimizer for SGD {
    fn step(&mut self, params: Vec<ArrayViewMutD<'_, f32>>, gradients: &[ArrayD<f32>], learning_rate: f32) -> Result<()> {
        check_pairs(&params, gradients)?;
        for (mut p, g) in params.into_iter().zip(gradients) {
            p.zip_mut_with(g, |w, &g| *w -= learning_rate * g);
        }
        Ok(())
    }
}

/// Adam with bias-corrected first and second moment estimates.
///
/// Moment buffers are allocated on the first step, one per parameter tensor.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Adam {
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    m: Vec<ArrayD<f32>>,
    v: Vec<ArrayD<f32>>,
    pub t: i32,
}

impl Adam {
    pub fn new(beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Adam {
            beta1,
            beta2,
            epsilon,
            m: Vec::new(),
            v: Vec::new(),
            t: 0,
        }
    }

    fn ensure_state(&mut self, params: &[ArrayViewMutD<'_, f32>]) -> Result<()> {
        if self.m.is_empty() {
            self.m = params.iter().map(|p| ArrayD::zeros(p.raw_dim())).collect();
            self.v = params.iter().map(|p| ArrayD::zeros(p.raw_dim())).collect();
            return Ok(());
        }
        if self.m.len() != params.len() || self.m.iter().zip(params).any(|(m, p)| m.shape() != p.shape()) {
            return Err(DqnError::invalid_parameter(
                "params",
                "parameter set changed since the optimizer was attached",
            ));
        }
        Ok(())
    }
}

impl Default for Adam {
    fn default() -> Self {
        Self::new(0.9, 0.999, 1e-8)
    }
}

impl Optimizer for Adam {
    fn step(&mut self, params: Vec<ArrayViewMutD<'_, f32>>, gradients: &[ArrayD<f32>], learning_rate: f32) -> Result<()> {
        check_pairs(&params, gradients)?;
        self.ensure_state(&params)?;

        self.t += 1;
        let bias1 = 1.0 - self.beta1.powi(self.t);
        let bias2 = 1.0 - self.beta2.powi(self.t);
        let (beta1, beta2, epsilon) = (self.beta1, self.beta2, self.epsilon);

        for (((mut p, g), m), v) in params.into_iter().zip(gradients).zip(&mut self.m).zip(&mut self.v) {
            m.zip_mut_with(g, |m, &g| *m = beta1 * *m + (1.0 - beta1) * g);
            v.zip_mut_with(g, |v, &g| *v = beta2 * *v + (1.0 - beta2) * g * g);

            ndarray::Zip::from(&mut p).and(&*m).and(&*v).for_each(|w, &m, &v| {
                let m_hat = m / bias1;
                let v_hat = v / bias2;
                *w -= learning_rate * m_hat / (v_hat.sqrt() + epsilon);
            });
        }
        Ok(())
    }
}
