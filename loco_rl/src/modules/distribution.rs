//! Diagonal Gaussian action distribution.
//!
//! Independent Gaussian per action dimension, parameterised by a batch of
//! means and a matching batch of standard deviations. Log probabilities and
//! entropies are summed over the action axis:
//!
//! ```text
//! log π(a|s) = Σ_i [ -0.5 ((a_i - μ_i) / σ_i)² - ln σ_i - 0.5 ln(2π) ]
//! H(π)       = Σ_i [ 0.5 (1 + ln(2π)) + ln σ_i ]
//! ```

use burn::tensor::backend::Backend;
use burn::tensor::{Distribution, Tensor};

/// Per-sample Gaussian over `[batch, num_actions]` actions.
#[derive(Debug, Clone)]
pub struct DiagonalGaussian<B: Backend> {
    mean: Tensor<B, 2>,
    std: Tensor<B, 2>,
}

impl<B: Backend> DiagonalGaussian<B> {
    /// `std` must be strictly positive and the same shape as `mean`.
    pub fn new(mean: Tensor<B, 2>, std: Tensor<B, 2>) -> Self {
        Self { mean, std }
    }

    pub fn mean(&self) -> Tensor<B, 2> {
        self.mean.clone()
    }

    pub fn stddev(&self) -> Tensor<B, 2> {
        self.std.clone()
    }

    pub fn batch_size(&self) -> usize {
        self.mean.dims()[0]
    }

    pub fn num_actions(&self) -> usize {
        self.mean.dims()[1]
    }

    /// Reparameterised sample: `mean + std * ε`, `ε ~ N(0, 1)`.
    pub fn sample(&self) -> Tensor<B, 2> {
        let noise = Tensor::random(self.mean.dims(), Distribution::Normal(0.0, 1.0), &self.mean.device());
        self.mean.clone() + self.std.clone() * noise
    }

    /// Log probability of `actions`, summed over actions: `[batch]`.
    pub fn log_prob(&self, actions: Tensor<B, 2>) -> Tensor<B, 1> {
        let log_2pi = (2.0 * std::f32::consts::PI).ln();
        let normalized = (actions - self.mean.clone()) / self.std.clone();
        let per_dim = normalized.powf_scalar(2.0) * -0.5 - self.std.clone().log() - 0.5 * log_2pi;
        per_dim.sum_dim(1).flatten(0, 1)
    }

    /// Analytical entropy, summed over actions: `[batch]`.
    pub fn entropy(&self) -> Tensor<B, 1> {
        let constant = 0.5 * (1.0 + (2.0 * std::f32::consts::PI).ln());
        (self.std.clone().log() + constant).sum_dim(1).flatten(0, 1)
    }
}
