//! Multi-layer perceptron with configurable hidden sizes and activations.

use burn::module::{Ignored, Module};
use burn::nn::{Linear, LinearConfig};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::activation::Activation;
use super::embedder::Embedder;

/// Configuration for [`Mlp`].
#[derive(Debug, Clone)]
pub struct MlpConfig {
    pub input_dim: usize,
    /// Hidden layer widths, e.g. `[512, 256, 128]`.
    pub hidden_dims: Vec<usize>,
    pub output_dim: usize,
    /// Applied after every hidden layer.
    pub activation: Activation,
    /// Applied after the output layer; `None` leaves it linear.
    pub final_activation: Option<Activation>,
}

impl MlpConfig {
    pub fn new(input_dim: usize, hidden_dims: Vec<usize>, output_dim: usize) -> Self {
        Self {
            input_dim,
            hidden_dims,
            output_dim,
            activation: Activation::default(),
            final_activation: None,
        }
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_final_activation(mut self, activation: Option<Activation>) -> Self {
        self.final_activation = activation;
        self
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Mlp<B> {
        let widths: Vec<usize> = std::iter::once(self.input_dim)
            .chain(self.hidden_dims.iter().copied())
            .chain(std::iter::once(self.output_dim))
            .collect();

        let layers = widths
            .windows(2)
            .map(|pair| LinearConfig::new(pair[0], pair[1]).init(device))
            .collect();

        Mlp {
            layers,
            activation: Ignored(self.activation),
            final_activation: Ignored(self.final_activation),
            input_dim: self.input_dim,
            output_dim: self.output_dim,
        }
    }
}

/// Feed-forward network; the last axis is the feature axis.
#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    layers: Vec<Linear<B>>,
    activation: Ignored<Activation>,
    final_activation: Ignored<Option<Activation>>,
    #[module(skip)]
    input_dim: usize,
    #[module(skip)]
    output_dim: usize,
}

impl<B: Backend> Mlp<B> {
    pub fn forward<const D: usize>(&self, input: Tensor<B, D>) -> Tensor<B, D> {
        let last = self.layers.len().saturating_sub(1);
        let mut x = input;

        for (i, layer) in self.layers.iter().enumerate() {
            x = layer.forward(x);
            if i < last {
                x = self.activation.apply(x);
            } else if let Some(final_activation) = *self.final_activation {
                x = final_activation.apply(x);
            }
        }

        x
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }
}

impl<B: Backend> Embedder<B> for Mlp<B> {
    fn embed(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        self.forward(input)
    }

    fn input_dim(&self) -> usize {
        self.input_dim
    }

    fn embedding_dim(&self) -> usize {
        self.output_dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn test_layer_count_and_shapes() {
        let device = Default::default();
        let mlp = MlpConfig::new(10, vec![32, 16], 4).init::<B>(&device);
        assert_eq!(mlp.num_layers(), 3);

        let out = mlp.forward(Tensor::<B, 2>::zeros([5, 10], &device));
        assert_eq!(out.dims(), [5, 4]);

        let out = mlp.forward(Tensor::<B, 3>::zeros([2, 5, 10], &device));
        assert_eq!(out.dims(), [2, 5, 4]);
    }

    #[test]
    fn test_no_hidden_layers_is_single_linear() {
        let device = Default::default();
        let mlp = MlpConfig::new(3, vec![], 2).init::<B>(&device);
        assert_eq!(mlp.num_layers(), 1);
    }

    #[test]
    fn test_final_activation_bounds_output() {
        let device = Default::default();
        let mlp = MlpConfig::new(4, vec![8], 6)
            .with_final_activation(Some(Activation::Tanh))
            .init::<B>(&device);

        let input = Tensor::<B, 2>::ones([3, 4], &device) * 100.0;
        let out = mlp.embed(input).into_data().to_vec::<f32>().unwrap();
        assert!(out.iter().all(|v| v.abs() <= 1.0));
        assert_eq!(mlp.embedding_dim(), 6);
    }
}
