//! Activation functions selectable by name from configuration.

use std::fmt;
use std::str::FromStr;

use burn::tensor::activation::{gelu, leaky_relu, relu, sigmoid, silu, softplus};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const SELU_ALPHA: f32 = 1.673_263_2;
const SELU_SCALE: f32 = 1.050_701;
const LEAKY_RELU_SLOPE: f64 = 0.01;

/// Element-wise activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Elu,
    Selu,
    Relu,
    #[serde(alias = "leaky_relu")]
    Lrelu,
    Tanh,
    Sigmoid,
    Gelu,
    #[serde(alias = "swish")]
    Silu,
    Softplus,
    #[serde(alias = "none", alias = "linear")]
    Identity,
}

impl Activation {
    /// Apply to a tensor of any rank.
    pub fn apply<B: Backend, const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            Activation::Elu => elu(x, 1.0),
            Activation::Selu => elu(x, SELU_ALPHA) * SELU_SCALE,
            Activation::Relu => relu(x),
            Activation::Lrelu => leaky_relu(x, LEAKY_RELU_SLOPE),
            Activation::Tanh => x.tanh(),
            Activation::Sigmoid => sigmoid(x),
            Activation::Gelu => gelu(x),
            Activation::Silu => silu(x),
            Activation::Softplus => softplus(x, 1.0),
            Activation::Identity => x,
        }
    }
}

/// `max(0, x) + alpha * (exp(min(0, x)) - 1)`
fn elu<B: Backend, const D: usize>(x: Tensor<B, D>, alpha: f32) -> Tensor<B, D> {
    let negative = (x.clone().clamp_max(0.0).exp() - 1.0) * alpha;
    x.clamp_min(0.0) + negative
}

impl FromStr for Activation {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "elu" => Ok(Activation::Elu),
            "selu" => Ok(Activation::Selu),
            "relu" => Ok(Activation::Relu),
            "lrelu" | "leaky_relu" => Ok(Activation::Lrelu),
            "tanh" => Ok(Activation::Tanh),
            "sigmoid" => Ok(Activation::Sigmoid),
            "gelu" => Ok(Activation::Gelu),
            "silu" | "swish" => Ok(Activation::Silu),
            "softplus" => Ok(Activation::Softplus),
            "identity" | "linear" | "none" => Ok(Activation::Identity),
            other => Err(ConfigError::UnknownActivation(other.to_string())),
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Activation::Elu => "elu",
            Activation::Selu => "selu",
            Activation::Relu => "relu",
            Activation::Lrelu => "lrelu",
            Activation::Tanh => "tanh",
            Activation::Sigmoid => "sigmoid",
            Activation::Gelu => "gelu",
            Activation::Silu => "silu",
            Activation::Softplus => "softplus",
            Activation::Identity => "identity",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    fn apply(act: Activation, xs: [f32; 3]) -> Vec<f32> {
        let device = Default::default();
        act.apply(Tensor::<B, 1>::from_floats(xs, &device))
            .into_data()
            .to_vec::<f32>()
            .unwrap()
    }

    #[test]
    fn test_elu_values() {
        let out = apply(Activation::Elu, [-1.0, 0.0, 2.0]);
        assert!((out[0] - ((-1.0f32).exp() - 1.0)).abs() < 1e-6);
        assert_eq!(out[1], 0.0);
        assert_eq!(out[2], 2.0);
    }

    #[test]
    fn test_identity_and_relu() {
        assert_eq!(apply(Activation::Identity, [-1.0, 0.5, 3.0]), vec![-1.0, 0.5, 3.0]);
        assert_eq!(apply(Activation::Relu, [-1.0, 0.5, 3.0]), vec![0.0, 0.5, 3.0]);
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("elu".parse::<Activation>().unwrap(), Activation::Elu);
        assert_eq!("Tanh".parse::<Activation>().unwrap(), Activation::Tanh);
        assert_eq!("swish".parse::<Activation>().unwrap(), Activation::Silu);
        assert!("crelu".parse::<Activation>().is_err());
    }

    #[test]
    fn test_serde_names() {
        let act: Activation = serde_json::from_str("\"leaky_relu\"").unwrap();
        assert_eq!(act, Activation::Lrelu);
        assert_eq!(serde_json::to_string(&Activation::Elu).unwrap(), "\"elu\"");
    }
}
