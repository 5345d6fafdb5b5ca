//! Embedding capability and the factory that picks an encoder architecture.
//!
//! Every stage that turns a feature vector into a fixed-size embedding
//! (pre-encoders and modality encoders) implements [`Embedder`]. The concrete
//! architecture is chosen once, when [`EmbedderConfig::init`] builds a
//! [`ModalityEncoder`], from the configured [`EncoderArchitecture`]:
//!
//! | architecture | input interpretation                          |
//! |--------------|-----------------------------------------------|
//! | `mlp`        | flat feature vector                           |
//! | `cnn2d`      | `channels x height x width` image, row-major  |
//! | `rnn`        | `sequence_length` frames of equal width       |

use burn::module::Module;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

use super::activation::Activation;
use super::cnn::{Cnn2dEncoder, Cnn2dEncoderConfig};
use super::mlp::{Mlp, MlpConfig};
use super::rnn_encoder::{RnnEncoder, RnnEncoderConfig};
use crate::core::recurrent::RecurrentCellType;
use crate::error::ConfigError;

/// Maps `[batch, input_dim]` to `[batch, embedding_dim]`.
pub trait Embedder<B: Backend> {
    fn embed(&self, input: Tensor<B, 2>) -> Tensor<B, 2>;

    fn input_dim(&self) -> usize;

    fn embedding_dim(&self) -> usize;

    /// Embed a time-major batch `[time, batch, input_dim]`.
    fn embed_sequence(&self, input: Tensor<B, 3>) -> Tensor<B, 3> {
        let [time, batch, features] = input.dims();
        self.embed(input.reshape([time * batch, features]))
            .reshape([time, batch, self.embedding_dim()])
    }
}

fn default_conv_channels() -> Vec<usize> {
    vec![16, 32]
}

fn default_kernel_size() -> usize {
    3
}

fn default_stride() -> usize {
    1
}

/// Encoder architecture selected by configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EncoderArchitecture {
    /// Plain feed-forward network.
    #[default]
    Mlp,
    /// Convolutions over an image-shaped input, then an MLP head.
    Cnn2d {
        channels: usize,
        height: usize,
        width: usize,
        #[serde(default = "default_conv_channels")]
        conv_channels: Vec<usize>,
        #[serde(default = "default_kernel_size")]
        kernel_size: usize,
        #[serde(default = "default_stride")]
        stride: usize,
    },
    /// Recurrent pass over equal-width frames, then an MLP head.
    Rnn {
        sequence_length: usize,
        #[serde(default)]
        cell: RecurrentCellType,
        hidden_size: usize,
    },
}

/// Hyperparameters for one embedding stage.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbedderConfig {
    pub hidden_dims: Vec<usize>,
    pub embedding_dim: usize,
    pub activation: Activation,
    pub final_activation: Option<Activation>,
    pub architecture: EncoderArchitecture,
}

impl EmbedderConfig {
    pub fn new(hidden_dims: Vec<usize>, embedding_dim: usize) -> Self {
        Self {
            hidden_dims,
            embedding_dim,
            activation: Activation::default(),
            final_activation: None,
            architecture: EncoderArchitecture::default(),
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

    pub fn with_architecture(mut self, architecture: EncoderArchitecture) -> Self {
        self.architecture = architecture;
        self
    }

    /// Build the encoder for an input of `input_dim` features.
    pub fn init<B: Backend>(
        &self,
        input_dim: usize,
        device: &B::Device,
    ) -> Result<ModalityEncoder<B>, ConfigError> {
        if input_dim == 0 {
            return Err(ConfigError::ZeroSized { field: "encoder input dim" });
        }
        if self.embedding_dim == 0 {
            return Err(ConfigError::ZeroSized { field: "embedding_dim" });
        }

        let encoder = match &self.architecture {
            EncoderArchitecture::Mlp => ModalityEncoder::Mlp(
                MlpConfig::new(input_dim, self.hidden_dims.clone(), self.embedding_dim)
                    .with_activation(self.activation)
                    .with_final_activation(self.final_activation)
                    .init(device),
            ),
            EncoderArchitecture::Cnn2d {
                channels,
                height,
                width,
                conv_channels,
                kernel_size,
                stride,
            } => ModalityEncoder::Cnn2d(
                Cnn2dEncoderConfig {
                    input_dim,
                    channels: *channels,
                    height: *height,
                    width: *width,
                    conv_channels: conv_channels.clone(),
                    kernel_size: *kernel_size,
                    stride: *stride,
                    hidden_dims: self.hidden_dims.clone(),
                    embedding_dim: self.embedding_dim,
                    activation: self.activation,
                    final_activation: self.final_activation,
                }
                .init(device)?,
            ),
            EncoderArchitecture::Rnn {
                sequence_length,
                cell,
                hidden_size,
            } => ModalityEncoder::Rnn(
                RnnEncoderConfig {
                    input_dim,
                    sequence_length: *sequence_length,
                    cell: *cell,
                    hidden_size: *hidden_size,
                    hidden_dims: self.hidden_dims.clone(),
                    embedding_dim: self.embedding_dim,
                    activation: self.activation,
                    final_activation: self.final_activation,
                }
                .init(device)?,
            ),
        };

        Ok(encoder)
    }
}

/// An embedding stage of the architecture picked by [`EmbedderConfig`].
#[derive(Module, Debug)]
pub enum ModalityEncoder<B: Backend> {
    Mlp(Mlp<B>),
    Cnn2d(Cnn2dEncoder<B>),
    Rnn(RnnEncoder<B>),
}

impl<B: Backend> ModalityEncoder<B> {
    /// Short architecture name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ModalityEncoder::Mlp(_) => "mlp",
            ModalityEncoder::Cnn2d(_) => "cnn2d",
            ModalityEncoder::Rnn(_) => "rnn",
        }
    }
}

impl<B: Backend> Embedder<B> for ModalityEncoder<B> {
    fn embed(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        match self {
            ModalityEncoder::Mlp(m) => m.embed(input),
            ModalityEncoder::Cnn2d(m) => m.embed(input),
            ModalityEncoder::Rnn(m) => m.embed(input),
        }
    }

    fn input_dim(&self) -> usize {
        match self {
            ModalityEncoder::Mlp(m) => m.input_dim(),
            ModalityEncoder::Cnn2d(m) => Embedder::input_dim(m),
            ModalityEncoder::Rnn(m) => Embedder::input_dim(m),
        }
    }

    fn embedding_dim(&self) -> usize {
        match self {
            ModalityEncoder::Mlp(m) => m.output_dim(),
            ModalityEncoder::Cnn2d(m) => m.embedding_dim(),
            ModalityEncoder::Rnn(m) => m.embedding_dim(),
        }
    }
}
