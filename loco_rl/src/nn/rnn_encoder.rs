//! Recurrent encoder over a fixed window of equal-width frames.
//!
//! The input `[batch, sequence_length * frame_dim]` holds `sequence_length`
//! frames back to back (oldest first). They are run through a recurrent cell
//! from a zero state and the final hidden state feeds an MLP head. Nothing is
//! carried between calls.

use burn::module::Module;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::activation::Activation;
use super::embedder::Embedder;
use super::mlp::{Mlp, MlpConfig};
use crate::core::recurrent::{MemoryCell, RecurrentCell, RecurrentCellType};
use crate::error::ConfigError;

#[derive(Debug, Clone)]
pub struct RnnEncoderConfig {
    pub input_dim: usize,
    pub sequence_length: usize,
    pub cell: RecurrentCellType,
    pub hidden_size: usize,
    pub hidden_dims: Vec<usize>,
    pub embedding_dim: usize,
    pub activation: Activation,
    pub final_activation: Option<Activation>,
}

impl RnnEncoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<RnnEncoder<B>, ConfigError> {
        if self.sequence_length == 0 || self.input_dim % self.sequence_length != 0 {
            return Err(ConfigError::SequenceMismatch {
                sequence_length: self.sequence_length,
                input_dim: self.input_dim,
            });
        }
        if self.hidden_size == 0 {
            return Err(ConfigError::ZeroSized { field: "rnn hidden_size" });
        }

        let frame_dim = self.input_dim / self.sequence_length;
        Ok(RnnEncoder {
            cell: self.cell.init(frame_dim, self.hidden_size, device),
            head: MlpConfig::new(self.hidden_size, self.hidden_dims.clone(), self.embedding_dim)
                .with_activation(self.activation)
                .with_final_activation(self.final_activation)
                .init(device),
            sequence_length: self.sequence_length,
            frame_dim,
        })
    }
}

#[derive(Module, Debug)]
pub struct RnnEncoder<B: Backend> {
    cell: MemoryCell<B>,
    head: Mlp<B>,
    #[module(skip)]
    sequence_length: usize,
    #[module(skip)]
    frame_dim: usize,
}

impl<B: Backend> Embedder<B> for RnnEncoder<B> {
    fn embed(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let [batch, _] = input.dims();
        let device = input.device();

        let frames: Tensor<B, 3> = input
            .reshape([batch, self.sequence_length, self.frame_dim])
            .swap_dims(0, 1);

        let (_, last) = self
            .cell
            .forward_sequence(frames, self.cell.initial_state(batch, &device));

        self.head.forward(last.hidden)
    }

    fn input_dim(&self) -> usize {
        self.sequence_length * self.frame_dim
    }

    fn embedding_dim(&self) -> usize {
        self.head.output_dim()
    }
}
