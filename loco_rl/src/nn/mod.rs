//! Network building blocks for the actor-critic models.
//!
//! - [`mlp`]: feed-forward stacks used for backbones, heads and embedders
//! - [`embedder`]: the [`Embedder`] capability and architecture factory
//! - [`cnn`] / [`rnn_encoder`]: image and frame-sequence encoders
//! - [`memory`]: stacked GRU/LSTM memory with caller-owned state
//! - [`activation`]: activations selectable by name

pub mod activation;
pub mod cnn;
pub mod embedder;
pub mod memory;
pub mod mlp;
pub mod rnn_encoder;

pub use activation::Activation;
pub use cnn::{Cnn2dEncoder, Cnn2dEncoderConfig};
pub use embedder::{Embedder, EmbedderConfig, EncoderArchitecture, ModalityEncoder};
pub use memory::{Memory, MemoryConfig};
pub use mlp::{Mlp, MlpConfig};
pub use rnn_encoder::{RnnEncoder, RnnEncoderConfig};
