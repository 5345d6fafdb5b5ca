//! Error types for policy construction and evaluation.
//!
//! Two families of failure exist:
//!
//! - [`ConfigError`]: raised while resolving a configuration into a model.
//!   These are never recovered from; a bad configuration aborts construction.
//! - [`ModelError`]: raised at call time when tensors do not line up with the
//!   shapes the model was built for (observation widths, hidden-state batch
//!   sizes, trajectory masks).

use thiserror::Error;

/// Invalid or incomplete policy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A field required by an enabled encoder branch is absent.
    #[error("{branch} branch: `{field}` is required when the encoder is enabled")]
    MissingField {
        branch: &'static str,
        field: &'static str,
    },

    /// A resolved segment width is zero or exceeds the observation width.
    #[error("{branch} branch: {segment} width {width} is invalid for observation dim {obs_dim}")]
    InvalidWidth {
        branch: &'static str,
        segment: &'static str,
        width: i64,
        obs_dim: usize,
    },

    /// A count parameter (dims, layers, sizes) must be positive.
    #[error("`{field}` must be > 0")]
    ZeroSized { field: &'static str },

    /// Activation name not recognised.
    #[error("unknown activation `{0}`")]
    UnknownActivation(String),

    /// Recurrent cell name not recognised.
    #[error("unknown recurrent cell type `{0}`")]
    UnknownRecurrentType(String),

    /// Noise std parameterisation not recognised.
    #[error("unknown noise std type `{0}`")]
    UnknownNoiseStdType(String),

    /// A CNN2d image shape does not cover the encoder input.
    #[error("cnn2d image shape {channels}x{height}x{width} does not match input dim {input_dim}")]
    ImageShapeMismatch {
        channels: usize,
        height: usize,
        width: usize,
        input_dim: usize,
    },

    /// Convolution stack shrinks the image below one pixel.
    #[error("cnn2d kernel {kernel_size} with stride {stride} collapses a {height}x{width} feature map")]
    ConvolutionTooDeep {
        kernel_size: usize,
        stride: usize,
        height: usize,
        width: usize,
    },

    /// An RNN encoder sequence length does not divide the encoder input.
    #[error("rnn sequence length {sequence_length} does not divide input dim {input_dim}")]
    SequenceMismatch {
        sequence_length: usize,
        input_dim: usize,
    },

    /// Configuration document could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    /// Configuration file could not be read.
    #[error("failed to read configuration file: {0}")]
    Io(String),
}

/// Shape mismatch detected while running the model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// A tensor dimension does not match what the model was built for.
    #[error("{context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Carried hidden state was built for a different number of environments.
    #[error("hidden state holds {stored} environments but input has {input}")]
    BatchMismatch { stored: usize, input: usize },

    /// A `dones` mask does not cover the carried hidden state.
    #[error("dones mask has {mask} entries but hidden state holds {stored} environments")]
    DonesMismatch { mask: usize, stored: usize },

    /// Trajectory masks do not describe the padded batch.
    #[error("invalid trajectory mask: {0}")]
    InvalidMask(String),

    /// Method needs an encoder branch that this model was built without.
    #[error("{0} branch has no encoder")]
    NoEncoder(&'static str),
}

/// Result alias for model calls.
pub type ModelResult<T> = Result<T, ModelError>;
