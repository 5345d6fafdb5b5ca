//! Recurrent cells used by the memory stage of an encoder branch.
//!
//! Provides a single-step [`RecurrentCell`] contract implemented by a GRU
//! (built from linear layers, Burn has no GRU cell) and a wrapper around
//! Burn's LSTM. [`MemoryCell`] erases the concrete cell so the cell type can
//! be chosen from configuration at construction.

use std::fmt;
use std::str::FromStr;

use burn::module::Module;
use burn::nn::{Linear, LinearConfig, Lstm, LstmConfig, LstmState};
use burn::tensor::activation::sigmoid;
use burn::tensor::backend::Backend;
use burn::tensor::{Bool, Tensor, TensorData};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ============================================================================
// Hidden State
// ============================================================================

/// Hidden state of one recurrent layer for a batch of environments.
///
/// `hidden` is `[batch, hidden_size]`; `cell` holds the LSTM cell state with
/// the same shape and is `None` for GRU.
#[derive(Debug, Clone)]
pub struct HiddenState<B: Backend> {
    /// Primary hidden state (h for both LSTM and GRU).
    pub hidden: Tensor<B, 2>,
    /// Cell state (c for LSTM, None for GRU).
    pub cell: Option<Tensor<B, 2>>,
}

impl<B: Backend> HiddenState<B> {
    /// LSTM-style state with both hidden and cell.
    pub fn lstm(hidden: Tensor<B, 2>, cell: Tensor<B, 2>) -> Self {
        Self {
            hidden,
            cell: Some(cell),
        }
    }

    /// GRU-style state with only hidden.
    pub fn gru(hidden: Tensor<B, 2>) -> Self {
        Self { hidden, cell: None }
    }

    /// Zero state for `batch_size` environments.
    pub fn zeros(batch_size: usize, hidden_size: usize, has_cell: bool, device: &B::Device) -> Self {
        let hidden = Tensor::zeros([batch_size, hidden_size], device);
        if has_cell {
            Self::lstm(hidden, Tensor::zeros([batch_size, hidden_size], device))
        } else {
            Self::gru(hidden)
        }
    }

    pub fn h(&self) -> &Tensor<B, 2> {
        &self.hidden
    }

    pub fn c(&self) -> Option<&Tensor<B, 2>> {
        self.cell.as_ref()
    }

    /// Number of environments this state covers.
    pub fn batch_size(&self) -> usize {
        self.hidden.dims()[0]
    }

    /// Zero the rows flagged in `dones` (one flag per row).
    ///
    /// Rows are overwritten, not scaled, so non-finite values are cleared too.
    pub fn cleared(&self, dones: &[bool]) -> Self {
        let [batch, hidden] = self.hidden.dims();
        let flags: Vec<bool> = dones
            .iter()
            .flat_map(|&done| std::iter::repeat(done).take(hidden))
            .collect();
        let mask = Tensor::<B, 2, Bool>::from_data(TensorData::new(flags, [batch, hidden]), &self.hidden.device());

        Self {
            hidden: self.hidden.clone().mask_fill(mask.clone(), 0.0),
            cell: self.cell.clone().map(|c| c.mask_fill(mask, 0.0)),
        }
    }

    /// Rows of this state at the given environment indices.
    pub fn select(&self, indices: Tensor<B, 1, burn::tensor::Int>) -> Self {
        Self {
            hidden: self.hidden.clone().select(0, indices.clone()),
            cell: self.cell.clone().map(|c| c.select(0, indices)),
        }
    }

    /// Same values with the autodiff graph cut.
    pub fn detach(&self) -> Self {
        Self {
            hidden: self.hidden.clone().detach(),
            cell: self.cell.clone().map(|c| c.detach()),
        }
    }
}

// ============================================================================
// RecurrentCell Trait
// ============================================================================

/// Single-step recurrent cell.
pub trait RecurrentCell<B: Backend>: Module<B> + Clone + Send + 'static {
    /// Process one timestep.
    ///
    /// # Arguments
    /// * `input` - Input tensor [batch, input_size]
    /// * `state` - Current hidden state
    ///
    /// # Returns
    /// * `output` - Output tensor [batch, hidden_size]
    /// * `new_state` - Updated hidden state
    fn step(&self, input: Tensor<B, 2>, state: &HiddenState<B>) -> (Tensor<B, 2>, HiddenState<B>);

    /// Zero hidden state for the given batch size.
    fn initial_state(&self, batch_size: usize, device: &B::Device) -> HiddenState<B> {
        HiddenState::zeros(batch_size, self.hidden_size(), self.has_cell_state(), device)
    }

    fn hidden_size(&self) -> usize;

    fn input_size(&self) -> usize;

    /// Whether this cell carries a cell state (LSTM) or only hidden (GRU).
    fn has_cell_state(&self) -> bool;

    /// Run a time-major sequence.
    ///
    /// # Arguments
    /// * `input_seq` - Input tensor [seq_len, batch, input_size]
    /// * `initial_state` - Hidden state before the first step
    ///
    /// # Returns
    /// * `outputs` - Output tensor [seq_len, batch, hidden_size]
    /// * `final_state` - Hidden state after the last step
    fn forward_sequence(
        &self,
        input_seq: Tensor<B, 3>,
        initial_state: HiddenState<B>,
    ) -> (Tensor<B, 3>, HiddenState<B>) {
        let [seq_len, batch_size, input_size] = input_seq.dims();

        let mut outputs = Vec::with_capacity(seq_len);
        let mut state = initial_state;

        for t in 0..seq_len {
            let input_t = input_seq
                .clone()
                .slice([t..t + 1, 0..batch_size, 0..input_size])
                .reshape([batch_size, input_size]);

            let (output_t, new_state) = self.step(input_t, &state);
            outputs.push(output_t.unsqueeze_dim::<3>(0));
            state = new_state;
        }

        (Tensor::cat(outputs, 0), state)
    }
}

// ============================================================================
// LSTM
// ============================================================================

/// Configuration for the LSTM cell wrapper.
#[derive(Debug, Clone)]
pub struct LstmCellConfig {
    pub d_input: usize,
    pub d_hidden: usize,
    pub bias: bool,
}

impl LstmCellConfig {
    pub fn new(d_input: usize, d_hidden: usize) -> Self {
        Self {
            d_input,
            d_hidden,
            bias: true,
        }
    }

    pub fn with_bias(mut self, bias: bool) -> Self {
        self.bias = bias;
        self
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> LstmCellWrapper<B> {
        LstmCellWrapper {
            lstm: LstmConfig::new(self.d_input, self.d_hidden, self.bias).init(device),
            d_input: self.d_input,
            d_hidden: self.d_hidden,
        }
    }
}

/// Burn's sequence LSTM driven one step at a time.
#[derive(Module, Debug)]
pub struct LstmCellWrapper<B: Backend> {
    lstm: Lstm<B>,
    #[module(skip)]
    d_input: usize,
    #[module(skip)]
    d_hidden: usize,
}

impl<B: Backend> RecurrentCell<B> for LstmCellWrapper<B> {
    fn step(&self, input: Tensor<B, 2>, state: &HiddenState<B>) -> (Tensor<B, 2>, HiddenState<B>) {
        let [batch_size, _] = input.dims();

        let input_seq = input.reshape([batch_size, 1, self.d_input]);
        // A GRU-shaped state handed to an LSTM starts from a zero cell.
        let cell = state
            .cell
            .clone()
            .unwrap_or_else(|| Tensor::zeros_like(&state.hidden));
        let lstm_state = LstmState::new(cell, state.hidden.clone());

        let (output_seq, new_state) = self.lstm.forward(input_seq, Some(lstm_state));
        let output = output_seq.reshape([batch_size, self.d_hidden]);

        (output, HiddenState::lstm(new_state.hidden, new_state.cell))
    }

    fn hidden_size(&self) -> usize {
        self.d_hidden
    }

    fn input_size(&self) -> usize {
        self.d_input
    }

    fn has_cell_state(&self) -> bool {
        true
    }
}

// ============================================================================
// GRU
// ============================================================================

/// Configuration for the GRU cell.
#[derive(Debug, Clone)]
pub struct GruCellConfig {
    pub d_input: usize,
    pub d_hidden: usize,
    pub bias: bool,
}

impl GruCellConfig {
    pub fn new(d_input: usize, d_hidden: usize) -> Self {
        Self {
            d_input,
            d_hidden,
            bias: true,
        }
    }

    pub fn with_bias(mut self, bias: bool) -> Self {
        self.bias = bias;
        self
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> GruCell<B> {
        let input_gate = |device: &B::Device| {
            LinearConfig::new(self.d_input, self.d_hidden)
                .with_bias(self.bias)
                .init(device)
        };
        let hidden_gate = |device: &B::Device| {
            LinearConfig::new(self.d_hidden, self.d_hidden)
                .with_bias(false)
                .init(device)
        };

        GruCell {
            reset_input: input_gate(device),
            reset_hidden: hidden_gate(device),
            update_input: input_gate(device),
            update_hidden: hidden_gate(device),
            candidate_input: input_gate(device),
            candidate_hidden: hidden_gate(device),
            d_input: self.d_input,
            d_hidden: self.d_hidden,
        }
    }
}

/// GRU cell.
///
/// - r = σ(W_ir x + W_hr h + b_r)
/// - z = σ(W_iz x + W_hz h + b_z)
/// - n = tanh(W_in x + r ⊙ (W_hn h) + b_n)
/// - h' = (1 - z) ⊙ n + z ⊙ h
#[derive(Module, Debug)]
pub struct GruCell<B: Backend> {
    reset_input: Linear<B>,
    reset_hidden: Linear<B>,
    update_input: Linear<B>,
    update_hidden: Linear<B>,
    candidate_input: Linear<B>,
    candidate_hidden: Linear<B>,
    #[module(skip)]
    d_input: usize,
    #[module(skip)]
    d_hidden: usize,
}

impl<B: Backend> RecurrentCell<B> for GruCell<B> {
    fn step(&self, input: Tensor<B, 2>, state: &HiddenState<B>) -> (Tensor<B, 2>, HiddenState<B>) {
        let h = state.h().clone();

        let r = sigmoid(self.reset_input.forward(input.clone()) + self.reset_hidden.forward(h.clone()));
        let z = sigmoid(self.update_input.forward(input.clone()) + self.update_hidden.forward(h.clone()));
        let n = (self.candidate_input.forward(input) + r * self.candidate_hidden.forward(h.clone())).tanh();

        let new_h = (z.clone().neg() + 1.0) * n + z * h;

        (new_h.clone(), HiddenState::gru(new_h))
    }

    fn hidden_size(&self) -> usize {
        self.d_hidden
    }

    fn input_size(&self) -> usize {
        self.d_input
    }

    fn has_cell_state(&self) -> bool {
        false
    }
}

// ============================================================================
// Cell selection
// ============================================================================

/// Recurrent cell family, parsed from `"gru"` / `"lstm"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurrentCellType {
    /// GRU cell with hidden state only.
    #[default]
    Gru,
    /// LSTM cell with hidden + cell state.
    Lstm,
}

impl RecurrentCellType {
    /// Build one cell of this family.
    pub fn init<B: Backend>(&self, d_input: usize, d_hidden: usize, device: &B::Device) -> MemoryCell<B> {
        match self {
            RecurrentCellType::Gru => MemoryCell::Gru(GruCellConfig::new(d_input, d_hidden).init(device)),
            RecurrentCellType::Lstm => MemoryCell::Lstm(LstmCellConfig::new(d_input, d_hidden).init(device)),
        }
    }

    pub fn has_cell_state(&self) -> bool {
        matches!(self, RecurrentCellType::Lstm)
    }
}

impl FromStr for RecurrentCellType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gru" => Ok(RecurrentCellType::Gru),
            "lstm" => Ok(RecurrentCellType::Lstm),
            other => Err(ConfigError::UnknownRecurrentType(other.to_string())),
        }
    }
}

impl fmt::Display for RecurrentCellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecurrentCellType::Gru => write!(f, "gru"),
            RecurrentCellType::Lstm => write!(f, "lstm"),
        }
    }
}

/// A GRU or LSTM cell chosen at construction.
#[derive(Module, Debug)]
pub enum MemoryCell<B: Backend> {
    Gru(GruCell<B>),
    Lstm(LstmCellWrapper<B>),
}

impl<B: Backend> RecurrentCell<B> for MemoryCell<B> {
    fn step(&self, input: Tensor<B, 2>, state: &HiddenState<B>) -> (Tensor<B, 2>, HiddenState<B>) {
        match self {
            MemoryCell::Gru(cell) => cell.step(input, state),
            MemoryCell::Lstm(cell) => cell.step(input, state),
        }
    }

    fn hidden_size(&self) -> usize {
        match self {
            MemoryCell::Gru(cell) => cell.hidden_size(),
            MemoryCell::Lstm(cell) => cell.hidden_size(),
        }
    }

    fn input_size(&self) -> usize {
        match self {
            MemoryCell::Gru(cell) => cell.input_size(),
            MemoryCell::Lstm(cell) => cell.input_size(),
        }
    }

    fn has_cell_state(&self) -> bool {
        matches!(self, MemoryCell::Lstm(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn test_lstm_cell_step() {
        let device = Default::default();
        let cell = LstmCellConfig::new(4, 8).init::<B>(&device);

        let input: Tensor<B, 2> = Tensor::zeros([2, 4], &device);
        let state = cell.initial_state(2, &device);
        let (output, new_state) = cell.step(input, &state);

        assert_eq!(output.dims(), [2, 8]);
        assert_eq!(new_state.hidden.dims(), [2, 8]);
        assert!(new_state.cell.is_some());
    }

    #[test]
    fn test_gru_cell_step() {
        let device = Default::default();
        let cell = GruCellConfig::new(4, 8).init::<B>(&device);

        let input: Tensor<B, 2> = Tensor::ones([3, 4], &device);
        let state = cell.initial_state(3, &device);
        let (output, new_state) = cell.step(input, &state);

        assert_eq!(output.dims(), [3, 8]);
        assert!(new_state.cell.is_none());

        // GRU output is a convex mix of tanh and the previous (zero) state.
        let values = output.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| v.abs() < 1.0));
    }

    #[test]
    fn test_forward_sequence_matches_stepping() {
        let device = Default::default();
        let cell = GruCellConfig::new(3, 5).init::<B>(&device);

        let seq: Tensor<B, 3> = Tensor::random(
            [4, 2, 3],
            burn::tensor::Distribution::Uniform(-1.0, 1.0),
            &device,
        );
        let (outputs, final_state) = cell.forward_sequence(seq.clone(), cell.initial_state(2, &device));
        assert_eq!(outputs.dims(), [4, 2, 5]);

        let mut state = cell.initial_state(2, &device);
        for t in 0..4 {
            let x = seq.clone().slice([t..t + 1, 0..2, 0..3]).reshape([2, 3]);
            let (_, next) = cell.step(x, &state);
            state = next;
        }

        let a = final_state.hidden.into_data().to_vec::<f32>().unwrap();
        let b = state.hidden.into_data().to_vec::<f32>().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_cell_type_parsing() {
        assert_eq!("gru".parse::<RecurrentCellType>().unwrap(), RecurrentCellType::Gru);
        assert_eq!("LSTM".parse::<RecurrentCellType>().unwrap(), RecurrentCellType::Lstm);
        assert!(matches!(
            "rnn".parse::<RecurrentCellType>(),
            Err(ConfigError::UnknownRecurrentType(_))
        ));
        assert_eq!(RecurrentCellType::default(), RecurrentCellType::Gru);
    }

    #[test]
    fn test_memory_cell_dispatch() {
        let device = Default::default();
        let gru: MemoryCell<B> = RecurrentCellType::Gru.init(4, 6, &device);
        let lstm: MemoryCell<B> = RecurrentCellType::Lstm.init(4, 6, &device);

        assert!(!gru.has_cell_state());
        assert!(lstm.has_cell_state());
        assert_eq!(gru.hidden_size(), 6);
        assert_eq!(lstm.input_size(), 4);

        let state = lstm.initial_state(2, &device);
        let (out, next) = lstm.step(Tensor::zeros([2, 4], &device), &state);
        assert_eq!(out.dims(), [2, 6]);
        assert!(next.c().is_some());
    }
}
