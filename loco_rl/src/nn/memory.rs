//! Stacked recurrent memory with caller-owned hidden state.
//!
//! Two ways to run it:
//!
//! - **Step mode** ([`Memory::forward`]): one `[batch, input]` observation per
//!   environment. The state is read from and written back to a
//!   [`RecurrentState`] carrier, unless an explicit state is supplied.
//! - **Masked mode** ([`Memory::forward_masked`]): a padded trajectory batch
//!   `[T, B_traj, input]` with its [`TrajectoryMask`]. Each trajectory starts
//!   from the given initial state (zeros if none) and the output is unpadded
//!   back to `[T, N, hidden]`. The carried state is not touched.

use burn::module::Module;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::core::recurrent::{MemoryCell, RecurrentCell, RecurrentCellType};
use crate::core::state::{HiddenStates, RecurrentState};
use crate::error::{ConfigError, ModelError, ModelResult};
use crate::utils::trajectories::{unpad_trajectories, TrajectoryMask};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryConfig {
    pub input_size: usize,
    pub hidden_size: usize,
    pub num_layers: usize,
    pub cell: RecurrentCellType,
}

impl MemoryConfig {
    pub fn new(input_size: usize, hidden_size: usize) -> Self {
        Self {
            input_size,
            hidden_size,
            num_layers: 1,
            cell: RecurrentCellType::default(),
        }
    }

    pub fn with_num_layers(mut self, num_layers: usize) -> Self {
        self.num_layers = num_layers;
        self
    }

    pub fn with_cell(mut self, cell: RecurrentCellType) -> Self {
        self.cell = cell;
        self
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<Memory<B>, ConfigError> {
        if self.input_size == 0 {
            return Err(ConfigError::ZeroSized { field: "memory input size" });
        }
        if self.hidden_size == 0 {
            return Err(ConfigError::ZeroSized { field: "rnn_hidden_dim" });
        }
        if self.num_layers == 0 {
            return Err(ConfigError::ZeroSized { field: "rnn_num_layers" });
        }

        let layers = (0..self.num_layers)
            .map(|i| {
                let d_input = if i == 0 { self.input_size } else { self.hidden_size };
                self.cell.init(d_input, self.hidden_size, device)
            })
            .collect();

        Ok(Memory {
            layers,
            input_size: self.input_size,
            hidden_size: self.hidden_size,
        })
    }
}

/// GRU or LSTM layers stacked bottom to top.
#[derive(Module, Debug)]
pub struct Memory<B: Backend> {
    layers: Vec<MemoryCell<B>>,
    #[module(skip)]
    input_size: usize,
    #[module(skip)]
    hidden_size: usize,
}

impl<B: Backend> Memory<B> {
    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn has_cell_state(&self) -> bool {
        self.layers.first().is_some_and(|cell| cell.has_cell_state())
    }

    /// Zero state for `batch_size` environments.
    pub fn initial_hidden(&self, batch_size: usize, device: &B::Device) -> HiddenStates<B> {
        HiddenStates::zeros(
            self.num_layers(),
            batch_size,
            self.hidden_size,
            self.has_cell_state(),
            device,
        )
    }

    fn check_input(&self, features: usize) -> ModelResult<()> {
        if features != self.input_size {
            return Err(ModelError::ShapeMismatch {
                context: "memory input width",
                expected: self.input_size,
                actual: features,
            });
        }
        Ok(())
    }

    fn check_hidden(&self, hidden: &HiddenStates<B>, batch_size: usize) -> ModelResult<()> {
        if hidden.num_layers() != self.num_layers() {
            return Err(ModelError::ShapeMismatch {
                context: "hidden state layers",
                expected: self.num_layers(),
                actual: hidden.num_layers(),
            });
        }
        if hidden.batch_size() != batch_size {
            return Err(ModelError::BatchMismatch {
                stored: hidden.batch_size(),
                input: batch_size,
            });
        }
        Ok(())
    }

    /// One step through every layer.
    fn step(&self, input: Tensor<B, 2>, hidden: &HiddenStates<B>) -> (Tensor<B, 2>, HiddenStates<B>) {
        let mut x = input;
        let mut next = Vec::with_capacity(self.layers.len());

        for (cell, state) in self.layers.iter().zip(hidden.layers()) {
            let (out, new_state) = cell.step(x, state);
            x = out;
            next.push(new_state);
        }

        (x, HiddenStates::from_layers(next))
    }

    /// Step mode: `[batch, input]` to `[batch, hidden]`.
    ///
    /// Starts from `hidden` if given, otherwise from the carried state, or
    /// zeros when the carrier is idle. The new state is stored in `state`.
    pub fn forward(
        &self,
        input: Tensor<B, 2>,
        state: &mut RecurrentState<B>,
        hidden: Option<&HiddenStates<B>>,
    ) -> ModelResult<Tensor<B, 2>> {
        let [batch_size, features] = input.dims();
        self.check_input(features)?;

        let initial = match hidden.or(state.hidden()) {
            Some(h) => {
                self.check_hidden(h, batch_size)?;
                h.clone()
            }
            None => self.initial_hidden(batch_size, &input.device()),
        };

        let (out, next) = self.step(input, &initial);
        state.store(next);
        Ok(out)
    }

    /// Masked mode: padded `[T, B_traj, input]` to unpadded `[T, N, hidden]`.
    pub fn forward_masked(
        &self,
        input: Tensor<B, 3>,
        masks: &TrajectoryMask,
        hidden: Option<&HiddenStates<B>>,
    ) -> ModelResult<Tensor<B, 3>> {
        let [time, trajectories, features] = input.dims();
        self.check_input(features)?;
        masks.check_padded(time, trajectories)?;

        let mut state = match hidden {
            Some(h) => {
                self.check_hidden(h, trajectories)?;
                h.clone()
            }
            None => self.initial_hidden(trajectories, &input.device()),
        };

        let mut outputs = Vec::with_capacity(time);
        for t in 0..time {
            let x: Tensor<B, 2> = input
                .clone()
                .slice([t..t + 1, 0..trajectories, 0..features])
                .reshape([trajectories, features]);
            let (out, next) = self.step(x, &state);
            outputs.push(out.unsqueeze_dim::<3>(0));
            state = next;
        }

        log::trace!("memory masked pass: {} steps over {} trajectories", time, trajectories);
        unpad_trajectories(Tensor::cat(outputs, 0), masks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::trajectories::split_and_pad_trajectories;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type B = NdArray<f32>;

    fn values<const D: usize>(t: Tensor<B, D>) -> Vec<f32> {
        t.into_data().to_vec::<f32>().unwrap()
    }

    fn assert_close(a: &[f32], b: &[f32], tol: f32) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() <= tol, "{} vs {}", x, y);
        }
    }

    fn memory(cell: RecurrentCellType, num_layers: usize) -> Memory<B> {
        MemoryConfig::new(3, 5)
            .with_cell(cell)
            .with_num_layers(num_layers)
            .init(&Default::default())
            .unwrap()
    }

    #[test]
    fn test_forward_stores_state() {
        let device = Default::default();
        let mem = memory(RecurrentCellType::Lstm, 2);
        let mut state = RecurrentState::new();

        let out = mem.forward(Tensor::ones([4, 3], &device), &mut state, None).unwrap();
        assert_eq!(out.dims(), [4, 5]);

        let stored = state.hidden().unwrap();
        assert_eq!(stored.num_layers(), 2);
        assert_eq!(stored.batch_size(), 4);
        assert!(stored.has_cell());
        assert_close(&values(out), &values(stored.layers()[1].hidden.clone()), 0.0);
    }

    #[test]
    fn test_reset_restores_initial_behaviour() {
        let device = Default::default();
        let mem = memory(RecurrentCellType::Gru, 1);
        let input = Tensor::<B, 2>::random([2, 3], Distribution::Default, &device);
        let mut state = RecurrentState::new();

        let first = values(mem.forward(input.clone(), &mut state, None).unwrap());
        mem.forward(input.clone(), &mut state, None).unwrap();

        state.reset(None).unwrap();
        state.reset(None).unwrap();
        assert!(state.is_idle());

        let after_reset = values(mem.forward(input, &mut state, None).unwrap());
        assert_eq!(first, after_reset);
    }

    #[test]
    fn test_partial_reset_matches_independent_memories() {
        let device = Default::default();
        let mem = memory(RecurrentCellType::Lstm, 2);
        let steps: Vec<Tensor<B, 2>> = (0..4)
            .map(|_| Tensor::random([2, 3], Distribution::Default, &device))
            .collect();

        let mut batched = RecurrentState::new();
        let mut env0 = RecurrentState::new();
        let mut env1 = RecurrentState::new();

        for (t, x) in steps.iter().enumerate() {
            let out = values(mem.forward(x.clone(), &mut batched, None).unwrap());
            let out0 = values(mem.forward(x.clone().slice([0..1, 0..3]), &mut env0, None).unwrap());
            let out1 = values(mem.forward(x.clone().slice([1..2, 0..3]), &mut env1, None).unwrap());

            assert_close(&out[..5], &out0, 1e-5);
            assert_close(&out[5..], &out1, 1e-5);

            if t == 1 {
                batched.reset(Some(&[false, true][..])).unwrap();
                env1.reset(None).unwrap();
            }
        }
    }

    #[test]
    fn test_batch_mismatch_is_an_error() {
        let device = Default::default();
        let mem = memory(RecurrentCellType::Gru, 1);
        let mut state = RecurrentState::new();

        mem.forward(Tensor::zeros([4, 3], &device), &mut state, None).unwrap();
        let err = mem.forward(Tensor::zeros([3, 3], &device), &mut state, None).unwrap_err();
        assert_eq!(err, ModelError::BatchMismatch { stored: 4, input: 3 });
    }

    #[test]
    fn test_wrong_input_width_is_an_error() {
        let mem = memory(RecurrentCellType::Gru, 1);
        let mut state = RecurrentState::new();
        let err = mem
            .forward(Tensor::zeros([1, 4], &Default::default()), &mut state, None)
            .unwrap_err();
        assert!(matches!(err, ModelError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_masked_pass_matches_stepping_with_resets() {
        let device = Default::default();
        let mem = memory(RecurrentCellType::Gru, 2);
        let (time, envs) = (5, 2);
        let rollout = Tensor::<B, 3>::random([time, envs, 3], Distribution::Default, &device);
        // env0 terminates at t=1, env1 at t=3.
        let mut dones = vec![false; time * envs];
        dones[envs] = true;
        dones[3 * envs + 1] = true;

        let mut state = RecurrentState::new();
        let mut stepped = Vec::new();
        for t in 0..time {
            let x = rollout.clone().slice([t..t + 1, 0..envs, 0..3]).reshape([envs, 3]);
            stepped.extend(values(mem.forward(x, &mut state, None).unwrap()));
            state.reset(Some(&dones[t * envs..(t + 1) * envs])).unwrap();
        }

        let (padded, mask) = split_and_pad_trajectories(rollout, &dones).unwrap();
        let masked = mem.forward_masked(padded, &mask, None).unwrap();
        assert_eq!(masked.dims(), [time, envs, 5]);
        assert_close(&values(masked), &stepped, 1e-5);
    }

    #[test]
    fn test_masked_pass_leaves_carrier_alone() {
        let device = Default::default();
        let mem = memory(RecurrentCellType::Gru, 1);
        let mut state = RecurrentState::new();
        mem.forward(Tensor::ones([2, 3], &device), &mut state, None).unwrap();
        let before = values(state.hidden().unwrap().hidden_tensor());

        let (padded, mask) = split_and_pad_trajectories(Tensor::<B, 3>::ones([3, 2, 3], &device), &[false; 6]).unwrap();
        mem.forward_masked(padded, &mask, None).unwrap();

        assert_eq!(values(state.hidden().unwrap().hidden_tensor()), before);
    }
}
