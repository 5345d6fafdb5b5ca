//! Recurrent hidden state, owned by the caller and passed into every call.
//!
//! - [`HiddenStates`]: one [`HiddenState`] per recurrent layer, all covering
//!   the same batch of environments (`[num_layers, batch, hidden]`).
//! - [`RecurrentState`]: the carrier a memory reads from and writes to
//!   between environment steps. It is either idle (nothing stored yet, or
//!   fully cleared) or carrying the state of the last step.
//!
//! A memory never keeps state on its own. Whoever drives the rollout owns
//! the carrier and is responsible for calling [`RecurrentState::reset`] with
//! the episode terminations of each step.

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor, TensorData};

use super::recurrent::HiddenState;
use crate::error::{ModelError, ModelResult};

// ============================================================================
// HiddenStates
// ============================================================================

/// Hidden state of a stacked recurrent memory.
#[derive(Debug, Clone)]
pub struct HiddenStates<B: Backend> {
    layers: Vec<HiddenState<B>>,
}

impl<B: Backend> HiddenStates<B> {
    /// Zero state for every layer.
    pub fn zeros(
        num_layers: usize,
        batch_size: usize,
        hidden_size: usize,
        has_cell: bool,
        device: &B::Device,
    ) -> Self {
        let layers = (0..num_layers)
            .map(|_| HiddenState::zeros(batch_size, hidden_size, has_cell, device))
            .collect();
        Self { layers }
    }

    /// Build from per-layer states (bottom layer first).
    pub fn from_layers(layers: Vec<HiddenState<B>>) -> Self {
        Self { layers }
    }

    pub fn layers(&self) -> &[HiddenState<B>] {
        &self.layers
    }

    pub fn into_layers(self) -> Vec<HiddenState<B>> {
        self.layers
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// Number of environments covered (0 for an empty stack).
    pub fn batch_size(&self) -> usize {
        self.layers.first().map(|l| l.batch_size()).unwrap_or(0)
    }

    pub fn has_cell(&self) -> bool {
        self.layers.first().map(|l| l.cell.is_some()).unwrap_or(false)
    }

    /// Hidden tensors stacked as `[num_layers, batch, hidden]`.
    pub fn hidden_tensor(&self) -> Tensor<B, 3> {
        Tensor::stack(self.layers.iter().map(|l| l.hidden.clone()).collect(), 0)
    }

    /// Cell tensors stacked as `[num_layers, batch, hidden]` (LSTM only).
    pub fn cell_tensor(&self) -> Option<Tensor<B, 3>> {
        let cells: Option<Vec<_>> = self.layers.iter().map(|l| l.cell.clone()).collect();
        cells.filter(|c| !c.is_empty()).map(|c| Tensor::stack(c, 0))
    }

    /// Zero the rows of every environment flagged in `dones`.
    pub fn reset_envs(&mut self, dones: &[bool]) -> ModelResult<()> {
        let stored = self.batch_size();
        if dones.len() != stored {
            return Err(ModelError::DonesMismatch {
                mask: dones.len(),
                stored,
            });
        }
        if !dones.iter().any(|&d| d) {
            return Ok(());
        }

        for layer in self.layers.iter_mut() {
            *layer = layer.cleared(dones);
        }
        Ok(())
    }

    /// State of a subset of environments, in the order given.
    ///
    /// Used to pick the initial state of every trajectory in a padded batch.
    pub fn select_envs(&self, indices: &[usize]) -> ModelResult<Self> {
        let stored = self.batch_size();
        if let Some(&bad) = indices.iter().find(|&&i| i >= stored) {
            return Err(ModelError::ShapeMismatch {
                context: "environment index into hidden state",
                expected: stored,
                actual: bad,
            });
        }
        let Some(first) = self.layers.first() else {
            return Ok(self.clone());
        };

        let device = first.hidden.device();
        let ids: Vec<i64> = indices.iter().map(|&i| i as i64).collect();
        let ids = Tensor::<B, 1, Int>::from_data(TensorData::new(ids, [indices.len()]), &device);

        Ok(Self {
            layers: self.layers.iter().map(|l| l.select(ids.clone())).collect(),
        })
    }

    /// Concatenate any number of state stacks along the environment axis,
    /// in the order given. Every part must have the same layer count.
    pub fn concat(parts: Vec<Self>) -> Self {
        let num_layers = parts.first().map(|p| p.num_layers()).unwrap_or(0);
        let layers = (0..num_layers)
            .map(|layer| {
                let hidden = Tensor::cat(parts.iter().map(|p| p.layers[layer].hidden.clone()).collect(), 0);
                let cells: Option<Vec<_>> = parts.iter().map(|p| p.layers[layer].cell.clone()).collect();
                HiddenState {
                    hidden,
                    cell: cells.map(|c| Tensor::cat(c, 0)),
                }
            })
            .collect();
        Self { layers }
    }

    /// Same values with the autodiff graph cut.
    pub fn detached(&self) -> Self {
        Self {
            layers: self.layers.iter().map(|l| l.detach()).collect(),
        }
    }
}

// ============================================================================
// RecurrentState
// ============================================================================

/// Hidden state carried across environment steps for one memory.
#[derive(Debug, Clone)]
pub struct RecurrentState<B: Backend> {
    hidden: Option<HiddenStates<B>>,
}

impl<B: Backend> Default for RecurrentState<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> RecurrentState<B> {
    /// Idle state: the next forward starts from zeros.
    pub fn new() -> Self {
        Self { hidden: None }
    }

    /// Carrier already holding `hidden`.
    pub fn carrying(hidden: HiddenStates<B>) -> Self {
        Self { hidden: Some(hidden) }
    }

    pub fn is_idle(&self) -> bool {
        self.hidden.is_none()
    }

    /// Borrow the carried state.
    pub fn hidden(&self) -> Option<&HiddenStates<B>> {
        self.hidden.as_ref()
    }

    /// Copy of the carried state; later steps do not affect it.
    pub fn snapshot(&self) -> Option<HiddenStates<B>> {
        self.hidden.clone()
    }

    /// Replace the carried state.
    pub fn store(&mut self, hidden: HiddenStates<B>) {
        self.hidden = Some(hidden);
    }

    /// Clear finished environments.
    ///
    /// `None` clears everything and returns to idle. With a mask, exactly
    /// the flagged rows are zeroed; an idle carrier ignores the mask.
    pub fn reset(&mut self, dones: Option<&[bool]>) -> ModelResult<()> {
        match (dones, self.hidden.as_mut()) {
            (None, _) => {
                self.hidden = None;
                Ok(())
            }
            (Some(_), None) => Ok(()),
            (Some(dones), Some(hidden)) => hidden.reset_envs(dones),
        }
    }

    /// Cut the autodiff graph of the carried state (truncated BPTT).
    pub fn detach(&mut self) {
        if let Some(hidden) = self.hidden.as_mut() {
            *hidden = hidden.detached();
        }
    }
}
