//! Helpers for recurrent training on rollouts.

pub mod trajectories;

pub use trajectories::{gather_initial_states, split_and_pad_trajectories, unpad_trajectories, TrajectoryMask};
