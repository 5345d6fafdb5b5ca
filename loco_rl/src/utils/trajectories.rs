//! Splitting rollouts into padded trajectory batches and back.
//!
//! A rollout is stored time-major as `[T, N, F]` for `N` environments. For
//! recurrent training every environment's column is cut into trajectories at
//! episode ends, and all trajectories are laid side by side, each starting at
//! time 0 and zero-padded to `T`:
//!
//! ```text
//! rollout (T = 4, N = 2)        padded (B_traj = 3)
//!   env0: a0 a1|a2 a3             traj0: a0 a1 .  .
//!   env1: b0 b1 b2 b3     ->      traj1: a2 a3 .  .
//!                                 traj2: b0 b1 b2 b3
//! ```
//!
//! Trajectories are ordered environment by environment, oldest first.
//! [`unpad_trajectories`] is the exact inverse and returns `[T, N, F]`.

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor, TensorData};

use crate::core::state::HiddenStates;
use crate::error::{ModelError, ModelResult};

/// Validity layout of a padded trajectory batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrajectoryMask {
    time: usize,
    num_envs: usize,
    /// Valid steps of each trajectory.
    lengths: Vec<usize>,
    /// Environment each trajectory came from.
    envs: Vec<usize>,
    /// Rollout step at which each trajectory starts.
    starts: Vec<usize>,
}

impl TrajectoryMask {
    /// Derive trajectories from time-major `dones` (`dones[t * N + n]`).
    ///
    /// A done at step `t` closes the trajectory after `t`; the final step of
    /// the rollout closes every open trajectory.
    pub fn from_dones(dones: &[bool], time: usize, num_envs: usize) -> ModelResult<Self> {
        if time == 0 || num_envs == 0 {
            return Err(ModelError::InvalidMask(format!(
                "empty {}x{} rollout has no trajectories",
                time, num_envs
            )));
        }
        if dones.len() != time * num_envs {
            return Err(ModelError::InvalidMask(format!(
                "dones has {} entries for a {}x{} rollout",
                dones.len(),
                time,
                num_envs
            )));
        }

        let mut lengths = Vec::new();
        let mut envs = Vec::new();
        let mut starts = Vec::new();

        for env in 0..num_envs {
            let mut start = 0;
            for t in 0..time {
                if dones[t * num_envs + env] || t + 1 == time {
                    lengths.push(t + 1 - start);
                    envs.push(env);
                    starts.push(start);
                    start = t + 1;
                }
            }
        }

        Ok(Self {
            time,
            num_envs,
            lengths,
            envs,
            starts,
        })
    }

    /// Padded time axis length `T`.
    pub fn time(&self) -> usize {
        self.time
    }

    /// Environments in the unpadded rollout.
    pub fn num_envs(&self) -> usize {
        self.num_envs
    }

    /// Trajectories in the padded batch (`B_traj`).
    pub fn num_trajectories(&self) -> usize {
        self.lengths.len()
    }

    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    pub fn trajectory_envs(&self) -> &[usize] {
        &self.envs
    }

    pub fn trajectory_starts(&self) -> &[usize] {
        &self.starts
    }

    /// Whether padded position `(t, trajectory)` holds real data.
    pub fn is_valid(&self, t: usize, trajectory: usize) -> bool {
        self.lengths.get(trajectory).is_some_and(|&len| t < len)
    }

    pub fn valid_count(&self) -> usize {
        self.lengths.iter().sum()
    }

    /// Time-major validity flags, `[T * B_traj]`.
    pub fn to_flags(&self) -> Vec<bool> {
        let n_traj = self.num_trajectories();
        (0..self.time * n_traj)
            .map(|i| self.is_valid(i / n_traj, i % n_traj))
            .collect()
    }

    /// Validity as a `[T, B_traj]` float tensor (1.0 valid, 0.0 padding),
    /// for masking per-step losses.
    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        let flags: Vec<f32> = self
            .to_flags()
            .into_iter()
            .map(|v| if v { 1.0 } else { 0.0 })
            .collect();
        Tensor::<B, 1>::from_floats(flags.as_slice(), device).reshape([self.time, self.num_trajectories()])
    }

    /// Check that a padded tensor `[T, B_traj, _]` matches this mask.
    pub(crate) fn check_padded(&self, time: usize, trajectories: usize) -> ModelResult<()> {
        if time != self.time {
            return Err(ModelError::ShapeMismatch {
                context: "padded batch time steps",
                expected: self.time,
                actual: time,
            });
        }
        if trajectories != self.num_trajectories() {
            return Err(ModelError::ShapeMismatch {
                context: "padded batch trajectories",
                expected: self.num_trajectories(),
                actual: trajectories,
            });
        }
        Ok(())
    }
}

fn index_tensor<B: Backend>(indices: Vec<i64>, device: &B::Device) -> Tensor<B, 1, Int> {
    let len = indices.len();
    Tensor::from_data(TensorData::new(indices, [len]), device)
}

/// Cut a `[T, N, F]` rollout into zero-padded trajectories `[T, B_traj, F]`.
pub fn split_and_pad_trajectories<B: Backend>(
    tensor: Tensor<B, 3>,
    dones: &[bool],
) -> ModelResult<(Tensor<B, 3>, TrajectoryMask)> {
    let [time, num_envs, features] = tensor.dims();
    let mask = TrajectoryMask::from_dones(dones, time, num_envs)?;
    let n_traj = mask.num_trajectories();
    let device = tensor.device();

    // Row `time * num_envs` is an appended zero row used for padding.
    let pad_row = (time * num_envs) as i64;
    let mut indices = vec![pad_row; time * n_traj];
    for traj in 0..n_traj {
        let (start, env) = (mask.starts[traj], mask.envs[traj]);
        for t in 0..mask.lengths[traj] {
            indices[t * n_traj + traj] = ((start + t) * num_envs + env) as i64;
        }
    }

    let rows = Tensor::cat(
        vec![
            tensor.reshape([time * num_envs, features]),
            Tensor::zeros([1, features], &device),
        ],
        0,
    );
    let padded = rows
        .select(0, index_tensor::<B>(indices, &device))
        .reshape([time, n_traj, features]);

    Ok((padded, mask))
}

/// Inverse of [`split_and_pad_trajectories`]: `[T, B_traj, F]` to `[T, N, F]`.
pub fn unpad_trajectories<B: Backend>(padded: Tensor<B, 3>, mask: &TrajectoryMask) -> ModelResult<Tensor<B, 3>> {
    let [time, n_traj, features] = padded.dims();
    mask.check_padded(time, n_traj)?;

    let num_envs = mask.num_envs;
    if mask.valid_count() != time * num_envs {
        return Err(ModelError::InvalidMask(format!(
            "{} valid steps cannot fill a {}x{} rollout",
            mask.valid_count(),
            time,
            num_envs
        )));
    }

    let mut indices = vec![0i64; time * num_envs];
    for traj in 0..n_traj {
        let (start, env) = (mask.starts[traj], mask.envs[traj]);
        for t in 0..mask.lengths[traj] {
            indices[(start + t) * num_envs + env] = (t * n_traj + traj) as i64;
        }
    }

    let device = padded.device();
    Ok(padded
        .reshape([time * n_traj, features])
        .select(0, index_tensor::<B>(indices, &device))
        .reshape([time, num_envs, features]))
}

/// Initial hidden state of every trajectory in a padded batch.
///
/// `history[t]` is the carried state before rollout step `t` (after any
/// resets from step `t - 1`), covering all `N` environments.
pub fn gather_initial_states<B: Backend>(
    history: &[HiddenStates<B>],
    mask: &TrajectoryMask,
) -> ModelResult<HiddenStates<B>> {
    if history.len() < mask.time {
        return Err(ModelError::ShapeMismatch {
            context: "hidden state history length",
            expected: mask.time,
            actual: history.len(),
        });
    }

    let parts = mask
        .starts
        .iter()
        .zip(&mask.envs)
        .map(|(&start, &env)| history[start].select_envs(&[env]))
        .collect::<ModelResult<Vec<_>>>()?;

    Ok(HiddenStates::concat(parts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    /// `[T, N, 1]` rollout whose value encodes `10 * env + t`.
    fn rollout(time: usize, num_envs: usize) -> Tensor<B, 3> {
        let device = Default::default();
        let data: Vec<f32> = (0..time * num_envs)
            .map(|i| (10 * (i % num_envs) + i / num_envs) as f32)
            .collect();
        Tensor::<B, 1>::from_floats(data.as_slice(), &device).reshape([time, num_envs, 1])
    }

    fn values(t: Tensor<B, 3>) -> Vec<f32> {
        t.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_mask_from_dones() {
        // env0 ends at t=1, env1 never ends.
        let dones = [false, false, true, false, false, false, false, false];
        let mask = TrajectoryMask::from_dones(&dones, 4, 2).unwrap();

        assert_eq!(mask.num_trajectories(), 3);
        assert_eq!(mask.lengths(), &[2, 2, 4]);
        assert_eq!(mask.trajectory_envs(), &[0, 0, 1]);
        assert_eq!(mask.trajectory_starts(), &[0, 2, 0]);
        assert_eq!(mask.valid_count(), 8);
        assert!(mask.is_valid(1, 0));
        assert!(!mask.is_valid(2, 0));
        assert!(mask.is_valid(3, 2));
    }

    #[test]
    fn test_mask_rejects_wrong_length() {
        assert!(TrajectoryMask::from_dones(&[false; 5], 3, 2).is_err());
        assert!(matches!(
            TrajectoryMask::from_dones(&[], 0, 2),
            Err(ModelError::InvalidMask(_))
        ));
        assert!(TrajectoryMask::from_dones(&[], 3, 0).is_err());
    }

    #[test]
    fn test_split_rejects_empty_rollout() {
        let empty: Tensor<B, 3> = Tensor::zeros([0, 2, 3], &Default::default());
        assert!(matches!(
            split_and_pad_trajectories(empty, &[]),
            Err(ModelError::InvalidMask(_))
        ));
    }

    #[test]
    fn test_split_and_pad_layout() {
        let dones = [false, false, true, false, false, false, false, false];
        let (padded, mask) = split_and_pad_trajectories(rollout(4, 2), &dones).unwrap();

        assert_eq!(padded.dims(), [4, 3, 1]);
        // rows are time steps, columns are trajectories
        assert_eq!(
            values(padded),
            vec![
                0.0, 2.0, 10.0, //
                1.0, 3.0, 11.0, //
                0.0, 0.0, 12.0, //
                0.0, 0.0, 13.0,
            ]
        );
        assert_eq!(
            mask.to_flags(),
            vec![true, true, true, true, true, true, false, false, true, false, false, true]
        );
    }

    #[test]
    fn test_unpad_inverts_split() {
        let dones = [false, true, false, true, false, false, false, false, true, false, false, false];
        let original = rollout(4, 3);
        let (padded, mask) = split_and_pad_trajectories(original.clone(), &dones).unwrap();

        let restored = unpad_trajectories(padded, &mask).unwrap();
        assert_eq!(values(restored), values(original));
    }

    #[test]
    fn test_unpad_rejects_mismatched_batch() {
        let dones = [false; 4];
        let (_, mask) = split_and_pad_trajectories(rollout(2, 2), &dones).unwrap();
        let wrong: Tensor<B, 3> = Tensor::zeros([2, 3, 1], &Default::default());
        assert!(matches!(
            unpad_trajectories(wrong, &mask),
            Err(ModelError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_mask_tensor() {
        let mask = TrajectoryMask::from_dones(&[true, false, false, false], 2, 2).unwrap();
        let t = mask.to_tensor::<B>(&Default::default());
        assert_eq!(t.dims(), [2, 3]);
        assert_eq!(
            t.into_data().to_vec::<f32>().unwrap(),
            vec![1.0, 1.0, 1.0, 0.0, 0.0, 1.0]
        );
    }

    #[test]
    fn test_gather_initial_states() {
        let device = Default::default();
        let history: Vec<HiddenStates<B>> = (0..3)
            .map(|t| {
                let h = Tensor::<B, 1>::from_floats([t as f32, 10.0 + t as f32], &device).reshape([2, 1]);
                HiddenStates::from_layers(vec![crate::core::recurrent::HiddenState::gru(h)])
            })
            .collect();

        // env1 ends at t=0, so its second trajectory starts at t=1.
        let mask = TrajectoryMask::from_dones(&[false, true, false, false, false, false], 3, 2).unwrap();
        let initial = gather_initial_states(&history, &mask).unwrap();

        assert_eq!(initial.batch_size(), 3);
        assert_eq!(
            initial.layers()[0].hidden.clone().into_data().to_vec::<f32>().unwrap(),
            vec![0.0, 10.0, 11.0]
        );
    }
}
