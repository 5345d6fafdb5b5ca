//! Recurrent multi-branch actor-critic.
//!
//! Actor and critic each own an independent pipeline. A pipeline either
//! passes its observation straight to the backbone head, or splits it:
//!
//! ```text
//!                ┌── flatten segment ─────────────────────────────────┐
//! observation ───┤                                                    ├─ concat ─► head
//!                └── encoder segment ─► pre-encoder? ─► memory ─► encoder ┘
//! ```
//!
//! The memory is recurrent. Its hidden state is not stored in the model:
//! callers keep a [`PolicyState`] per rollout and pass it to every step.
//!
//! # Step and masked modes
//!
//! - `act`, `act_inference`, `evaluate` take one `[batch, obs_dim]` step and
//!   advance the carried state.
//! - `act_masked`, `evaluate_masked` take a padded trajectory batch
//!   `[T, B_traj, obs_dim]` built by
//!   [`split_and_pad_trajectories`](crate::utils::split_and_pad_trajectories),
//!   start each trajectory from the supplied initial hidden state, and return
//!   results for the unpadded rollout, flattened time-major to `[T * N, _]`.
//!   The carried state is left untouched.

use burn::module::Module;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::actor_critic::{ActOutput, ActorCritic};
use crate::config::{BranchConfig, EncoderBranchConfig, ResolvedConfig, UnifiedActorCriticConfig};
use crate::core::state::{HiddenStates, RecurrentState};
use crate::error::{ConfigError, ModelError, ModelResult};
use crate::nn::embedder::{Embedder, ModalityEncoder};
use crate::nn::memory::Memory;
use crate::utils::trajectories::{unpad_trajectories, TrajectoryMask};

// ============================================================================
// PolicyState
// ============================================================================

/// Per-rollout recurrent state of both pipelines. Never shared between them.
#[derive(Debug, Clone)]
pub struct PolicyState<B: Backend> {
    pub actor: RecurrentState<B>,
    pub critic: RecurrentState<B>,
}

impl<B: Backend> Default for PolicyState<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> PolicyState<B> {
    pub fn new() -> Self {
        Self {
            actor: RecurrentState::new(),
            critic: RecurrentState::new(),
        }
    }

    /// Cut the autodiff graph of both carried states.
    pub fn detach(&mut self) {
        self.actor.detach();
        self.critic.detach();
    }
}

// ============================================================================
// EncoderBranch
// ============================================================================

/// Pre-encoder, memory and encoder for one pipeline's encoder segment.
#[derive(Module, Debug)]
pub struct EncoderBranch<B: Backend> {
    pre_encoder: Option<ModalityEncoder<B>>,
    memory: Memory<B>,
    encoder: ModalityEncoder<B>,
    #[module(skip)]
    obs_dim: usize,
    #[module(skip)]
    flatten_width: usize,
    #[module(skip)]
    encoder_width: usize,
}

impl<B: Backend> EncoderBranch<B> {
    fn init(name: &str, config: &EncoderBranchConfig, device: &B::Device) -> Result<Self, ConfigError> {
        let pre_encoder = config
            .pre_encoder
            .as_ref()
            .map(|cfg| cfg.init::<B>(config.encoder_width, device))
            .transpose()?;
        let memory = config.memory.init::<B>(device)?;
        let encoder = config.encoder.init::<B>(memory.hidden_size(), device)?;

        if let Some(pre) = &pre_encoder {
            log::info!(
                "{} pre-encoder: {} {} -> {}",
                name,
                pre.kind(),
                pre.input_dim(),
                pre.embedding_dim()
            );
        }
        log::info!(
            "{} memory: {} x{} {} -> {}",
            name,
            config.memory.cell,
            memory.num_layers(),
            memory.input_size(),
            memory.hidden_size()
        );
        log::info!(
            "{} encoder: {} {} -> {}",
            name,
            encoder.kind(),
            encoder.input_dim(),
            encoder.embedding_dim()
        );

        Ok(Self {
            pre_encoder,
            memory,
            encoder,
            obs_dim: config.obs_dim,
            flatten_width: config.flatten_width,
            encoder_width: config.encoder_width,
        })
    }

    pub fn flatten_width(&self) -> usize {
        self.flatten_width
    }

    pub fn encoder_width(&self) -> usize {
        self.encoder_width
    }

    pub fn embedding_dim(&self) -> usize {
        self.encoder.embedding_dim()
    }

    pub fn memory(&self) -> &Memory<B> {
        &self.memory
    }

    pub fn has_pre_encoder(&self) -> bool {
        self.pre_encoder.is_some()
    }

    /// Leading `flatten_width` columns.
    pub fn flatten_segment<const D: usize>(&self, obs: Tensor<B, D>) -> Tensor<B, D> {
        obs.narrow(D - 1, 0, self.flatten_width)
    }

    /// Trailing `encoder_width` columns.
    pub fn encoder_segment<const D: usize>(&self, obs: Tensor<B, D>) -> Tensor<B, D> {
        obs.narrow(D - 1, self.obs_dim - self.encoder_width, self.encoder_width)
    }

    /// Encoder segment `[batch, encoder_width]` to embedding, one step.
    pub fn encode(&self, encoder_obs: Tensor<B, 2>, state: &mut RecurrentState<B>) -> ModelResult<Tensor<B, 2>> {
        check_width("encoder observation width", self.encoder_width, encoder_obs.dims()[1])?;
        let pre = match &self.pre_encoder {
            Some(pre) => pre.embed(encoder_obs),
            None => encoder_obs,
        };
        let memory_out = self.memory.forward(pre, state, None)?;
        Ok(self.encoder.embed(memory_out))
    }

    /// Padded encoder segment `[T, B_traj, encoder_width]` to `[T, N, embedding]`.
    pub fn encode_masked(
        &self,
        encoder_obs: Tensor<B, 3>,
        masks: &TrajectoryMask,
        hidden: Option<&HiddenStates<B>>,
    ) -> ModelResult<Tensor<B, 3>> {
        check_width("encoder observation width", self.encoder_width, encoder_obs.dims()[2])?;
        let pre = match &self.pre_encoder {
            Some(pre) => pre.embed_sequence(encoder_obs),
            None => encoder_obs,
        };
        let memory_out = self.memory.forward_masked(pre, masks, hidden)?;
        Ok(self.encoder.embed_sequence(memory_out))
    }

    /// `[flatten, embedding]` backbone features for one step.
    fn features(&self, obs: Tensor<B, 2>, state: &mut RecurrentState<B>) -> ModelResult<Tensor<B, 2>> {
        check_width("observation width", self.obs_dim, obs.dims()[1])?;
        let embedding = self.encode(self.encoder_segment(obs.clone()), state)?;
        Ok(Tensor::cat(vec![self.flatten_segment(obs), embedding], 1))
    }

    /// Backbone features for a padded batch, flattened to `[T * N, _]`.
    fn features_masked(
        &self,
        obs: Tensor<B, 3>,
        masks: &TrajectoryMask,
        hidden: Option<&HiddenStates<B>>,
    ) -> ModelResult<Tensor<B, 2>> {
        check_width("observation width", self.obs_dim, obs.dims()[2])?;
        let embedding = self.encode_masked(self.encoder_segment(obs.clone()), masks, hidden)?;
        let flatten = unpad_trajectories(self.flatten_segment(obs), masks)?;
        Ok(flatten_steps(Tensor::cat(vec![flatten, embedding], 2)))
    }
}

fn check_width(context: &'static str, expected: usize, actual: usize) -> ModelResult<()> {
    if expected != actual {
        return Err(ModelError::ShapeMismatch {
            context,
            expected,
            actual,
        });
    }
    Ok(())
}

/// `[T, N, F]` to `[T * N, F]`.
fn flatten_steps<B: Backend>(x: Tensor<B, 3>) -> Tensor<B, 2> {
    let [time, envs, features] = x.dims();
    x.reshape([time * envs, features])
}

// ============================================================================
// UnifiedActorCritic
// ============================================================================

/// Actor-critic with optional recurrent encoder branches.
#[derive(Module, Debug)]
pub struct UnifiedActorCritic<B: Backend> {
    backbone: ActorCritic<B>,
    actor_branch: Option<EncoderBranch<B>>,
    critic_branch: Option<EncoderBranch<B>>,
    #[module(skip)]
    actor_obs_dim: usize,
    #[module(skip)]
    critic_obs_dim: usize,
}

impl<B: Backend> UnifiedActorCritic<B> {
    pub const IS_RECURRENT: bool = true;

    /// Resolve `config` and build the model.
    pub fn new(config: &UnifiedActorCriticConfig, device: &B::Device) -> Result<Self, ConfigError> {
        Self::from_resolved(&config.resolve()?, device)
    }

    pub fn from_resolved(resolved: &ResolvedConfig, device: &B::Device) -> Result<Self, ConfigError> {
        let backbone = resolved.backbone.init::<B>(device)?;
        log::info!(
            "actor backbone: {} -> {:?} -> {} ({} noise std)",
            resolved.backbone.num_actor_obs,
            resolved.backbone.actor_hidden_dims,
            resolved.backbone.num_actions,
            resolved.backbone.noise_std_type
        );
        log::info!(
            "critic backbone: {} -> {:?} -> 1",
            resolved.backbone.num_critic_obs,
            resolved.backbone.critic_hidden_dims
        );

        let actor_branch = match &resolved.actor {
            BranchConfig::WithEncoder(cfg) => Some(EncoderBranch::init("actor", cfg, device)?),
            BranchConfig::NoEncoder { .. } => None,
        };
        let critic_branch = match &resolved.critic {
            BranchConfig::WithEncoder(cfg) => Some(EncoderBranch::init("critic", cfg, device)?),
            BranchConfig::NoEncoder { .. } => None,
        };

        Ok(Self {
            backbone,
            actor_branch,
            critic_branch,
            actor_obs_dim: resolved.actor.obs_dim(),
            critic_obs_dim: resolved.critic.obs_dim(),
        })
    }

    pub fn backbone(&self) -> &ActorCritic<B> {
        &self.backbone
    }

    pub fn actor_branch(&self) -> Option<&EncoderBranch<B>> {
        self.actor_branch.as_ref()
    }

    pub fn critic_branch(&self) -> Option<&EncoderBranch<B>> {
        self.critic_branch.as_ref()
    }

    pub fn actor_obs_dim(&self) -> usize {
        self.actor_obs_dim
    }

    pub fn critic_obs_dim(&self) -> usize {
        self.critic_obs_dim
    }

    fn actor_features(&self, obs: Tensor<B, 2>, state: &mut PolicyState<B>) -> ModelResult<Tensor<B, 2>> {
        match &self.actor_branch {
            Some(branch) => branch.features(obs, &mut state.actor),
            None => Ok(obs),
        }
    }

    fn actor_features_masked(
        &self,
        obs: Tensor<B, 3>,
        masks: &TrajectoryMask,
        hidden: Option<&HiddenStates<B>>,
    ) -> ModelResult<Tensor<B, 2>> {
        log::debug!("actor masked batch: {:?} -> {} steps", obs.dims(), masks.valid_count());
        match &self.actor_branch {
            Some(branch) => branch.features_masked(obs, masks, hidden),
            None => Ok(flatten_steps(unpad_trajectories(obs, masks)?)),
        }
    }

    /// Sample actions for one step and advance the actor state.
    pub fn act(&self, obs: Tensor<B, 2>, state: &mut PolicyState<B>) -> ModelResult<ActOutput<B>> {
        let features = self.actor_features(obs, state)?;
        self.backbone.act(features)
    }

    /// Sample actions for a padded trajectory batch.
    ///
    /// `hidden` is the actor's initial state per trajectory (zeros if `None`).
    /// Actions and distribution cover `[T * N, num_actions]`, time-major.
    pub fn act_masked(
        &self,
        obs: Tensor<B, 3>,
        masks: &TrajectoryMask,
        hidden: Option<&HiddenStates<B>>,
    ) -> ModelResult<ActOutput<B>> {
        let features = self.actor_features_masked(obs, masks, hidden)?;
        self.backbone.act(features)
    }

    /// Deterministic action mean for one step; advances the actor state.
    pub fn act_inference(&self, obs: Tensor<B, 2>, state: &mut PolicyState<B>) -> ModelResult<Tensor<B, 2>> {
        let features = self.actor_features(obs, state)?;
        self.backbone.act_inference(features)
    }

    /// Actor encoder segment `[batch, encoder_width]` to embedding.
    ///
    /// Advances the actor state exactly as [`Self::act_inference`] would.
    pub fn act_encoder_inference(
        &self,
        encoder_obs: Tensor<B, 2>,
        state: &mut PolicyState<B>,
    ) -> ModelResult<Tensor<B, 2>> {
        let branch = self.actor_branch.as_ref().ok_or(ModelError::NoEncoder("actor"))?;
        branch.encode(encoder_obs, &mut state.actor)
    }

    /// Action mean from a flatten segment and an actor embedding.
    pub fn act_backbone_inference(
        &self,
        flatten_obs: Tensor<B, 2>,
        embedding: Tensor<B, 2>,
    ) -> ModelResult<Tensor<B, 2>> {
        self.backbone.act_inference(Tensor::cat(vec![flatten_obs, embedding], 1))
    }

    /// Value estimate `[batch, 1]` for one step; advances the critic state.
    pub fn evaluate(&self, obs: Tensor<B, 2>, state: &mut PolicyState<B>) -> ModelResult<Tensor<B, 2>> {
        let features = match &self.critic_branch {
            Some(branch) => branch.features(obs, &mut state.critic)?,
            None => obs,
        };
        self.backbone.evaluate(features)
    }

    /// Value estimates `[T * N, 1]` for a padded trajectory batch.
    pub fn evaluate_masked(
        &self,
        obs: Tensor<B, 3>,
        masks: &TrajectoryMask,
        hidden: Option<&HiddenStates<B>>,
    ) -> ModelResult<Tensor<B, 2>> {
        log::debug!("critic masked batch: {:?} -> {} steps", obs.dims(), masks.valid_count());
        let features = match &self.critic_branch {
            Some(branch) => branch.features_masked(obs, masks, hidden)?,
            None => flatten_steps(unpad_trajectories(obs, masks)?),
        };
        self.backbone.evaluate(features)
    }

    /// Clear finished environments (`None` clears all).
    ///
    /// The critic state is only touched when the critic has an encoder.
    pub fn reset(&self, state: &mut PolicyState<B>, dones: Option<&[bool]>) -> ModelResult<()> {
        self.backbone.reset(dones);
        state.actor.reset(dones)?;
        if self.critic_branch.is_some() {
            state.critic.reset(dones)?;
        }
        Ok(())
    }

    /// Snapshot of `(actor, critic)` hidden states.
    ///
    /// The critic entry is `None` when the critic has no encoder; either entry
    /// is `None` while its carrier is idle.
    pub fn get_hidden_states(
        &self,
        state: &PolicyState<B>,
    ) -> (Option<HiddenStates<B>>, Option<HiddenStates<B>>) {
        let critic = match self.critic_branch {
            Some(_) => state.critic.snapshot(),
            None => None,
        };
        (state.actor.snapshot(), critic)
    }
}
