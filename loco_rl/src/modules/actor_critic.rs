//! Feed-forward actor-critic heads over a fixed-size feature vector.
//!
//! - Actor: MLP producing the action mean, plus a learned per-action noise
//!   std (stored directly or as its log, see [`NoiseStdType`]).
//! - Critic: MLP producing a scalar value.
//!
//! The heads keep no per-environment state; [`ActorCritic::reset`] exists so
//! callers can treat every policy uniformly.

use burn::module::{Ignored, Module, Param};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

use super::distribution::DiagonalGaussian;
use crate::config::NoiseStdType;
use crate::error::{ConfigError, ModelError, ModelResult};
use crate::nn::activation::Activation;
use crate::nn::mlp::{Mlp, MlpConfig};

/// Configuration for [`ActorCritic`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorCriticConfig {
    pub num_actor_obs: usize,
    pub num_critic_obs: usize,
    pub num_actions: usize,
    pub actor_hidden_dims: Vec<usize>,
    pub critic_hidden_dims: Vec<usize>,
    pub activation: Activation,
    pub init_noise_std: f32,
    pub noise_std_type: NoiseStdType,
}

impl ActorCriticConfig {
    pub fn new(num_actor_obs: usize, num_critic_obs: usize, num_actions: usize) -> Self {
        Self {
            num_actor_obs,
            num_critic_obs,
            num_actions,
            actor_hidden_dims: vec![256, 256, 256],
            critic_hidden_dims: vec![256, 256, 256],
            activation: Activation::Elu,
            init_noise_std: 1.0,
            noise_std_type: NoiseStdType::Scalar,
        }
    }

    pub fn with_hidden_dims(mut self, actor: Vec<usize>, critic: Vec<usize>) -> Self {
        self.actor_hidden_dims = actor;
        self.critic_hidden_dims = critic;
        self
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_init_noise_std(mut self, std: f32) -> Self {
        self.init_noise_std = std;
        self
    }

    pub fn with_noise_std_type(mut self, noise_std_type: NoiseStdType) -> Self {
        self.noise_std_type = noise_std_type;
        self
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<ActorCritic<B>, ConfigError> {
        for (field, value) in [
            ("num_actor_obs", self.num_actor_obs),
            ("num_critic_obs", self.num_critic_obs),
            ("num_actions", self.num_actions),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroSized { field });
            }
        }
        if self.init_noise_std.is_nan() || self.init_noise_std <= 0.0 {
            return Err(ConfigError::ZeroSized { field: "init_noise_std" });
        }

        let actor = MlpConfig::new(self.num_actor_obs, self.actor_hidden_dims.clone(), self.num_actions)
            .with_activation(self.activation)
            .init(device);
        let critic = MlpConfig::new(self.num_critic_obs, self.critic_hidden_dims.clone(), 1)
            .with_activation(self.activation)
            .init(device);

        let initial = match self.noise_std_type {
            NoiseStdType::Scalar => self.init_noise_std,
            NoiseStdType::Log => self.init_noise_std.ln(),
        };
        let std = Param::from_tensor(Tensor::full([self.num_actions], initial, device));

        Ok(ActorCritic {
            actor,
            critic,
            std,
            noise_std_type: Ignored(self.noise_std_type),
        })
    }
}

/// Sampled actions together with the distribution they were drawn from.
#[derive(Debug, Clone)]
pub struct ActOutput<B: Backend> {
    /// `[batch, num_actions]`
    pub actions: Tensor<B, 2>,
    pub distribution: DiagonalGaussian<B>,
}

#[derive(Module, Debug)]
pub struct ActorCritic<B: Backend> {
    actor: Mlp<B>,
    critic: Mlp<B>,
    /// Per-action std, or its log.
    std: Param<Tensor<B, 1>>,
    noise_std_type: Ignored<NoiseStdType>,
}

impl<B: Backend> ActorCritic<B> {
    pub const IS_RECURRENT: bool = false;

    pub fn num_actor_obs(&self) -> usize {
        self.actor.input_dim()
    }

    pub fn num_critic_obs(&self) -> usize {
        self.critic.input_dim()
    }

    pub fn num_actions(&self) -> usize {
        self.actor.output_dim()
    }

    pub fn noise_std_type(&self) -> NoiseStdType {
        *self.noise_std_type
    }

    /// Current per-action standard deviation: `[num_actions]`.
    pub fn action_std(&self) -> Tensor<B, 1> {
        match *self.noise_std_type {
            NoiseStdType::Scalar => self.std.val(),
            NoiseStdType::Log => self.std.val().exp(),
        }
    }

    fn check_width(context: &'static str, expected: usize, obs: &Tensor<B, 2>) -> ModelResult<()> {
        let actual = obs.dims()[1];
        if actual != expected {
            return Err(ModelError::ShapeMismatch {
                context,
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Action distribution for a batch of actor features.
    pub fn distribution(&self, obs: Tensor<B, 2>) -> ModelResult<DiagonalGaussian<B>> {
        Self::check_width("actor observation width", self.num_actor_obs(), &obs)?;
        let batch = obs.dims()[0];
        let mean = self.actor.forward(obs);
        let std = self.action_std().unsqueeze_dim::<2>(0).repeat_dim(0, batch);
        Ok(DiagonalGaussian::new(mean, std))
    }

    /// Sample actions from the current policy.
    pub fn act(&self, obs: Tensor<B, 2>) -> ModelResult<ActOutput<B>> {
        let distribution = self.distribution(obs)?;
        Ok(ActOutput {
            actions: distribution.sample(),
            distribution,
        })
    }

    /// Deterministic action: the distribution mean.
    pub fn act_inference(&self, obs: Tensor<B, 2>) -> ModelResult<Tensor<B, 2>> {
        Self::check_width("actor observation width", self.num_actor_obs(), &obs)?;
        Ok(self.actor.forward(obs))
    }

    /// Value estimate: `[batch, 1]`.
    pub fn evaluate(&self, obs: Tensor<B, 2>) -> ModelResult<Tensor<B, 2>> {
        Self::check_width("critic observation width", self.num_critic_obs(), &obs)?;
        Ok(self.critic.forward(obs))
    }

    /// Nothing to clear.
    pub fn reset(&self, _dones: Option<&[bool]>) {}
}
