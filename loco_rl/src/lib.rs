//! # loco_rl: Recurrent Actor-Critic Policies for Legged Robots
//!
//! Policy architectures for locomotion and object-transport skills, built on
//! burn. The central model is [`UnifiedActorCritic`]: actor and critic
//! pipelines that fuse flattened proprioception with an encoded
//! high-dimensional modality (e.g. tactile arrays) through a recurrent
//! memory.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                       UnifiedActorCritic                            │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │   observation [batch, obs_dim]                                      │
//! │      │                                                              │
//! │      ├── flatten segment ──────────────────────────────┐            │
//! │      │                                                 │            │
//! │      └── encoder segment                               │            │
//! │             │                                          │            │
//! │             ▼                                          │            │
//! │      ┌─────────────┐   ┌──────────────┐   ┌─────────┐  │            │
//! │      │ Pre-encoder │──►│ Memory       │──►│ Encoder │──┤ concat     │
//! │      │ (optional)  │   │ GRU / LSTM   │   │ MLP/CNN │  │            │
//! │      └─────────────┘   └──────┬───────┘   └─────────┘  ▼            │
//! │                               │               ┌──────────────────┐  │
//! │                    RecurrentState (caller)    │ ActorCritic head │  │
//! │                                               └──────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Actor and critic are configured independently; either may skip the
//! encoder and feed its raw observation to the head.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use loco_rl::{BranchSettings, PolicyState, UnifiedActorCritic, UnifiedActorCriticConfig};
//!
//! let tactile = 17 * 13;
//! let branch = BranchSettings::plain()
//!     .with_encoder(-tactile, -tactile, vec![256, 128, 64], 64)
//!     .with_pre_encoder(vec![128, 128, 64], 64);
//! let config = UnifiedActorCriticConfig::new(obs_dim, obs_dim, 12)
//!     .with_actor(branch.clone())
//!     .with_critic(branch);
//!
//! let policy = UnifiedActorCritic::<B>::new(&config, &device)?;
//! let mut state = PolicyState::new();
//!
//! // rollout
//! let out = policy.act(obs, &mut state)?;
//! let value = policy.evaluate(critic_obs, &mut state)?;
//! policy.reset(&mut state, Some(&dones))?;
//!
//! // training on padded trajectories
//! let (padded, masks) = split_and_pad_trajectories(rollout_obs, &rollout_dones)?;
//! let out = policy.act_masked(padded, &masks, Some(&initial_hidden))?;
//! ```

pub mod checkpoint;
pub mod config;
pub mod core;
pub mod error;
pub mod modules;
pub mod nn;
pub mod utils;

pub use config::{
    resolve_widths, BranchConfig, BranchSettings, EncoderBranchConfig, NoiseStdType, ResolvedConfig,
    SegmentWidths, UnifiedActorCriticConfig,
};
pub use self::core::recurrent::{HiddenState, RecurrentCell, RecurrentCellType};
pub use self::core::state::{HiddenStates, RecurrentState};
pub use error::{ConfigError, ModelError, ModelResult};
pub use modules::{
    ActOutput, ActorCritic, ActorCriticConfig, DiagonalGaussian, EncoderBranch, PolicyState, UnifiedActorCritic,
};
pub use nn::{Activation, Embedder, EmbedderConfig, EncoderArchitecture, Memory, MemoryConfig};
pub use utils::trajectories::{gather_initial_states, split_and_pad_trajectories, unpad_trajectories, TrajectoryMask};
