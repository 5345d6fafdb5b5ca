//! Policy modules.
//!
//! - [`ActorCritic`]: feed-forward actor/critic heads with a Gaussian policy
//! - [`UnifiedActorCritic`]: recurrent multi-branch actor-critic built on top
//!   of those heads
//! - [`DiagonalGaussian`]: action distribution returned by both

pub mod actor_critic;
pub mod distribution;
pub mod unified_actor_critic;


pub use actor_critic::{ActOutput, ActorCritic, ActorCriticConfig};
pub use distribution::DiagonalGaussian;
pub use unified_actor_critic::{EncoderBranch, PolicyState, UnifiedActorCritic};
