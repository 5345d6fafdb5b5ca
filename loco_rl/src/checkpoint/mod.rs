//! Policy checkpointing.
//!
//! - Saving at a configurable iteration interval
//! - Best policy tracking based on a metric (e.g. mean reward)
//! - Cleanup of old checkpoints
//! - Rebuilding a policy from the stored config for resuming or distillation
//!
//! ```rust,ignore
//! use loco_rl::checkpoint::{Checkpointer, CheckpointerConfig};
//!
//! let mut checkpointer = Checkpointer::new(
//!     CheckpointerConfig::new("./logs/transport").with_save_interval(50).with_keep_last_n(5),
//! )?;
//!
//! if checkpointer.should_save(iteration) {
//!     checkpointer.save(&policy, &policy_config, iteration, Some(mean_reward))?;
//! }
//!
//! let (policy, iteration) = checkpointer.load_latest::<B>(&device)?;
//! ```

pub mod checkpointer;

pub use checkpointer::{CheckpointError, CheckpointInfo, Checkpointer, CheckpointerConfig};
