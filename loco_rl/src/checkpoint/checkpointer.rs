//! Policy checkpointing.
//!
//! Weights are written with burn's `BinFileRecorder` as
//! `checkpoint_{step:08}.bin` (and `best.bin`). Every weights file gets a
//! sibling `.json` holding the [`UnifiedActorCriticConfig`] that policy was
//! built from, so checkpoints saved under different configs stay loadable.
//! Loading reads the JSON first, rebuilds the model, then loads the weights
//! into it.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::Backend;
use thiserror::Error;

use crate::config::UnifiedActorCriticConfig;
use crate::error::ConfigError;
use crate::modules::UnifiedActorCritic;

const BEST_FILE: &str = "best.bin";

/// Configuration for the checkpointer.
#[derive(Debug, Clone)]
pub struct CheckpointerConfig {
    /// Directory to store checkpoints.
    pub checkpoint_dir: PathBuf,
    /// Iterations between checkpoint saves.
    pub save_interval: usize,
    /// Number of recent checkpoints to keep (0 = keep all).
    pub keep_last_n: usize,
    /// Whether to track and save the best policy.
    pub save_best: bool,
}

impl Default for CheckpointerConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: PathBuf::from("./checkpoints"),
            save_interval: 50,
            keep_last_n: 5,
            save_best: true,
        }
    }
}

impl CheckpointerConfig {
    pub fn new(checkpoint_dir: impl Into<PathBuf>) -> Self {
        Self {
            checkpoint_dir: checkpoint_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_save_interval(mut self, interval: usize) -> Self {
        self.save_interval = interval;
        self
    }

    pub fn with_keep_last_n(mut self, n: usize) -> Self {
        self.keep_last_n = n;
        self
    }

    pub fn with_save_best(mut self, save_best: bool) -> Self {
        self.save_best = save_best;
        self
    }
}

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint io error: {0}")]
    Io(#[from] io::Error),

    #[error("recorder error: {0}")]
    Recorder(String),

    #[error("checkpoint policy config: {0}")]
    Config(#[from] ConfigError),

    #[error("no checkpoints found")]
    NoCheckpoints,
}

/// Checkpoint metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointInfo {
    pub path: PathBuf,
    /// Iteration at which the checkpoint was saved.
    pub step: usize,
    /// Metric passed at save time (e.g. mean episode reward).
    pub metric: Option<f32>,
}

/// Saves policies at regular intervals, tracks the best one and prunes old
/// checkpoints.
pub struct Checkpointer {
    config: CheckpointerConfig,
    best_metric: f32,
    checkpoint_history: Vec<CheckpointInfo>,
}

impl Checkpointer {
    /// Creates the checkpoint directory if it doesn't exist.
    pub fn new(config: CheckpointerConfig) -> Result<Self, CheckpointError> {
        fs::create_dir_all(&config.checkpoint_dir)?;

        Ok(Self {
            config,
            best_metric: f32::NEG_INFINITY,
            checkpoint_history: Vec::new(),
        })
    }

    pub fn config(&self) -> &CheckpointerConfig {
        &self.config
    }

    pub fn should_save(&self, step: usize) -> bool {
        self.config.save_interval > 0 && step > 0 && step % self.config.save_interval == 0
    }

    pub fn best_metric(&self) -> f32 {
        self.best_metric
    }

    fn recorder() -> BinFileRecorder<FullPrecisionSettings> {
        BinFileRecorder::<FullPrecisionSettings>::new()
    }

    /// Config file stored next to the weights file at `weights`.
    pub fn config_path(weights: &Path) -> PathBuf {
        weights.with_extension("json")
    }

    fn write<B: Backend>(
        policy: &UnifiedActorCritic<B>,
        policy_config: &UnifiedActorCriticConfig,
        path: &Path,
    ) -> Result<(), CheckpointError> {
        fs::write(Self::config_path(path), policy_config.to_json_string()?)?;
        policy
            .clone()
            .save_file(path.to_path_buf(), &Self::recorder())
            .map_err(|e| CheckpointError::Recorder(e.to_string()))?;
        Ok(())
    }

    /// Save `policy` (built from `policy_config`) at `step`.
    pub fn save<B: Backend>(
        &mut self,
        policy: &UnifiedActorCritic<B>,
        policy_config: &UnifiedActorCriticConfig,
        step: usize,
        metric: Option<f32>,
    ) -> Result<PathBuf, CheckpointError> {
        let path = self.config.checkpoint_dir.join(format!("checkpoint_{:08}.bin", step));
        Self::write(policy, policy_config, &path)?;
        log::info!("saved checkpoint {} (step {})", path.display(), step);

        self.checkpoint_history.push(CheckpointInfo {
            path: path.clone(),
            step,
            metric,
        });

        if self.config.save_best {
            if let Some(m) = metric.filter(|&m| m > self.best_metric) {
                self.best_metric = m;
                Self::write(policy, policy_config, &self.config.checkpoint_dir.join(BEST_FILE))?;
                log::info!("new best policy at step {} (metric {:.3})", step, m);
            }
        }

        self.cleanup_old_checkpoints();
        Ok(path)
    }

    /// Policy configuration saved alongside the weights file at `weights`.
    pub fn load_config(&self, weights: &Path) -> Result<UnifiedActorCriticConfig, CheckpointError> {
        let path = Self::config_path(weights);
        if !path.exists() {
            return Err(CheckpointError::NoCheckpoints);
        }
        Ok(UnifiedActorCriticConfig::from_json_file(path)?)
    }

    /// Rebuild the policy from the stored config and load weights from `path`.
    pub fn load<B: Backend>(
        &self,
        path: &Path,
        device: &B::Device,
    ) -> Result<(UnifiedActorCritic<B>, UnifiedActorCriticConfig), CheckpointError> {
        let policy_config = self.load_config(path)?;
        let template = UnifiedActorCritic::<B>::new(&policy_config, device)?;
        let policy = template
            .load_file(path.to_path_buf(), &Self::recorder(), device)
            .map_err(|e| CheckpointError::Recorder(e.to_string()))?;
        Ok((policy, policy_config))
    }

    pub fn load_best<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Result<(UnifiedActorCritic<B>, UnifiedActorCriticConfig), CheckpointError> {
        let best_path = self.config.checkpoint_dir.join(BEST_FILE);
        if !best_path.exists() {
            return Err(CheckpointError::NoCheckpoints);
        }
        self.load(&best_path, device)
    }

    /// Latest checkpoint and the step it was saved at.
    pub fn load_latest<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Result<(UnifiedActorCritic<B>, usize), CheckpointError> {
        let latest = self.find_latest_checkpoint()?;
        let (policy, _) = self.load(&latest.path, device)?;
        Ok((policy, latest.step))
    }

    pub fn find_latest_checkpoint(&self) -> Result<CheckpointInfo, CheckpointError> {
        self.list_checkpoints()?.pop().ok_or(CheckpointError::NoCheckpoints)
    }

    /// All `checkpoint_*.bin` files in the directory, oldest first.
    pub fn list_checkpoints(&self) -> Result<Vec<CheckpointInfo>, CheckpointError> {
        let mut checkpoints: Vec<CheckpointInfo> = fs::read_dir(&self.config.checkpoint_dir)?
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let path = e.path();
                let step = path
                    .file_name()?
                    .to_str()?
                    .strip_prefix("checkpoint_")?
                    .strip_suffix(".bin")?
                    .parse()
                    .ok()?;
                Some(CheckpointInfo {
                    path,
                    step,
                    metric: None,
                })
            })
            .collect();

        checkpoints.sort_by_key(|c| c.step);
        Ok(checkpoints)
    }

    /// Keep only the last N checkpoints saved by this checkpointer.
    fn cleanup_old_checkpoints(&mut self) {
        if self.config.keep_last_n == 0 {
            return;
        }

        while self.checkpoint_history.len() > self.config.keep_last_n {
            let old = self.checkpoint_history.remove(0);
            for path in [old.path.clone(), Self::config_path(&old.path)] {
                if let Err(e) = fs::remove_file(&path) {
                    log::warn!("failed to remove old checkpoint file {}: {}", path.display(), e);
                } else {
                    log::debug!("removed old checkpoint file {}", path.display());
                }
            }
        }
    }
}
