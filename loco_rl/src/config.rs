//! Policy configuration and its resolution into per-branch layouts.
//!
//! [`UnifiedActorCriticConfig`] is the user-facing, serde-loadable record.
//! [`UnifiedActorCriticConfig::resolve`] validates it once and produces a
//! [`ResolvedConfig`]: one [`BranchConfig`] per pipeline (actor, critic) plus
//! the configuration of the base actor-critic heads.
//!
//! # Observation slicing
//!
//! An encoder branch splits its observation into two segments:
//!
//! ```text
//! obs:  [ ---- flatten ---- | ... | ---- encoder ---- ]
//!         0 .. flatten_width        obs_dim - encoder_width .. obs_dim
//! ```
//!
//! with widths resolved from signed indices:
//!
//! - `encoder_width = |start|` if `start < 0`, else `obs_dim - start`
//! - `flatten_width = end` if `end > 0`, else `obs_dim - |end|`
//!
//! The segments normally tile the observation. A gap (columns used by
//! neither segment) or an overlap (columns used by both) is accepted but
//! logged as a warning.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::recurrent::RecurrentCellType;
use crate::error::ConfigError;
use crate::modules::actor_critic::ActorCriticConfig;
use crate::nn::activation::Activation;
use crate::nn::embedder::{EmbedderConfig, EncoderArchitecture};
use crate::nn::memory::MemoryConfig;

// ============================================================================
// Defaults
// ============================================================================

fn default_backbone_dims() -> Vec<usize> {
    vec![512, 256, 128]
}

fn default_rnn_hidden_size() -> usize {
    256
}

fn default_rnn_num_layers() -> usize {
    1
}

fn default_init_noise_std() -> f32 {
    1.0
}

// ============================================================================
// Noise parameterisation
// ============================================================================

/// How the action standard deviation parameter is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseStdType {
    /// The parameter is the std itself.
    #[default]
    Scalar,
    /// The parameter is `ln(std)`.
    Log,
}

impl FromStr for NoiseStdType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "scalar" => Ok(NoiseStdType::Scalar),
            "log" => Ok(NoiseStdType::Log),
            other => Err(ConfigError::UnknownNoiseStdType(other.to_string())),
        }
    }
}

impl fmt::Display for NoiseStdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoiseStdType::Scalar => write!(f, "scalar"),
            NoiseStdType::Log => write!(f, "log"),
        }
    }
}

// ============================================================================
// Per-branch settings
// ============================================================================

/// Settings for one pipeline (actor or critic) as written by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchSettings {
    #[serde(default)]
    pub with_encoder: bool,
    /// Signed end index of the flatten segment.
    #[serde(default)]
    pub flatten_obs_end_idx: Option<i64>,
    /// Signed start index of the encoder segment.
    #[serde(default)]
    pub encoder_obs_start_idx: Option<i64>,
    #[serde(default)]
    pub with_pre_encoder: bool,
    #[serde(default)]
    pub pre_encoder_hidden_dims: Vec<usize>,
    #[serde(default)]
    pub pre_encoder_embedding_dim: Option<usize>,
    #[serde(default)]
    pub pre_encoder_architecture: EncoderArchitecture,
    #[serde(default)]
    pub encoder_hidden_dims: Option<Vec<usize>>,
    #[serde(default)]
    pub encoder_embedding_dim: Option<usize>,
    #[serde(default)]
    pub encoder_architecture: EncoderArchitecture,
    /// Hidden widths of the backbone head (action mean or value).
    #[serde(default = "default_backbone_dims")]
    pub hidden_dims: Vec<usize>,
}

impl Default for BranchSettings {
    fn default() -> Self {
        Self {
            with_encoder: false,
            flatten_obs_end_idx: None,
            encoder_obs_start_idx: None,
            with_pre_encoder: false,
            pre_encoder_hidden_dims: Vec::new(),
            pre_encoder_embedding_dim: None,
            pre_encoder_architecture: EncoderArchitecture::default(),
            encoder_hidden_dims: None,
            encoder_embedding_dim: None,
            encoder_architecture: EncoderArchitecture::default(),
            hidden_dims: default_backbone_dims(),
        }
    }
}

impl BranchSettings {
    /// Branch that feeds its raw observation to the backbone.
    pub fn plain() -> Self {
        Self::default()
    }

    /// Enable the encoder over the trailing observation segment.
    pub fn with_encoder(
        mut self,
        flatten_obs_end_idx: i64,
        encoder_obs_start_idx: i64,
        encoder_hidden_dims: Vec<usize>,
        encoder_embedding_dim: usize,
    ) -> Self {
        self.with_encoder = true;
        self.flatten_obs_end_idx = Some(flatten_obs_end_idx);
        self.encoder_obs_start_idx = Some(encoder_obs_start_idx);
        self.encoder_hidden_dims = Some(encoder_hidden_dims);
        self.encoder_embedding_dim = Some(encoder_embedding_dim);
        self
    }

    /// Insert an embedding stage between the raw encoder segment and memory.
    pub fn with_pre_encoder(mut self, hidden_dims: Vec<usize>, embedding_dim: usize) -> Self {
        self.with_pre_encoder = true;
        self.pre_encoder_hidden_dims = hidden_dims;
        self.pre_encoder_embedding_dim = Some(embedding_dim);
        self
    }

    pub fn with_pre_encoder_architecture(mut self, architecture: EncoderArchitecture) -> Self {
        self.pre_encoder_architecture = architecture;
        self
    }

    pub fn with_encoder_architecture(mut self, architecture: EncoderArchitecture) -> Self {
        self.encoder_architecture = architecture;
        self
    }

    pub fn with_hidden_dims(mut self, hidden_dims: Vec<usize>) -> Self {
        self.hidden_dims = hidden_dims;
        self
    }
}

// ============================================================================
// Width resolution
// ============================================================================

/// Resolved widths of the two observation segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentWidths {
    pub flatten: usize,
    pub encoder: usize,
}

impl SegmentWidths {
    /// Columns covered by neither segment (positive) or by both (negative).
    pub fn gap(&self, obs_dim: usize) -> i64 {
        obs_dim as i64 - self.flatten as i64 - self.encoder as i64
    }
}

/// Resolve signed segment indices against `obs_dim`.
pub fn resolve_widths(
    branch: &'static str,
    obs_dim: usize,
    flatten_obs_end_idx: i64,
    encoder_obs_start_idx: i64,
) -> Result<SegmentWidths, ConfigError> {
    let dim = obs_dim as i64;

    let encoder = if encoder_obs_start_idx < 0 {
        encoder_obs_start_idx.saturating_abs()
    } else {
        dim - encoder_obs_start_idx
    };
    let flatten = if flatten_obs_end_idx > 0 {
        flatten_obs_end_idx
    } else {
        dim.saturating_sub(flatten_obs_end_idx.saturating_abs())
    };

    for (segment, width) in [("encoder", encoder), ("flatten", flatten)] {
        if width <= 0 || width > dim {
            return Err(ConfigError::InvalidWidth {
                branch,
                segment,
                width,
                obs_dim,
            });
        }
    }

    Ok(SegmentWidths {
        flatten: flatten as usize,
        encoder: encoder as usize,
    })
}

// ============================================================================
// Resolved layout
// ============================================================================

/// Construction recipe for an encoder branch.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderBranchConfig {
    pub obs_dim: usize,
    pub flatten_width: usize,
    pub encoder_width: usize,
    pub pre_encoder: Option<EmbedderConfig>,
    pub memory: MemoryConfig,
    pub encoder: EmbedderConfig,
}

impl EncoderBranchConfig {
    pub fn embedding_dim(&self) -> usize {
        self.encoder.embedding_dim
    }
}

/// Layout of one pipeline, decided once at construction.
#[derive(Debug, Clone, PartialEq)]
pub enum BranchConfig {
    /// Raw observation goes straight to the backbone head.
    NoEncoder { obs_dim: usize },
    /// Trailing segment goes through pre-encoder, memory and encoder.
    WithEncoder(EncoderBranchConfig),
}

impl BranchConfig {
    /// Input width of the backbone head fed by this branch.
    pub fn backbone_input_dim(&self) -> usize {
        match self {
            BranchConfig::NoEncoder { obs_dim } => *obs_dim,
            BranchConfig::WithEncoder(cfg) => cfg.flatten_width + cfg.embedding_dim(),
        }
    }

    pub fn obs_dim(&self) -> usize {
        match self {
            BranchConfig::NoEncoder { obs_dim } => *obs_dim,
            BranchConfig::WithEncoder(cfg) => cfg.obs_dim,
        }
    }

    pub fn has_encoder(&self) -> bool {
        matches!(self, BranchConfig::WithEncoder(_))
    }
}

/// Fully validated model layout.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub actor: BranchConfig,
    pub critic: BranchConfig,
    pub backbone: ActorCriticConfig,
}

// ============================================================================
// Top-level configuration
// ============================================================================

/// Configuration of a [`UnifiedActorCritic`](crate::modules::UnifiedActorCritic).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedActorCriticConfig {
    pub actor_obs_dim: usize,
    pub critic_obs_dim: usize,
    pub num_actions: usize,
    #[serde(default)]
    pub actor: BranchSettings,
    #[serde(default)]
    pub critic: BranchSettings,
    #[serde(default)]
    pub encoder_rnn_type: RecurrentCellType,
    #[serde(default = "default_rnn_hidden_size")]
    pub encoder_rnn_hidden_size: usize,
    #[serde(default = "default_rnn_num_layers")]
    pub encoder_rnn_num_layers: usize,
    #[serde(default)]
    pub pre_encoder_activation: Activation,
    #[serde(default)]
    pub pre_encoder_final_activation: Option<Activation>,
    #[serde(default)]
    pub encoder_activation: Activation,
    #[serde(default)]
    pub encoder_final_activation: Option<Activation>,
    /// Activation of the backbone heads.
    #[serde(default)]
    pub activation: Activation,
    #[serde(default = "default_init_noise_std")]
    pub init_noise_std: f32,
    #[serde(default)]
    pub noise_std_type: NoiseStdType,
    /// Keys not recognised by this version; reported and ignored.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl UnifiedActorCriticConfig {
    pub fn new(actor_obs_dim: usize, critic_obs_dim: usize, num_actions: usize) -> Self {
        Self {
            actor_obs_dim,
            critic_obs_dim,
            num_actions,
            actor: BranchSettings::default(),
            critic: BranchSettings::default(),
            encoder_rnn_type: RecurrentCellType::default(),
            encoder_rnn_hidden_size: default_rnn_hidden_size(),
            encoder_rnn_num_layers: default_rnn_num_layers(),
            pre_encoder_activation: Activation::default(),
            pre_encoder_final_activation: None,
            encoder_activation: Activation::default(),
            encoder_final_activation: None,
            activation: Activation::default(),
            init_noise_std: default_init_noise_std(),
            noise_std_type: NoiseStdType::default(),
            extra: BTreeMap::new(),
        }
    }

    pub fn with_actor(mut self, actor: BranchSettings) -> Self {
        self.actor = actor;
        self
    }

    pub fn with_critic(mut self, critic: BranchSettings) -> Self {
        self.critic = critic;
        self
    }

    pub fn with_rnn(mut self, cell: RecurrentCellType, hidden_size: usize, num_layers: usize) -> Self {
        self.encoder_rnn_type = cell;
        self.encoder_rnn_hidden_size = hidden_size;
        self.encoder_rnn_num_layers = num_layers;
        self
    }

    pub fn with_pre_encoder_activation(mut self, activation: Activation, last: Option<Activation>) -> Self {
        self.pre_encoder_activation = activation;
        self.pre_encoder_final_activation = last;
        self
    }

    pub fn with_encoder_activation(mut self, activation: Activation, last: Option<Activation>) -> Self {
        self.encoder_activation = activation;
        self.encoder_final_activation = last;
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

    /// Parse from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Read and parse a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Names of keys that were present in the source but are not understood.
    pub fn unknown_keys(&self) -> Vec<&str> {
        self.extra.keys().map(String::as_str).collect()
    }

    /// Validate and lay out both branches and the backbone.
    pub fn resolve(&self) -> Result<ResolvedConfig, ConfigError> {
        if !self.extra.is_empty() {
            log::warn!(
                "UnifiedActorCritic got unexpected arguments, which will be ignored: {:?}",
                self.unknown_keys()
            );
        }
        if self.num_actions == 0 {
            return Err(ConfigError::ZeroSized { field: "num_actions" });
        }
        if self.init_noise_std.is_nan() || self.init_noise_std <= 0.0 {
            return Err(ConfigError::ZeroSized { field: "init_noise_std" });
        }

        let actor = self.resolve_branch("actor", self.actor_obs_dim, &self.actor)?;
        let critic = self.resolve_branch("critic", self.critic_obs_dim, &self.critic)?;

        let backbone = ActorCriticConfig {
            num_actor_obs: actor.backbone_input_dim(),
            num_critic_obs: critic.backbone_input_dim(),
            num_actions: self.num_actions,
            actor_hidden_dims: self.actor.hidden_dims.clone(),
            critic_hidden_dims: self.critic.hidden_dims.clone(),
            activation: self.activation,
            init_noise_std: self.init_noise_std,
            noise_std_type: self.noise_std_type,
        };

        Ok(ResolvedConfig { actor, critic, backbone })
    }

    fn resolve_branch(
        &self,
        branch: &'static str,
        obs_dim: usize,
        settings: &BranchSettings,
    ) -> Result<BranchConfig, ConfigError> {
        if obs_dim == 0 {
            return Err(ConfigError::ZeroSized {
                field: if branch == "actor" { "actor_obs_dim" } else { "critic_obs_dim" },
            });
        }
        if !settings.with_encoder {
            return Ok(BranchConfig::NoEncoder { obs_dim });
        }

        let missing = |field| ConfigError::MissingField { branch, field };
        let end = settings.flatten_obs_end_idx.ok_or_else(|| missing("flatten_obs_end_idx"))?;
        let start = settings.encoder_obs_start_idx.ok_or_else(|| missing("encoder_obs_start_idx"))?;
        let encoder_hidden_dims = settings
            .encoder_hidden_dims
            .clone()
            .ok_or_else(|| missing("encoder_hidden_dims"))?;
        let encoder_embedding_dim = settings
            .encoder_embedding_dim
            .ok_or_else(|| missing("encoder_embedding_dim"))?;

        let widths = resolve_widths(branch, obs_dim, end, start)?;
        match widths.gap(obs_dim) {
            0 => {}
            gap if gap > 0 => log::warn!(
                "{} branch: {} observation columns [{}, {}) are used by neither segment",
                branch,
                gap,
                widths.flatten,
                obs_dim - widths.encoder
            ),
            overlap => log::warn!(
                "{} branch: {} observation columns [{}, {}) feed both the flatten and encoder segments",
                branch,
                -overlap,
                obs_dim - widths.encoder,
                widths.flatten
            ),
        }

        let pre_encoder = if settings.with_pre_encoder {
            let embedding_dim = settings
                .pre_encoder_embedding_dim
                .ok_or_else(|| missing("pre_encoder_embedding_dim"))?;
            Some(
                EmbedderConfig::new(settings.pre_encoder_hidden_dims.clone(), embedding_dim)
                    .with_activation(self.pre_encoder_activation)
                    .with_final_activation(self.pre_encoder_final_activation)
                    .with_architecture(settings.pre_encoder_architecture.clone()),
            )
        } else {
            None
        };

        let memory_input = pre_encoder
            .as_ref()
            .map(|cfg| cfg.embedding_dim)
            .unwrap_or(widths.encoder);
        let memory = MemoryConfig::new(memory_input, self.encoder_rnn_hidden_size)
            .with_num_layers(self.encoder_rnn_num_layers)
            .with_cell(self.encoder_rnn_type);

        let encoder = EmbedderConfig::new(encoder_hidden_dims, encoder_embedding_dim)
            .with_activation(self.encoder_activation)
            .with_final_activation(self.encoder_final_activation)
            .with_architecture(settings.encoder_architecture.clone());

        Ok(BranchConfig::WithEncoder(EncoderBranchConfig {
            obs_dim,
            flatten_width: widths.flatten,
            encoder_width: widths.encoder,
            pre_encoder,
            memory,
            encoder,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::io::Write;
    use std::sync::Once;

    const TACTILE: i64 = 17 * 13;

    thread_local! {
        static WARNINGS: RefCell<Vec<String>> = RefCell::new(Vec::new());
    }

    /// Records warnings per test thread.
    struct WarningRecorder;

    impl log::Log for WarningRecorder {
        fn enabled(&self, metadata: &log::Metadata) -> bool {
            metadata.level() <= log::Level::Warn
        }

        fn log(&self, record: &log::Record) {
            if self.enabled(record.metadata()) {
                WARNINGS.with(|w| w.borrow_mut().push(record.args().to_string()));
            }
        }

        fn flush(&self) {}
    }

    static RECORDER: WarningRecorder = WarningRecorder;
    static INSTALL: Once = Once::new();

    /// Warnings logged on this thread while `f` runs.
    fn warnings_during<T>(f: impl FnOnce() -> T) -> (T, Vec<String>) {
        INSTALL.call_once(|| {
            if log::set_logger(&RECORDER).is_ok() {
                log::set_max_level(log::LevelFilter::Warn);
            }
        });
        WARNINGS.with(|w| w.borrow_mut().clear());
        let out = f();
        let logged = WARNINGS.with(|w| w.borrow_mut().drain(..).collect());
        (out, logged)
    }

    fn tactile_config() -> UnifiedActorCriticConfig {
        let branch = BranchSettings::plain()
            .with_encoder(-TACTILE, -TACTILE, vec![256, 128, 64], 64)
            .with_pre_encoder(vec![128, 128, 64], 64);
        UnifiedActorCriticConfig::new(300, 300, 12)
            .with_actor(branch.clone())
            .with_critic(branch)
    }

    #[test]
    fn test_width_sign_conventions() {
        let w = resolve_widths("actor", 300, 270, 270).unwrap();
        assert_eq!(w, SegmentWidths { flatten: 270, encoder: 30 });

        let w = resolve_widths("actor", 300, -30, -30).unwrap();
        assert_eq!(w, SegmentWidths { flatten: 270, encoder: 30 });

        // zero end index keeps the whole observation in the flatten segment
        let w = resolve_widths("actor", 300, 0, -30).unwrap();
        assert_eq!(w.flatten, 300);
        assert_eq!(w.gap(300), -30);
    }

    #[test]
    fn test_invalid_widths_rejected() {
        assert!(matches!(
            resolve_widths("critic", 100, 50, 100),
            Err(ConfigError::InvalidWidth { segment: "encoder", width: 0, .. })
        ));
        assert!(matches!(
            resolve_widths("critic", 100, 50, -101),
            Err(ConfigError::InvalidWidth { segment: "encoder", .. })
        ));
        assert!(matches!(
            resolve_widths("critic", 100, 150, 50),
            Err(ConfigError::InvalidWidth { segment: "flatten", .. })
        ));
        assert!(matches!(
            resolve_widths("critic", 100, -100, 50),
            Err(ConfigError::InvalidWidth { segment: "flatten", .. })
        ));
        assert!(matches!(
            resolve_widths("actor", 300, 270, i64::MIN),
            Err(ConfigError::InvalidWidth { segment: "encoder", .. })
        ));
        assert!(matches!(
            resolve_widths("actor", 300, i64::MIN, 270),
            Err(ConfigError::InvalidWidth { segment: "flatten", .. })
        ));
    }

    #[test]
    fn test_resolve_tactile_layout() {
        let resolved = tactile_config().resolve().unwrap();

        let BranchConfig::WithEncoder(actor) = &resolved.actor else {
            panic!("actor should have an encoder");
        };
        assert_eq!(actor.flatten_width, 300 - 221);
        assert_eq!(actor.encoder_width, 221);
        assert_eq!(actor.memory.input_size, 64);
        assert_eq!(actor.memory.hidden_size, 256);
        assert_eq!(resolved.backbone.num_actor_obs, 79 + 64);
        assert_eq!(resolved.backbone.num_critic_obs, 79 + 64);
        assert_eq!(resolved.backbone.actor_hidden_dims, vec![512, 256, 128]);
    }

    #[test]
    fn test_memory_sized_to_raw_segment_without_pre_encoder() {
        let config = UnifiedActorCriticConfig::new(300, 300, 12)
            .with_actor(BranchSettings::plain().with_encoder(270, 270, vec![256, 128, 64], 64));
        let resolved = config.resolve().unwrap();

        let BranchConfig::WithEncoder(actor) = &resolved.actor else {
            panic!("actor should have an encoder");
        };
        assert!(actor.pre_encoder.is_none());
        assert_eq!(actor.memory.input_size, 30);
        assert_eq!(resolved.actor.backbone_input_dim(), 334);
        assert_eq!(resolved.critic, BranchConfig::NoEncoder { obs_dim: 300 });
    }

    #[test]
    fn test_missing_encoder_fields() {
        let mut settings = BranchSettings::plain().with_encoder(270, 270, vec![64], 64);
        settings.encoder_embedding_dim = None;
        let err = UnifiedActorCriticConfig::new(300, 300, 12)
            .with_critic(settings)
            .resolve()
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingField {
                branch: "critic",
                field: "encoder_embedding_dim"
            }
        );

        let mut settings = BranchSettings::plain().with_encoder(270, 270, vec![64], 64);
        settings.with_pre_encoder = true;
        let err = UnifiedActorCriticConfig::new(300, 300, 12)
            .with_actor(settings)
            .resolve()
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { field: "pre_encoder_embedding_dim", .. }));
    }

    #[test]
    fn test_gap_and_overlap_still_resolve() {
        let gap = UnifiedActorCriticConfig::new(100, 100, 4)
            .with_actor(BranchSettings::plain().with_encoder(60, -20, vec![], 8));
        let (resolved, warnings) = warnings_during(|| gap.resolve());
        assert_eq!(resolved.unwrap().backbone.num_actor_obs, 68);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("actor branch: 20 observation columns [60, 80)"), "{:?}", warnings);

        let overlap = UnifiedActorCriticConfig::new(100, 100, 4)
            .with_actor(BranchSettings::plain().with_encoder(90, -20, vec![], 8));
        let (resolved, warnings) = warnings_during(|| overlap.resolve());
        assert_eq!(resolved.unwrap().backbone.num_actor_obs, 98);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("10 observation columns [80, 90) feed both"), "{:?}", warnings);

        let (_, warnings) = warnings_during(|| tactile_config().resolve());
        assert!(warnings.is_empty(), "{:?}", warnings);
    }

    #[test]
    fn test_json_defaults_and_unknown_keys() {
        let config = UnifiedActorCriticConfig::from_json_str(
            r#"{
                "actor_obs_dim": 300,
                "critic_obs_dim": 320,
                "num_actions": 12,
                "actor": {
                    "with_encoder": true,
                    "flatten_obs_end_idx": 270,
                    "encoder_obs_start_idx": 270,
                    "encoder_hidden_dims": [256, 128, 64],
                    "encoder_embedding_dim": 64
                },
                "encoder_final_activation": "tanh",
                "noise_std_type": "log",
                "class_name": "UnifiedActorCritic"
            }"#,
        )
        .unwrap();

        assert_eq!(config.encoder_rnn_type, RecurrentCellType::Gru);
        assert_eq!(config.encoder_rnn_hidden_size, 256);
        assert_eq!(config.encoder_rnn_num_layers, 1);
        assert_eq!(config.activation, Activation::Elu);
        assert_eq!(config.encoder_final_activation, Some(Activation::Tanh));
        assert_eq!(config.noise_std_type, NoiseStdType::Log);
        assert_eq!(config.init_noise_std, 1.0);
        assert_eq!(config.critic, BranchSettings::plain());
        assert_eq!(config.unknown_keys(), vec!["class_name"]);

        let (resolved, warnings) = warnings_during(|| config.resolve());
        let resolved = resolved.unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("unexpected arguments"), "{:?}", warnings);
        assert!(warnings[0].contains("class_name"), "{:?}", warnings);
        assert_eq!(resolved.backbone.num_actor_obs, 334);
        assert_eq!(resolved.backbone.num_critic_obs, 320);
    }

    #[test]
    fn test_json_file_round_trip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let original = tactile_config().with_noise_std_type(NoiseStdType::Log);
        file.write_all(original.to_json_string().unwrap().as_bytes()).unwrap();

        let loaded = UnifiedActorCriticConfig::from_json_file(file.path()).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_bad_documents() {
        assert!(matches!(
            UnifiedActorCriticConfig::from_json_str(r#"{"actor_obs_dim": 3}"#),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            UnifiedActorCriticConfig::from_json_str(
                r#"{"actor_obs_dim": 3, "critic_obs_dim": 3, "num_actions": 1, "activation": "mish"}"#
            ),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            UnifiedActorCriticConfig::from_json_file("/nonexistent/policy.json"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_noise_std_type_parsing() {
        assert_eq!("LOG".parse::<NoiseStdType>().unwrap(), NoiseStdType::Log);
        assert_eq!(NoiseStdType::Scalar.to_string(), "scalar");
        assert!(matches!(
            "gaussian".parse::<NoiseStdType>(),
            Err(ConfigError::UnknownNoiseStdType(_))
        ));
    }

    #[test]
    fn test_zero_sized_values_rejected() {
        assert!(UnifiedActorCriticConfig::new(10, 10, 0).resolve().is_err());
        assert!(UnifiedActorCriticConfig::new(0, 10, 2).resolve().is_err());
        assert!(UnifiedActorCriticConfig::new(10, 10, 2)
            .with_init_noise_std(0.0)
            .resolve()
            .is_err());
    }
}

#[cfg(test)]
mod proptest_widths {
    use super::*;
    use proptest::prelude::*;

    fn dims_and_width() -> impl Strategy<Value = (usize, usize)> {
        (1usize..2048).prop_flat_map(|obs_dim| (Just(obs_dim), 1..=obs_dim))
    }

    proptest! {
        /// Negative and positive encoder start indices that name the same
        /// trailing segment resolve to the same width.
        #[test]
        fn test_encoder_index_forms_agree((obs_dim, width) in dims_and_width()) {
            let negative = resolve_widths("actor", obs_dim, obs_dim as i64, -(width as i64)).unwrap();
            let positive = resolve_widths("actor", obs_dim, obs_dim as i64, (obs_dim - width) as i64).unwrap();
            prop_assert_eq!(negative.encoder, width);
            prop_assert_eq!(positive.encoder, width);
        }

        /// Positive end indices count from the front, non-positive ones from the back.
        #[test]
        fn test_flatten_index_forms_agree((obs_dim, width) in dims_and_width()) {
            let positive = resolve_widths("actor", obs_dim, width as i64, -1).unwrap();
            let negative = resolve_widths("actor", obs_dim, -((obs_dim - width) as i64), -1).unwrap();
            prop_assert_eq!(positive.flatten, width);
            prop_assert_eq!(negative.flatten, width);
        }

        /// A tiling layout never reports a gap or overlap.
        #[test]
        fn test_tiling_layout_has_no_gap((obs_dim, width) in dims_and_width()) {
            prop_assume!(width < obs_dim);
            let split = (obs_dim - width) as i64;
            let widths = resolve_widths("critic", obs_dim, split, split).unwrap();
            prop_assert_eq!(widths.gap(obs_dim), 0);
        }
    }
}
