// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.


use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use nilm_core::Kernel;
use nilm_objectives::{
    BalancedLoss, BalancingStrategy, MixtureDensityNll, ObjectiveError, TrainingObjective,
    DEFAULT_THRESHOLD,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Which objective family a run trains against.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveKind {
    #[default]
    Balanced,
    #[serde(alias = "mdn")]
    MixtureDensity,
}

impl fmt::Display for ObjectiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectiveKind::Balanced => write!(f, "balanced"),
            ObjectiveKind::MixtureDensity => write!(f, "mixture_density"),
        }
    }
}

impl FromStr for ObjectiveKind {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "balanced" => Ok(ObjectiveKind::Balanced),
            "mixture_density" | "mdn" => Ok(ObjectiveKind::MixtureDensity),
            other => Err(ConfigError::Invalid(format!(
                "unknown objective '{other}'"
            ))),
        }
    }
}

/// Objective settings for a training run.
///
/// ```toml
/// objective = "balanced"
/// strategy = "per_sequence_nan_safe"
/// kernel = "squared_error"
/// threshold = 0.0
/// sequence_length = 512
/// ignore_inactive = true
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ObjectiveConfig {
    pub objective: ObjectiveKind,
    pub strategy: BalancingStrategy,
    pub kernel: Kernel,
    pub threshold: f32,
    pub sequence_length: Option<usize>,
    pub ignore_inactive: bool,
}

impl Default for ObjectiveConfig {
    fn default() -> Self {
        Self {
            objective: ObjectiveKind::default(),
            strategy: BalancingStrategy::default(),
            kernel: Kernel::default(),
            threshold: DEFAULT_THRESHOLD,
            sequence_length: None,
            ignore_inactive: true,
        }
    }
}

impl ObjectiveConfig {
    pub const OBJECTIVE_ENV: &'static str = "NILM_OBJECTIVE";
    pub const STRATEGY_ENV: &'static str = "NILM_OBJECTIVE_STRATEGY";
    pub const KERNEL_ENV: &'static str = "NILM_OBJECTIVE_KERNEL";
    pub const THRESHOLD_ENV: &'static str = "NILM_OBJECTIVE_THRESHOLD";
    pub const SEQUENCE_LENGTH_ENV: &'static str = "NILM_OBJECTIVE_SEQUENCE_LENGTH";
    pub const IGNORE_INACTIVE_ENV: &'static str = "NILM_OBJECTIVE_IGNORE_INACTIVE";

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads a TOML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        if let Kernel::Custom(_) = self.kernel {
            return Err(ConfigError::Invalid(
                "custom kernels cannot be serialised".to_string(),
            ));
        }
        toml::to_string(self).map_err(|err| ConfigError::Invalid(err.to_string()))
    }

    /// Applies `NILM_OBJECTIVE*` environment variables on top of `self`.
    ///
    /// `NILM_OBJECTIVE_SEQUENCE_LENGTH` accepts `none` (or `0`) to clear the
    /// sequence length; `NILM_OBJECTIVE_IGNORE_INACTIVE` treats `0`, `false`
    /// and `off` as false.
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Some(raw) = env_var(Self::OBJECTIVE_ENV)? {
            self.objective = raw
                .parse()
                .map_err(|_| ConfigError::env(Self::OBJECTIVE_ENV, &raw))?;
        }
        if let Some(raw) = env_var(Self::STRATEGY_ENV)? {
            self.strategy = raw
                .parse()
                .map_err(|_| ConfigError::env(Self::STRATEGY_ENV, &raw))?;
        }
        if let Some(raw) = env_var(Self::KERNEL_ENV)? {
            self.kernel = raw
                .parse()
                .map_err(|_| ConfigError::env(Self::KERNEL_ENV, &raw))?;
        }
        if let Some(raw) = env_var(Self::THRESHOLD_ENV)? {
            self.threshold = raw
                .trim()
                .parse::<f32>()
                .map_err(|_| ConfigError::env(Self::THRESHOLD_ENV, &raw))?;
        }
        if let Some(raw) = env_var(Self::SEQUENCE_LENGTH_ENV)? {
            self.sequence_length = match raw.trim().to_ascii_lowercase().as_str() {
                "none" | "0" => None,
                value => Some(
                    value
                        .parse::<usize>()
                        .map_err(|_| ConfigError::env(Self::SEQUENCE_LENGTH_ENV, &raw))?,
                ),
            };
        }
        if let Some(raw) = env_var(Self::IGNORE_INACTIVE_ENV)? {
            self.ignore_inactive = !matches!(
                raw.trim(),
                "0" | "false" | "False" | "FALSE" | "off" | "OFF"
            );
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.threshold.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "threshold must be finite, got {}",
                self.threshold
            )));
        }
        if self.sequence_length == Some(0) {
            return Err(ConfigError::Invalid(
                "sequence_length must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Validates the settings and builds the objective the trainer will call
    /// on every minibatch.
    pub fn build(&self) -> Result<TrainingObjective, ConfigError> {
        self.validate()?;
        let objective = match self.objective {
            ObjectiveKind::Balanced => {
                if self.strategy == BalancingStrategy::ReweightInPlace {
                    warn!("reweight_in_place is an alternate policy; its loss is a sum, not a mean");
                }
                TrainingObjective::Balanced(
                    BalancedLoss::new(self.strategy)
                        .with_kernel(self.kernel)
                        .with_threshold(self.threshold)
                        .with_sequence_length(self.sequence_length)
                        .with_ignore_inactive(self.ignore_inactive),
                )
            }
            ObjectiveKind::MixtureDensity => {
                if self.sequence_length.is_some() {
                    warn!("sequence_length has no effect on the mixture-density objective");
                }
                TrainingObjective::MixtureDensity(MixtureDensityNll::new())
            }
        };
        info!(
            objective = %self.objective,
            strategy = %self.strategy,
            kernel = %self.kernel,
            threshold = self.threshold,
            sequence_length = ?self.sequence_length,
            ignore_inactive = self.ignore_inactive,
            "configured training objective"
        );
        Ok(objective)
    }
}

fn env_var(key: &'static str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => Ok(Some(raw)),
        Ok(_) => Ok(None),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(raw)) => Err(ConfigError::Env {
            key,
            value: raw.to_string_lossy().into_owned(),
        }),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse TOML {path:?}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to parse objective config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value {value:?} for {key}")]
    Env { key: &'static str, value: String },
    #[error("invalid objective config: {0}")]
    Invalid(String),
    #[error(transparent)]
    Objective(#[from] ObjectiveError),
}

impl ConfigError {
    fn env(key: &'static str, value: &str) -> Self {
        ConfigError::Env {
            key,
            value: value.to_string(),
        }
    }
}
