//! Training run configuration.
//!
//! Values come from `TrainConfig::default()`, optionally replaced by a JSON
//! file (missing keys keep their defaults), and finally by command-line flags.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dataset::compiler::{CompileOptions, DEFAULT_TEAM};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("parsing {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Directory holding the replay JSON files.
    pub episode_dir: PathBuf,
    /// Only episodes won by this team are imitated.
    pub team_name: String,
    /// Keep only the last N replay files.
    pub max_episodes: Option<usize>,
    pub batch_size: usize,
    /// Fraction of samples held out for validation, in `[0, 1)`.
    pub val_fraction: f64,
    /// Number of train + val cycles.
    pub cycles: usize,
    pub learning_rate: f64,
    pub weight_decay: f64,
    /// Learning-rate decay factor applied after every cycle.
    pub lr_gamma: f64,
    /// Batch encoding threads; 0 encodes on the training thread.
    pub workers: usize,
    pub seed: u64,
    pub checkpoint_path: PathBuf,
    pub progress: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            episode_dir: PathBuf::from("episodes"),
            team_name: DEFAULT_TEAM.to_string(),
            max_episodes: None,
            batch_size: 256,
            val_fraction: 0.1,
            cycles: 40,
            learning_rate: 1e-3,
            weight_decay: 0.01,
            lr_gamma: 0.98,
            workers: 0,
            seed: 42,
            checkpoint_path: PathBuf::from("policy_checkpoint.json"),
            progress: true,
        }
    }
}

impl TrainConfig {
    pub fn from_json_file(path: &Path) -> Result<TrainConfig, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be positive".into()));
        }
        if !(0.0..1.0).contains(&self.val_fraction) {
            return Err(ConfigError::Invalid(format!(
                "val_fraction {} outside [0, 1)",
                self.val_fraction
            )));
        }
        if self.learning_rate.is_nan() || self.learning_rate <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "learning_rate {} must be positive",
                self.learning_rate
            )));
        }
        if self.lr_gamma.is_nan() || self.lr_gamma <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "lr_gamma {} must be positive",
                self.lr_gamma
            )));
        }
        Ok(())
    }

    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            team_name: self.team_name.clone(),
            max_episodes: self.max_episodes,
            progress: self.progress,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = TrainConfig::default();
        assert_eq!(config.team_name, "Toad Brigade");
        assert_eq!(config.batch_size, 256);
        assert_eq!(config.cycles, 40);
        assert_eq!(config.lr_gamma, 0.98);
        assert_eq!(config.checkpoint_path, PathBuf::from("policy_checkpoint.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.json");
        fs::write(&path, r#"{"batch_size": 32, "team_name": "RL is all you need"}"#).unwrap();
        let config = TrainConfig::from_json_file(&path).unwrap();
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.team_name, "RL is all you need");
        assert_eq!(config.seed, 42);
        assert_eq!(config.val_fraction, 0.1);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.json");
        fs::write(&path, "{ batch_size: ").unwrap();
        assert!(matches!(
            TrainConfig::from_json_file(&path),
            Err(ConfigError::Json { .. })
        ));
        assert!(matches!(
            TrainConfig::from_json_file(&dir.path().join("missing.json")),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn validation() {
        let bad = [
            TrainConfig {
                batch_size: 0,
                ..TrainConfig::default()
            },
            TrainConfig {
                val_fraction: 1.0,
                ..TrainConfig::default()
            },
            TrainConfig {
                val_fraction: -0.1,
                ..TrainConfig::default()
            },
            TrainConfig {
                learning_rate: 0.0,
                ..TrainConfig::default()
            },
            TrainConfig {
                lr_gamma: f64::NAN,
                ..TrainConfig::default()
            },
        ];
        for config in &bad {
            assert!(config.validate().is_err(), "{:?}", config);
        }
        let zero_val = TrainConfig {
            val_fraction: 0.0,
            ..TrainConfig::default()
        };
        assert!(zero_val.validate().is_ok());
    }

    #[test]
    fn compile_options_follow_config() {
        let config = TrainConfig {
            max_episodes: Some(3),
            progress: false,
            ..TrainConfig::default()
        };
        let options = config.compile_options();
        assert_eq!(options.max_episodes, Some(3));
        assert!(!options.progress);
        assert_eq!(options.team_name, DEFAULT_TEAM);
    }
}
