//! State layer configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Complete state layer configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateConfig {
    /// Checkpoint retention settings.
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    /// Durable store backup settings.
    #[serde(default)]
    pub backup: BackupConfig,
}

/// Checkpoint retention settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// How many checkpoints stay in memory before `flush_oldest` solidifies
    /// them. Policy value set by the consensus layer from its fork-depth
    /// assumptions; the default is a convenience, not a prescription.
    #[serde(default = "default_retention_depth")]
    pub retention_depth: usize,
}

fn default_retention_depth() -> usize {
    64
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            retention_depth: default_retention_depth(),
        }
    }
}

/// Durable store backup settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Enable periodic backups.
    #[serde(default)]
    pub enabled: bool,
    /// Location of the persisted alternation marker.
    #[serde(default = "default_marker_path")]
    pub marker_path: PathBuf,
    /// Primary backup target directory.
    #[serde(default = "default_target_a")]
    pub target_a: PathBuf,
    /// Secondary backup target directory.
    #[serde(default = "default_target_b")]
    pub target_b: PathBuf,
    /// Back up every N committed blocks.
    #[serde(default = "default_frequency")]
    pub frequency: u64,
}

fn default_marker_path() -> PathBuf {
    PathBuf::from("backup.properties")
}

fn default_target_a() -> PathBuf {
    PathBuf::from("backup-a")
}

fn default_target_b() -> PathBuf {
    PathBuf::from("backup-b")
}

fn default_frequency() -> u64 {
    10_000
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            marker_path: default_marker_path(),
            target_a: default_target_a(),
            target_b: default_target_b(),
            frequency: default_frequency(),
        }
    }
}

impl StateConfig {
    /// Load configuration from a TOML file, falling back to defaults when
    /// the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
