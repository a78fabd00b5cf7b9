//! `jobtrack.toml` loading

use anyhow::{Context, Result};
use jobtrack_core::StoreConfig;
use jobtrack_poller::PollerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default directory holding persisted task files
pub const DEFAULT_STATE_DIR: &str = ".jobtrack";

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "jobtrack.toml";

/// Command line configuration
///
/// ```toml
/// state_dir = "/var/lib/jobtrack"
///
/// [store]
/// storage_key = "background-tasks"
///
/// [poller]
/// processing_interval_ms = 2000
/// queued_interval_ms = 5000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobtrackConfig {
    /// Directory for file-backed storage
    pub state_dir: PathBuf,
    /// Store settings
    pub store: StoreConfig,
    /// Poller settings
    pub poller: PollerConfig,
}

impl Default for JobtrackConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            store: StoreConfig::default(),
            poller: PollerConfig::default(),
        }
    }
}

impl JobtrackConfig {
    /// Parse TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).context("invalid jobtrack config")?;
        config.poller.validate()?;
        Ok(config)
    }

    /// Load from `path`, or from `jobtrack.toml` if present, or defaults
    ///
    /// An explicitly given path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        if !required && !path.exists() {
            tracing::debug!("no config file, using defaults");
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = Self::from_toml(&text).with_context(|| format!("in {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// With state directory
    #[must_use]
    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = dir.into();
        self
    }
}
