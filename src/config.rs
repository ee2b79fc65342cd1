//! Conductor configuration: defaults, validation and JSON persistence
//!
//! The on-disk format is a flat JSON object. Missing keys fall back to their
//! defaults, so older or hand-edited files keep loading:
//!
//! ```json
//! {
//!   "total_frames": 1000,
//!   "frame_rate": 30,
//!   "universe": 999,
//!   "frame_length": 512
//! }
//! ```

use std::fs::File;
use std::io::Write;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::types::{PAYLOAD_LENGTH_RANGE, UNIVERSE_RANGE};
use crate::{ConductorError, Result};

/// Default config file name, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "sacn_sender_config.json";

/// Valid frame rates in frames per second.
pub const FRAME_RATE_RANGE: RangeInclusive<u32> = 1..=120;

/// Transmission settings consumed by the conductor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConductorConfig {
    /// Last frame to transmit (inclusive)
    pub total_frames: u16,
    /// Frames per second
    pub frame_rate: u32,
    /// Destination universe
    pub universe: u16,
    /// Payload length in channels
    pub frame_length: usize,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self { total_frames: 1000, frame_rate: 30, universe: 999, frame_length: 512 }
    }
}

impl ConductorConfig {
    /// Check every field against its validity range.
    ///
    /// `total_frames` is a `u16`, so its `[0, 65535]` range holds by construction.
    pub fn validate(&self) -> Result<()> {
        if !FRAME_RATE_RANGE.contains(&self.frame_rate) {
            return Err(ConductorError::invalid_config("frame_rate", self.frame_rate, "(0, 120]"));
        }
        if !UNIVERSE_RANGE.contains(&self.universe) {
            return Err(ConductorError::invalid_config("universe", self.universe, "[1, 63999]"));
        }
        if !PAYLOAD_LENGTH_RANGE.contains(&self.frame_length) {
            return Err(ConductorError::invalid_config(
                "frame_length",
                self.frame_length,
                "[24, 512]",
            ));
        }
        Ok(())
    }

    /// Return a copy with `update` merged over this config.
    pub fn apply(&self, update: &ConfigUpdate) -> Self {
        Self {
            total_frames: update.total_frames.unwrap_or(self.total_frames),
            frame_rate: update.frame_rate.unwrap_or(self.frame_rate),
            universe: update.universe.unwrap_or(self.universe),
            frame_length: update.frame_length.unwrap_or(self.frame_length),
        }
    }
}

/// Partial configuration change; absent fields keep their current value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigUpdate {
    pub total_frames: Option<u16>,
    pub frame_rate: Option<u32>,
    pub universe: Option<u16>,
    pub frame_length: Option<usize>,
}

impl ConfigUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// JSON file holding a [`ConductorConfig`]
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the config, falling back to defaults.
    ///
    /// A missing file yields defaults silently; an unreadable or malformed file
    /// yields defaults with a warning.
    pub fn load(&self) -> ConductorConfig {
        match self.try_load() {
            Ok(Some(config)) => config,
            Ok(None) => {
                debug!("No config file at {}, using defaults", self.path.display());
                ConductorConfig::default()
            }
            Err(e) => {
                warn!("Error loading configuration from {}: {}", self.path.display(), e);
                ConductorConfig::default()
            }
        }
    }

    /// Load the config, reporting read and parse errors.
    ///
    /// Returns `Ok(None)` when the file does not exist.
    pub fn try_load(&self) -> Result<Option<ConductorConfig>> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ConductorError::config_file(&self.path, e)),
        };
        let config = serde_json::from_str(&text)?;
        Ok(Some(config))
    }

    /// Write the config as pretty JSON and flush it to disk.
    pub fn save(&self, config: &ConductorConfig) -> Result<()> {
        let json = serde_json::to_string_pretty(config)?;

        let mut file =
            File::create(&self.path).map_err(|e| ConductorError::config_file(&self.path, e))?;
        file.write_all(json.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| ConductorError::config_file(&self.path, e))?;

        info!("Configuration saved to {}", self.path.display());
        Ok(())
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIG_FILE)
    }
}
