//! Project configuration read from `Water.toml`.

use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use color_eyre::eyre::{self, Context};
use serde::{Deserialize, Serialize};

use crate::{engine::DEFAULT_POLL_INTERVAL, selector::BuildConfiguration};

/// Name of the configuration file in a project root.
pub const CONFIG_FILE: &str = "Water.toml";

/// Device-related project settings. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Discovery settings.
    #[serde(default)]
    pub devices: DevicesConfig,
    /// Build/run targets, at most one device per platform.
    #[serde(default)]
    pub targets: Vec<BuildConfiguration>,
}

/// The `[devices]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DevicesConfig {
    /// Restrict discovery results to this device id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    /// Interval between discovery polls, in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            device: None,
            poll_interval_ms: u64::try_from(DEFAULT_POLL_INTERVAL.as_millis()).unwrap_or(4000),
        }
    }
}

impl Config {
    /// Load `Water.toml` from `root`, falling back to defaults if it does not exist.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is invalid.
    pub fn load(root: &Path) -> eyre::Result<Self> {
        let path = Self::path(root);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", path.display()));
            }
        };
        Self::from_toml_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Parse a configuration from TOML text.
    ///
    /// # Errors
    /// Returns an error if the text is not valid configuration.
    pub fn from_toml_str(contents: &str) -> eyre::Result<Self> {
        let config: Self = toml::from_str(contents)?;
        eyre::ensure!(
            config.devices.poll_interval_ms > 0,
            "devices.poll_interval_ms must be greater than zero"
        );
        Ok(config)
    }

    /// Location of the configuration file in `root`.
    #[must_use]
    pub fn path(root: &Path) -> PathBuf {
        root.join(CONFIG_FILE)
    }

    /// Interval between discovery polls.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.devices.poll_interval_ms)
    }
}
