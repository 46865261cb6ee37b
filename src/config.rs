//! Global calfeed configuration.

use std::path::PathBuf;

use anyhow::{Context, Result};
use config::{Config, File};
use serde::{Deserialize, Serialize};

static DEFAULT_DATA_FILE: &str = "~/.local/share/calfeed/store.json";

fn default_data_file() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_FILE)
}

fn default_tick_interval_secs() -> u64 {
    300
}

fn default_cycle_timeout_secs() -> u64 {
    60
}

fn default_sync_interval_minutes() -> u32 {
    60
}

/// Global configuration at ~/.config/calfeed/config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalfeedConfig {
    /// Where the event/subscription store lives.
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,

    /// How often the watch scheduler scans for due subscriptions.
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    /// Upper bound on one fetch+parse+reconcile cycle.
    #[serde(default = "default_cycle_timeout_secs")]
    pub cycle_timeout_secs: u64,

    /// Interval applied to new subscriptions when none is given.
    #[serde(default = "default_sync_interval_minutes")]
    pub default_sync_interval_minutes: u32,
}

impl Default for CalfeedConfig {
    fn default() -> Self {
        CalfeedConfig {
            data_file: default_data_file(),
            tick_interval_secs: default_tick_interval_secs(),
            cycle_timeout_secs: default_cycle_timeout_secs(),
            default_sync_interval_minutes: default_sync_interval_minutes(),
        }
    }
}

impl CalfeedConfig {
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("calfeed");
        Ok(config_dir.join("config.toml"))
    }

    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
        }

        let config: CalfeedConfig = Config::builder()
            .add_source(File::from(config_path).required(false))
            .build()
            .context("Could not read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        Ok(config)
    }

    /// Data file path with `~` expanded.
    pub fn data_path(&self) -> PathBuf {
        let expanded = shellexpand::tilde(&self.data_file.to_string_lossy()).into_owned();
        PathBuf::from(expanded)
    }

    /// Create a default config file with all options commented out.
    fn create_default_config(path: &std::path::Path) -> Result<()> {
        let contents = format!(
            "\
# calfeed configuration

# Where the event store lives:
# data_file = \"{DEFAULT_DATA_FILE}\"

# How often `calfeed watch` scans for due subscriptions (seconds):
# tick_interval_secs = 300

# Upper bound on a single sync cycle (seconds):
# cycle_timeout_secs = 60

# Sync interval for new subscriptions (minutes):
# default_sync_interval_minutes = 60
"
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create {}", parent.display()))?;
        }
        std::fs::write(path, contents)
            .with_context(|| format!("Could not write {}", path.display()))?;

        Ok(())
    }
}
