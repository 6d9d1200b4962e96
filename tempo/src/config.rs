//! Server configuration.
use std::{fs, io, path::Path, path::PathBuf, time::Duration};

use serde::Deserialize;
use tempo_utils::time::millis_per_tick;
use thiserror::Error;

const DEFAULT_CONFIG: &str = include_str!("../../package-content/tempo_config.json5");

/// Where the server looks for its config file.
pub const CONFIG_PATH: &str = "tempo_config.json5";

/// Errors raised while loading the config.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// The config file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The default config could not be written.
    #[error("failed to write default config to {path}: {source}")]
    Write {
        /// The config file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The config file is not valid JSON5 for [`ServerConfig`].
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// The config file.
        path: PathBuf,
        /// The parser error.
        #[source]
        source: serde_json5::Error,
    },
    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

/// Settings read from `tempo_config.json5`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    /// Simulation ticks per second.
    pub tick_rate: u32,
    /// Default log filter, used when `RUST_LOG` is unset.
    pub log_level: String,
    /// Ticks slower than this are logged as warnings. `0` disables the check.
    pub overrun_warn_ms: u64,
    /// Number of periodic pulses spawned on startup.
    pub pulses: usize,
    /// Number of expiring effects spawned on startup.
    pub effects: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_rate: 20,
            log_level: "info".to_owned(),
            overrun_warn_ms: 50,
            pulses: 1000,
            effects: 200,
        }
    }
}

impl ServerConfig {
    /// Loads the config at `path`, writing the default one first if the file
    /// does not exist yet.
    pub fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        let config = if path.exists() {
            let config_str = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            serde_json5::from_str::<Self>(&config_str).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                    path: path.to_path_buf(),
                    source,
                })?;
            }
            fs::write(path, DEFAULT_CONFIG).map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })?;
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Checks that every value is in range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=1000).contains(&self.tick_rate) {
            return Err(ConfigError::Invalid("Tick rate must be between 1 and 1000"));
        }
        if self.log_level.trim().is_empty() {
            return Err(ConfigError::Invalid("Log level must not be empty"));
        }
        Ok(())
    }

    /// World milliseconds covered by one tick.
    #[must_use]
    pub fn millis_per_tick(&self) -> i64 {
        millis_per_tick(self.tick_rate)
    }

    /// Real time between two ticks.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(1) / self.tick_rate.max(1)
    }

    /// Threshold for the overrun warning, if enabled.
    #[must_use]
    pub fn overrun_warning(&self) -> Option<Duration> {
        (self.overrun_warn_ms > 0).then(|| Duration::from_millis(self.overrun_warn_ms))
    }
}
