//! Library configuration.

use crate::{muted_error, tw_error, tw_warn, weak_error};
use serde::Deserialize;
use std::fs::read_to_string;
use std::path::Path;
use std::sync::OnceLock;

/// Breakpoint conditions configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConditionConfig {
    /// Capacity of parsed expressions cache.
    pub cache_size: usize,
}

impl Default for ConditionConfig {
    fn default() -> Self {
        Self { cache_size: 128 }
    }
}

/// Stream hijacking configuration.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct HijackConfig {
    /// Print `None` values through the proxy display hook.
    pub display_none: bool,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub condition: ConditionConfig,
    pub hijack: HijackConfig,
}

impl Config {
    const DEFAULT_PATH: &'static str = ".config/tripwire/config.toml";

    /// Load configuration from file. Return [`None`] on errors.
    ///
    /// # Arguments
    ///
    /// * `path`: path to configuration file, if `None` - default path in user home directory
    ///   is used
    pub fn from_file(path: Option<&Path>) -> Option<Self> {
        let data = match path {
            None => {
                let path = home::home_dir()?;
                let path = path.join(Self::DEFAULT_PATH);
                muted_error!(read_to_string(path))?
            }
            Some(path) => match read_to_string(path) {
                Ok(data) => data,
                Err(err) => {
                    tw_error!(target: "debugger", "Error while load config file: {err}");
                    return None;
                }
            },
        };

        weak_error!(Self::from_toml(&data), "malformed config:")
    }

    pub fn from_toml(data: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(data)
    }
}

/// Read-only configuration (set only once, at startup).
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Set initial configuration.
pub fn set(config: Config) {
    if CONFIG.set(config).is_err() {
        tw_warn!(target: "debugger", "configuration already set, new one is ignored");
    }
}

/// Return current configuration, default one if it was never set.
pub fn current() -> &'static Config {
    CONFIG.get_or_init(Config::default)
}
