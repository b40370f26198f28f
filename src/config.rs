//! User configuration
//!
//! Optional TOML file; every key has a default and CLI flags override file
//! values. Searched in this order:
//! 1. Path given on the command line
//! 2. `$FLEET_CONFIG`
//! 3. `<config dir>/fleet/config.toml`

use crate::error::{Error, Result};
use crate::runtime::{
    DEFAULT_API_THROTTLE, DEFAULT_MERGE_THROTTLE, DEFAULT_PARALLELISM, RetryPolicy, RunOptions,
};
use crate::types::MergeMethod;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Environment variable naming a config file
pub const CONFIG_ENV_VAR: &str = "FLEET_CONFIG";

/// Default workdir, relative to the current directory
pub const DEFAULT_WORKDIR: &str = "fleet-work";

/// fleet configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Repos processed concurrently
    pub parallelism: usize,
    /// Minimum spacing between provider API calls
    #[serde(with = "duration_str")]
    pub api_throttle: Duration,
    /// Minimum spacing between merges
    #[serde(with = "duration_str")]
    pub merge_throttle: Duration,
    /// Merge method used by `merge`
    pub merge_method: MergeMethod,
    /// Where artifacts and clones live
    pub workdir: PathBuf,
    /// GitHub Enterprise base URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_url: Option<String>,
    /// Self-hosted GitLab base URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gitlab_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            parallelism: DEFAULT_PARALLELISM,
            api_throttle: DEFAULT_API_THROTTLE,
            merge_throttle: DEFAULT_MERGE_THROTTLE,
            merge_method: MergeMethod::default(),
            workdir: PathBuf::from(DEFAULT_WORKDIR),
            github_url: None,
            gitlab_url: None,
        }
    }
}

impl Config {
    /// Load configuration, falling back to defaults when no file exists.
    ///
    /// An explicitly given path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
            return Self::load_from_path(Path::new(&path));
        }
        if let Some(path) = default_config_path()
            && path.exists()
        {
            return Self::load_from_path(&path);
        }
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read config file {}: {e}", path.display()))
        })?;
        let config = Self::from_toml(&contents)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Parse TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)
            .map_err(|e| Error::Config(format!("failed to parse config: {e}")))?;
        if config.parallelism == 0 {
            return Err(Error::Config("parallelism must be at least 1".to_string()));
        }
        Ok(config)
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("failed to serialize config: {e}")))
    }

    /// Runtime knobs derived from this config
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            parallelism: self.parallelism,
            api_throttle: self.api_throttle,
            merge_throttle: self.merge_throttle,
            retry: RetryPolicy::default(),
        }
    }
}

/// `<config dir>/fleet/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("fleet").join("config.toml"))
}

/// Parse durations such as `720ms`, `30s`, `2m`, `1h`.
///
/// A bare number is taken as seconds.
pub fn parse_duration(text: &str) -> Result<Duration> {
    let text = text.trim();
    let split = text
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);
    let value: f64 = number
        .parse()
        .map_err(|_| Error::Config(format!("invalid duration '{text}'")))?;

    let seconds = match unit.trim() {
        "ms" => value / 1000.0,
        "" | "s" => value,
        "m" => value * 60.0,
        "h" => value * 3600.0,
        other => {
            return Err(Error::Config(format!(
                "invalid duration unit '{other}' in '{text}' (use ms, s, m or h)"
            )));
        }
    };
    Duration::try_from_secs_f64(seconds)
        .map_err(|e| Error::Config(format!("invalid duration '{text}': {e}")))
}

/// Render a duration in the form [`parse_duration`] accepts
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis % 1000 == 0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{millis}ms")
    }
}

mod duration_str {
    use super::{format_duration, parse_duration};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_duration(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse_duration(&text).map_err(serde::de::Error::custom)
    }
}
