//! Rate-Limit Configuration
//!
//! This module provides the validated rate-limit settings consumed by the
//! pipeline, plus TOML configuration file loading from
//! `~/.config/relay/relay.toml`.
//!
//! # Validation
//!
//! Invalid values (`count = 0`, `time = 0`, an unknown strategy) fail with
//! [`ConfigError`] at load/assembly time. Values are never silently clamped:
//! a misconfigured pipeline must not start.
//!
//! # Example Configuration
//!
//! ```toml
//! [rate_limit]
//! count = 30
//! time = 60
//! strategy = "stall"
//! ```

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Window capacity below the allowed minimum
    #[error("rate limit count must be at least 1 (got {count})")]
    InvalidCount {
        /// The rejected count value
        count: u32,
    },

    /// Window duration of zero
    #[error("rate limit window must be positive (got {seconds}s)")]
    InvalidWindow {
        /// The rejected window length in seconds
        seconds: u64,
    },

    /// Strategy string that is neither `"stall"` nor `"discard"`
    #[error("unknown overflow strategy `{0}` (expected \"stall\" or \"discard\")")]
    UnknownStrategy(String),

    /// Failed to read config file
    #[error("failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),
}

// =============================================================================
// Overflow Strategy
// =============================================================================

/// What to do with an event once its session is over capacity
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowStrategy {
    /// Suspend processing until the window frees up, then admit (default)
    #[default]
    Stall,
    /// Drop the event immediately, terminating its pipeline traversal
    Discard,
}

impl FromStr for OverflowStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stall" => Ok(Self::Stall),
            "discard" => Ok(Self::Discard),
            other => Err(ConfigError::UnknownStrategy(other.to_string())),
        }
    }
}

impl std::fmt::Display for OverflowStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stall => write!(f, "stall"),
            Self::Discard => write!(f, "discard"),
        }
    }
}

// =============================================================================
// Rate Limit Configuration
// =============================================================================

/// Rate-limit settings for the admission-control stage
///
/// `count` admissions are allowed per `time` seconds per session key.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Maximum admissions per window per session (must be >= 1)
    pub count: u32,

    /// Window length in seconds (must be > 0)
    pub time: u64,

    /// What to do with events once a session is over capacity
    pub strategy: OverflowStrategy,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            count: 30,
            time: 60,
            strategy: OverflowStrategy::Stall,
        }
    }
}

impl RateLimitConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the admissions-per-window limit
    #[must_use]
    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    /// Set the window length in seconds
    #[must_use]
    pub fn with_time_secs(mut self, seconds: u64) -> Self {
        self.time = seconds;
        self
    }

    /// Set the overflow strategy
    #[must_use]
    pub fn with_strategy(mut self, strategy: OverflowStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// The window length as a [`Duration`]
    #[must_use]
    pub fn window_duration(&self) -> Duration {
        Duration::from_secs(self.time)
    }

    /// Check the configuration invariants
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidCount`] for `count = 0` and
    /// [`ConfigError::InvalidWindow`] for `time = 0`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.count == 0 {
            return Err(ConfigError::InvalidCount { count: self.count });
        }
        if self.time == 0 {
            return Err(ConfigError::InvalidWindow { seconds: self.time });
        }
        Ok(())
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Rate limiting section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitToml {
    /// Maximum admissions per window per session
    pub count: Option<u32>,

    /// Window length in seconds
    pub time: Option<u64>,

    /// Overflow strategy ("stall" or "discard")
    pub strategy: Option<String>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayToml {
    /// Rate limiting configuration section
    pub rate_limit: RateLimitToml,
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/relay/relay.toml` or `~/.config/relay/relay.toml`
/// if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("relay").join("relay.toml"))
}

/// Load configuration from the default path
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be read or parsed,
/// or names an unknown overflow strategy. A missing config file is not an
/// error (defaults are used).
pub fn load_config() -> Result<RateLimitConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Arguments
///
/// * `path` - Optional path to the configuration file. If `None`, defaults
///   are returned.
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed,
/// or names an unknown overflow strategy.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<RateLimitConfig, ConfigError> {
    // Start with defaults
    let mut config = RateLimitConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: RelayToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config)?;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut RateLimitConfig, toml: &RelayToml) -> Result<(), ConfigError> {
    if let Some(count) = toml.rate_limit.count {
        config.count = count;
    }
    if let Some(time) = toml.rate_limit.time {
        config.time = time;
    }
    if let Some(ref strategy) = toml.rate_limit.strategy {
        config.strategy = strategy.parse()?;
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;
    use tempfile::NamedTempFile;

    use super::*;

    // =========================================================================
    // Validation Tests
    // =========================================================================

    #[test]
    fn test_default_config_valid() {
        let config = RateLimitConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.count, 30);
        assert_eq!(config.time, 60);
        assert_eq!(config.strategy, OverflowStrategy::Stall);
    }

    #[test]
    fn test_zero_count_rejected() {
        let config = RateLimitConfig::new().with_count(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidCount { count: 0 })
        ));
    }

    #[test]
    fn test_zero_window_rejected() {
        let config = RateLimitConfig::new().with_time_secs(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidWindow { seconds: 0 })
        ));
    }

    #[test]
    fn test_window_duration() {
        let config = RateLimitConfig::new().with_time_secs(10);
        assert_eq!(config.window_duration(), Duration::from_secs(10));
    }

    // =========================================================================
    // Strategy Parsing Tests
    // =========================================================================

    #[test]
    fn test_strategy_from_str() {
        assert_eq!(
            "stall".parse::<OverflowStrategy>().unwrap(),
            OverflowStrategy::Stall
        );
        assert_eq!(
            "discard".parse::<OverflowStrategy>().unwrap(),
            OverflowStrategy::Discard
        );
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let err = "drop".parse::<OverflowStrategy>().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownStrategy(s) if s == "drop"));
    }

    #[test]
    fn test_strategy_display_round_trips() {
        for strategy in [OverflowStrategy::Stall, OverflowStrategy::Discard] {
            let parsed: OverflowStrategy = strategy.to_string().parse().unwrap();
            assert_eq!(parsed, strategy);
        }
    }

    // =========================================================================
    // TOML Loading Tests
    // =========================================================================

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config =
            load_config_from_path(Some(PathBuf::from("/nonexistent/relay.toml"))).unwrap();
        assert_eq!(config.count, RateLimitConfig::default().count);
        assert_eq!(config.time, RateLimitConfig::default().time);
    }

    #[test]
    fn test_load_no_path_uses_defaults() {
        let config = load_config_from_path(None).unwrap();
        assert_eq!(config.count, RateLimitConfig::default().count);
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[rate_limit]\ncount = 5\ntime = 10\nstrategy = \"discard\""
        )
        .unwrap();

        let config = load_config_from_path(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.count, 5);
        assert_eq!(config.time, 10);
        assert_eq!(config.strategy, OverflowStrategy::Discard);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[rate_limit]\ncount = 7").unwrap();

        let config = load_config_from_path(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.count, 7);
        assert_eq!(config.time, RateLimitConfig::default().time);
        assert_eq!(config.strategy, OverflowStrategy::Stall);
    }

    #[test]
    fn test_unknown_strategy_in_toml_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[rate_limit]\nstrategy = \"teleport\"").unwrap();

        let err = load_config_from_path(Some(file.path().to_path_buf())).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownStrategy(s) if s == "teleport"));
    }

    #[test]
    fn test_malformed_toml_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[rate_limit\ncount = ???").unwrap();

        let err = load_config_from_path(Some(file.path().to_path_buf())).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }
}
