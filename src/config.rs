// src/config.rs
//! Configuration file parsing
//!
//! Supports a TOML configuration file with the following sections:
//! - top level: `db_path`, `installonly`
//! - [replay] - default tolerance flags for replay, undo, rollback and redo
//! - [lock] - retry policy for the history lock
//!
//! A missing file means defaults; command-line flags override file values.

use crate::error::{Error, Result};
use crate::replay::ReplayOptions;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/reprise/reprise.toml";

/// Default database location
pub const DEFAULT_DB_PATH: &str = "/var/lib/reprise/reprise.db";

/// TOML configuration file structure
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Packages that are installed side by side instead of upgraded
    #[serde(default = "default_installonly")]
    pub installonly: Vec<String>,

    #[serde(default)]
    pub replay: ReplaySection,

    #[serde(default)]
    pub lock: LockSection,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            installonly: default_installonly(),
            replay: ReplaySection::default(),
            lock: LockSection::default(),
        }
    }
}

/// Replay tolerance defaults
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplaySection {
    #[serde(default)]
    pub ignore_installed: bool,

    #[serde(default)]
    pub ignore_extras: bool,

    #[serde(default)]
    pub skip_unavailable: bool,

    /// Fail when a requested package cannot be installed
    #[serde(default = "default_true")]
    pub strict: bool,
}

impl Default for ReplaySection {
    fn default() -> Self {
        Self {
            ignore_installed: false,
            ignore_extras: false,
            skip_unavailable: false,
            strict: true,
        }
    }
}

/// Lock retry policy
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LockSection {
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Base delay, doubled after every failed attempt
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for LockSection {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from(DEFAULT_DB_PATH)
}

fn default_installonly() -> Vec<String> {
    ["kernel", "kernel-core", "kernel-modules", "installonlypkg(kernel)"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_true() -> bool {
    true
}

fn default_retries() -> u32 {
    5
}

fn default_backoff_ms() -> u64 {
    100
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config = Self::parse(&content)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!("No configuration at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.db_path.as_os_str().is_empty() {
            return Err(Error::ConfigError("db_path must not be empty".to_string()));
        }
        if self.lock.retries == 0 {
            return Err(Error::ConfigError(
                "lock.retries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn replay_options(&self) -> ReplayOptions {
        ReplayOptions {
            ignore_extras: self.replay.ignore_extras,
            ignore_installed: self.replay.ignore_installed,
            skip_unavailable: self.replay.skip_unavailable,
            strict: self.replay.strict,
        }
    }

    pub fn lock_backoff(&self) -> Duration {
        Duration::from_millis(self.lock.backoff_ms)
    }

    /// Lock file that sits next to `db_path`
    pub fn lock_path_for(db_path: &Path) -> PathBuf {
        db_path.with_extension("lock")
    }
}
