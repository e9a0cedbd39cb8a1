//! Runtime configuration.
//!
//! Defaults match the timings the recommender has always used. Each value
//! can be overridden through an `EXT_RECOMMENDER_*` environment variable.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Name of the backing directory under the platform data dir.
pub const STORAGE_DIR_NAME: &str = "extension-recommender";

/// File holding the serialized model.
pub const MODEL_FILENAME: &str = "extension-recommender.model.json";

/// Marker file whose presence means "locked".
pub const LOCK_FILENAME: &str = "extension-recommender.lock";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backing directory shared by every recommender on this machine.
    pub storage_dir: PathBuf,

    /// How often a waiting caller checks the lock marker.
    pub lock_poll_interval_ms: u64,

    /// Upper bound on waiting for the lock.
    pub lock_timeout_ms: u64,

    /// Reap markers older than this whose holder process is gone.
    /// Off when `None`.
    pub stale_lock_after_ms: Option<u64>,

    /// Delay before the startup pass runs after a new session is detected.
    pub startup_delay_ms: u64,

    /// Upper bound on an install request.
    pub install_timeout_ms: u64,
}

/// `Default` cannot fail, so without a platform data dir it falls back to a
/// relative `extension-recommender` directory. [`Config::from_env`] does not
/// fall back and reports the missing data dir instead.
impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir().unwrap_or_else(|_| PathBuf::from(STORAGE_DIR_NAME)),
            lock_poll_interval_ms: 100,
            lock_timeout_ms: 10_000,
            stale_lock_after_ms: None,
            startup_delay_ms: 6_000,
            install_timeout_ms: 6_000,
        }
    }
}

impl Config {
    /// Builds a config rooted at the given directory with default timings.
    pub fn with_storage_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_dir: dir.into(),
            ..Self::default()
        }
    }

    /// Loads defaults and applies environment overrides.
    ///
    /// Environment variables:
    /// - `EXT_RECOMMENDER_DIR` overrides `storage_dir`
    /// - `EXT_RECOMMENDER_LOCK_TIMEOUT_MS` overrides `lock_timeout_ms`
    /// - `EXT_RECOMMENDER_STALE_LOCK_MS` enables stale-lock reaping
    /// - `EXT_RECOMMENDER_STARTUP_DELAY_MS` overrides `startup_delay_ms`
    /// - `EXT_RECOMMENDER_INSTALL_TIMEOUT_MS` overrides `install_timeout_ms`
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric override cannot be parsed, or if no
    /// directory is configured and the platform has no data directory.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with_dir(None)
    }

    /// Like [`from_env`](Self::from_env), with `dir` taking precedence over
    /// `EXT_RECOMMENDER_DIR` and the platform data dir.
    ///
    /// # Errors
    ///
    /// Same as [`from_env`](Self::from_env).
    pub fn from_env_with_dir(dir: Option<PathBuf>) -> Result<Self> {
        let storage_dir = match dir {
            Some(dir) => dir,
            None => match env::var("EXT_RECOMMENDER_DIR") {
                Ok(dir) => PathBuf::from(dir),
                Err(_) => default_storage_dir()?,
            },
        };
        let mut config = Self::with_storage_dir(storage_dir);

        if let Some(ms) = env_millis("EXT_RECOMMENDER_LOCK_TIMEOUT_MS")? {
            config.lock_timeout_ms = ms;
        }
        if let Some(ms) = env_millis("EXT_RECOMMENDER_STALE_LOCK_MS")? {
            config.stale_lock_after_ms = Some(ms);
        }
        if let Some(ms) = env_millis("EXT_RECOMMENDER_STARTUP_DELAY_MS")? {
            config.startup_delay_ms = ms;
        }
        if let Some(ms) = env_millis("EXT_RECOMMENDER_INSTALL_TIMEOUT_MS")? {
            config.install_timeout_ms = ms;
        }

        Ok(config)
    }

    pub fn lock_poll_interval(&self) -> Duration {
        Duration::from_millis(self.lock_poll_interval_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn stale_lock_after(&self) -> Option<Duration> {
        self.stale_lock_after_ms.map(Duration::from_millis)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    pub fn install_timeout(&self) -> Duration {
        Duration::from_millis(self.install_timeout_ms)
    }

    pub fn model_path(&self) -> PathBuf {
        self.storage_dir.join(MODEL_FILENAME)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.storage_dir.join(LOCK_FILENAME)
    }
}

/// Default backing directory: `<data_dir>/extension-recommender`.
///
/// # Errors
///
/// Returns an error if the platform has no data directory.
pub fn default_storage_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().context("Could not find data directory")?;
    Ok(data_dir.join(STORAGE_DIR_NAME))
}

fn env_millis(name: &str) -> Result<Option<u64>> {
    match env::var(name) {
        Ok(raw) => {
            let ms = raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("{name} must be a number of milliseconds, got '{raw}'"))?;
            Ok(Some(ms))
        }
        Err(_) => Ok(None),
    }
}
