//! Cache configuration: where cached documents live and how long they stay fresh.
//!
//! Configuration can be loaded from a TOML file, environment variables, or
//! created programmatically. Environment variables take precedence over the
//! file when both are applied.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_CACHE_DIR: &str = "PDF_MARKUP_CACHE_DIR";
pub const ENV_CACHE_TTL_HOURS: &str = "PDF_MARKUP_CACHE_TTL_HOURS";

const DEFAULT_TTL_HOURS: u64 = 24;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding one file per cached document
    pub dir: PathBuf,
    /// Entries older than this are treated as absent
    pub ttl_hours: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { dir: Self::default_cache_dir(), ttl_hours: DEFAULT_TTL_HOURS }
    }
}

impl CacheConfig {
    pub fn new(dir: PathBuf, ttl_hours: u64) -> Self {
        Self { dir, ttl_hours }
    }

    /// Sets the cache directory.
    pub fn with_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.dir = path.as_ref().to_path_buf();
        self
    }

    /// Sets the freshness window in hours.
    pub fn with_ttl_hours(mut self, hours: u64) -> Self {
        self.ttl_hours = hours;
        self
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_hours.saturating_mul(60 * 60))
    }

    /// Returns the default cache directory for the current platform.
    ///
    /// - macOS: ~/Library/Caches/pdf-markup/documents
    /// - Linux: ~/.cache/pdf-markup/documents
    /// - Windows: %LOCALAPPDATA%\pdf-markup\documents
    pub fn default_cache_dir() -> PathBuf {
        if let Some(cache_dir) = dirs::cache_dir() {
            cache_dir.join("pdf-markup").join("documents")
        } else {
            PathBuf::from("cache/documents")
        }
    }

    /// Loads configuration from environment variables on top of the defaults.
    ///
    /// - `PDF_MARKUP_CACHE_DIR`: cache directory path
    /// - `PDF_MARKUP_CACHE_TTL_HOURS`: freshness window in hours (default: 24)
    ///
    /// # Errors
    /// Returns an error if any environment variable contains an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_env()
    }

    /// Overrides fields with any cache variables present in the environment.
    pub fn apply_env(mut self) -> Result<Self, ConfigError> {
        if let Ok(val) = std::env::var(ENV_CACHE_DIR) {
            self.dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var(ENV_CACHE_TTL_HOURS) {
            self.ttl_hours = val
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidValue(ENV_CACHE_TTL_HOURS.to_string()))?;
        }

        Ok(self)
    }

    /// Loads configuration from a TOML file.
    ///
    /// Expected file format:
    /// ```toml
    /// dir = "/path/to/cache"
    /// ttl_hours = 24
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path.as_ref(), toml::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for configuration key: {0}")]
    InvalidValue(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unable to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}
