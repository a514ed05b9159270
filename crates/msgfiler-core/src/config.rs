//! Archiver configuration.
//!
//! Stored as JSON. Every field has a default, so a partial (or missing) file
//! is fine. A few settings can be overridden through environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::filename::{DEFAULT_MAX_PATH_LENGTH, DEFAULT_TRUNCATION_MARKER, LengthLimit};
use crate::retry::{DEFAULT_MOVE_ATTEMPTS, DEFAULT_MOVE_DELAY, RetryPolicy};
use crate::store::{DEFAULT_FETCH_ATTEMPTS, DEFAULT_FETCH_DELAY};

/// Application name used for the configuration directory.
const APP_NAME: &str = "msgfiler";

/// Configuration file name.
const CONFIG_FILE: &str = "config.json";

/// Overrides `export_dir`.
pub const ENV_EXPORT_PATH: &str = "MSGFILER_EXPORT_PATH";

/// Overrides `known_senders_path`.
pub const ENV_KNOWN_SENDERS: &str = "MSGFILER_KNOWN_SENDERS";

/// Overrides `max_path_length`.
pub const ENV_MAX_PATH_LENGTH: &str = "MSGFILER_MAX_PATH_LENGTH";

/// Settings for the archival pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiverConfig {
    /// Directory that saved messages are written to.
    pub export_dir: PathBuf,
    /// CSV file with `sender_name` and `sender_email` columns.
    pub known_senders_path: Option<PathBuf>,
    /// Maximum length of a target path in characters.
    pub max_path_length: usize,
    /// Marker appended to truncated file names.
    pub truncation_marker: String,
    /// Attempts for a file move.
    pub move_retries: u32,
    /// Delay between file move attempts in milliseconds.
    pub move_retry_delay_ms: u64,
    /// Attempts for mail-store calls.
    pub fetch_retries: u32,
    /// Delay between mail-store call attempts in milliseconds.
    pub fetch_retry_delay_ms: u64,
    /// Set the file's modification time to the send date after moving it.
    pub stamp_sent_date: bool,
}

impl Default for ArchiverConfig {
    fn default() -> Self {
        Self {
            export_dir: PathBuf::from("./export"),
            known_senders_path: None,
            max_path_length: DEFAULT_MAX_PATH_LENGTH,
            truncation_marker: DEFAULT_TRUNCATION_MARKER.to_string(),
            move_retries: DEFAULT_MOVE_ATTEMPTS,
            move_retry_delay_ms: duration_ms(DEFAULT_MOVE_DELAY),
            fetch_retries: DEFAULT_FETCH_ATTEMPTS,
            fetch_retry_delay_ms: duration_ms(DEFAULT_FETCH_DELAY),
            stamp_sent_date: false,
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn duration_ms(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

impl ArchiverConfig {
    /// Default location: `<config dir>/msgfiler/config.json`.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Reads a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Reads a configuration file, falling back to defaults if it does not
    /// exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be loaded.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!(path = %path.display(), "No configuration file, using defaults");
            Ok(Self::default())
        }
    }

    /// Writes the configuration as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Applies overrides from the process environment.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`, keyed by the `MSGFILER_*` names.
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup(ENV_EXPORT_PATH).filter(|v| !v.is_empty()) {
            self.export_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup(ENV_KNOWN_SENDERS).filter(|v| !v.is_empty()) {
            self.known_senders_path = Some(PathBuf::from(path));
        }
        if let Some(value) = lookup(ENV_MAX_PATH_LENGTH) {
            match value.trim().parse() {
                Ok(length) => self.max_path_length = length,
                Err(_) => warn!(value, "Ignoring invalid {ENV_MAX_PATH_LENGTH}"),
            }
        }
        self
    }

    /// Checks the values for consistency.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.truncation_marker.is_empty() {
            return Err(Error::Config("truncation_marker must not be empty".into()));
        }
        if self.max_path_length <= self.truncation_marker.chars().count() {
            return Err(Error::Config(format!(
                "max_path_length ({}) must be longer than the truncation marker",
                self.max_path_length
            )));
        }
        if self.move_retries == 0 {
            return Err(Error::Config("move_retries must be at least 1".into()));
        }
        if self.fetch_retries == 0 {
            return Err(Error::Config("fetch_retries must be at least 1".into()));
        }
        Ok(())
    }

    /// Path length budget.
    #[must_use]
    pub fn length_limit(&self) -> LengthLimit {
        LengthLimit {
            max_length: self.max_path_length,
            marker: self.truncation_marker.clone(),
        }
    }

    /// Retry policy for file moves.
    #[must_use]
    pub const fn move_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.move_retries,
            Duration::from_millis(self.move_retry_delay_ms),
        )
    }

    /// Retry policy for mail-store calls.
    #[must_use]
    pub const fn fetch_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.fetch_retries,
            Duration::from_millis(self.fetch_retry_delay_ms),
        )
    }
}
