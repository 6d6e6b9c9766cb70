//! Configuration for the landing page tracker.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides the submission endpoint.
pub const ENDPOINT_ENV: &str = "LANDING_TRACK_ENDPOINT";

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Collection endpoint the session record is posted to
    pub endpoint_url: String,

    /// Quiet period before a changed session is submitted
    #[serde(rename = "debounce_ms", with = "duration_millis")]
    pub debounce: Duration,

    /// Upper bound on fingerprint acquisition
    #[serde(rename = "fingerprint_timeout_ms", with = "duration_millis")]
    pub fingerprint_timeout: Duration,

    /// HTTP request timeout for submissions
    #[serde(rename = "request_timeout_ms", with = "duration_millis")]
    pub request_timeout: Duration,

    /// Attach at most one watcher per element and field kind
    pub dedupe_watchers: bool,

    /// Submit a still-pending session once on shutdown
    pub flush_on_stop: bool,

    /// Submit the session even if nothing was ever captured
    pub submit_initial: bool,

    /// Path for storing the transparency log
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("landing-track");

        Self {
            endpoint_url: "http://127.0.0.1:8787/track".to_string(),
            debounce: Duration::from_millis(500),
            fingerprint_timeout: Duration::from_millis(50),
            request_timeout: Duration::from_secs(10),
            dedupe_watchers: true,
            flush_on_stop: true,
            submit_initial: false,
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location, then apply environment
    /// overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        let config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            Self::from_json(&content)?
        } else {
            Self::default()
        };

        Ok(config.apply_env())
    }

    /// Parse configuration JSON. Missing keys take their defaults.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Override the endpoint from [`ENDPOINT_ENV`] when it is set.
    pub fn apply_env(self) -> Self {
        self.with_endpoint_override(std::env::var(ENDPOINT_ENV).ok())
    }

    fn with_endpoint_override(mut self, endpoint: Option<String>) -> Self {
        if let Some(endpoint) = endpoint.filter(|e| !e.trim().is_empty()) {
            self.endpoint_url = endpoint.trim().to_string();
        }
        self
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    fn save_to(&self, config_path: &Path) -> Result<(), ConfigError> {
        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("landing-track")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Location of the persisted transparency log.
    pub fn transparency_path(&self) -> PathBuf {
        self.data_path.join("transparency.json")
    }

    /// The runtime settings handed to a tracking service.
    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            quiet_period: self.debounce,
            fingerprint_timeout: self.fingerprint_timeout,
            dedupe_watchers: self.dedupe_watchers,
            flush_on_stop: self.flush_on_stop,
            submit_initial: self.submit_initial,
        }
    }
}

/// Runtime settings of one tracking service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    pub quiet_period: Duration,
    pub fingerprint_timeout: Duration,
    pub dedupe_watchers: bool,
    pub flush_on_stop: bool,
    pub submit_initial: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Config::default().tracker_config()
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration as whole milliseconds.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
