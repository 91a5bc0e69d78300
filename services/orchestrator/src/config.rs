use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;
use walkthrough_core::verticals;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    /// Credentials for the streaming model. Checked when a session starts,
    /// not at load time, so offline tooling works without them.
    pub gemini_api_key: Option<String>,
    pub vertical: String,
    pub history_dir: PathBuf,
    pub poll_interval: Duration,
    pub log_level: Level,
    pub prompts_path: PathBuf,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let gemini_api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());

        let vertical =
            std::env::var("WALKTHROUGH_VERTICAL").unwrap_or_else(|_| "construction".to_string());
        if verticals::by_id(&vertical).is_none() {
            return Err(ConfigError::InvalidValue(
                "WALKTHROUGH_VERTICAL".to_string(),
                format!("'{}' is not one of {:?}", vertical, verticals::ids()),
            ));
        }

        let history_dir = std::env::var("HISTORY_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./walkthrough-history"));

        let poll_interval_str =
            std::env::var("POLL_INTERVAL_MS").unwrap_or_else(|_| "100".to_string());
        let poll_interval = match poll_interval_str.parse::<u64>() {
            Ok(ms) if ms > 0 => Duration::from_millis(ms),
            _ => {
                return Err(ConfigError::InvalidValue(
                    "POLL_INTERVAL_MS".to_string(),
                    format!("'{}' is not a positive number of milliseconds", poll_interval_str),
                ));
            }
        };

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let prompts_path = std::env::var("PROMPTS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./prompts"));

        Ok(Self {
            gemini_api_key,
            vertical,
            history_dir,
            poll_interval,
            log_level,
            prompts_path,
        })
    }

    /// Returns the API key or the error a session start should surface.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.gemini_api_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingVar("GEMINI_API_KEY".to_string()))
    }
}
