use std::{env, path::PathBuf, time::Duration};

use thiserror::Error;
use tracing::Level;

pub const DEFAULT_API_ADDR: &str = "api.clarifai.com:443";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone)]
pub struct Config {
    pub pat: String,
    pub api_addr: String,
    pub output_path: PathBuf,
    pub timeout_secs: u64,
    pub log_level: Level,
    pub default_user_id: Option<String>,
    pub default_app_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("CLARIFAI_PAT is required and must not be empty")]
    MissingPat,
    #[error("MCP_TIMEOUT_SECS must be a positive integer")]
    InvalidTimeout,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let pat = non_empty("CLARIFAI_PAT").ok_or(ConfigError::MissingPat)?;
        let api_addr = non_empty("CLARIFAI_API_ADDR").unwrap_or_else(|| DEFAULT_API_ADDR.to_string());
        let output_path = non_empty("MCP_OUTPUT_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(env::temp_dir);
        let timeout_secs = non_empty("MCP_TIMEOUT_SECS")
            .map(|value| {
                value
                    .parse::<u64>()
                    .ok()
                    .filter(|secs| *secs > 0)
                    .ok_or(ConfigError::InvalidTimeout)
            })
            .transpose()?
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        let log_level = parse_log_level(non_empty("MCP_LOG_LEVEL").as_deref());

        Ok(Self {
            pat,
            api_addr,
            output_path,
            timeout_secs,
            log_level,
            default_user_id: non_empty("CLARIFAI_DEFAULT_USER_ID"),
            default_app_id: non_empty("CLARIFAI_DEFAULT_APP_ID"),
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Unknown values fall back to `INFO`.
pub fn parse_log_level(value: Option<&str>) -> Level {
    match value.map(str::to_ascii_uppercase).as_deref() {
        Some("DEBUG") => Level::DEBUG,
        Some("WARN") | Some("WARNING") => Level::WARN,
        Some("ERROR") => Level::ERROR,
        _ => Level::INFO,
    }
}
