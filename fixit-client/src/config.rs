//! Client configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Access tokens are refreshed well before the backend's 30 minute lifetime
const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 25 * 60;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the FixIt REST API
    pub api_url: String,

    /// File backing durable storage for the command-line client
    pub state_file: PathBuf,

    /// Period of the background access-token refresh
    pub refresh_interval_secs: u64,

    /// Timeout applied to every HTTP request
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:8000/api".to_string(),
            state_file: default_state_file(),
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            request_timeout_secs: 15,
        }
    }
}

impl Config {
    /// Configuration pointing at a given API base URL, defaults elsewhere
    pub fn with_api_url(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ..Self::default()
        }
    }

    /// Load configuration from `FIXIT_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("FIXIT_API_URL") {
            config.api_url = url;
        }
        if let Some(path) = lookup("FIXIT_STATE_FILE") {
            config.state_file = PathBuf::from(path);
        }
        if let Some(secs) = parse_secs(&lookup, "FIXIT_REFRESH_INTERVAL_SECS") {
            config.refresh_interval_secs = secs;
        }
        if let Some(secs) = parse_secs(&lookup, "FIXIT_REQUEST_TIMEOUT_SECS") {
            config.request_timeout_secs = secs;
        }

        config
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

fn parse_secs(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<u64> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(secs) => Some(secs),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring invalid number in environment");
            None
        }
    }
}

fn default_state_file() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".fixit")
        .join("session.json")
}
