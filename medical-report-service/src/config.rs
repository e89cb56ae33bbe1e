use anyhow::{Context as _, Result};
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_ANALYSIS_MODEL: &str = "gemini-2.5-pro";
pub const DEFAULT_CHAT_MODEL: &str = "gemini-2.5-flash";

/// Service settings, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    /// Deployment-time credential applied to every new session
    pub api_key: Option<String>,
    pub api_base: String,
    pub analysis_model: String,
    pub chat_model: String,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub session_idle_timeout: Duration,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let port = match lookup("PORT") {
            Some(port) => port.parse::<u16>().context("PORT must be a valid port number")?,
            None => 3000,
        };
        let max_retries = match lookup("ANALYSIS_MAX_RETRIES") {
            Some(n) => n
                .parse::<u32>()
                .context("ANALYSIS_MAX_RETRIES must be a non-negative integer")?,
            None => 2,
        };
        let retry_base_ms = match lookup("ANALYSIS_RETRY_BASE_MS") {
            Some(ms) => ms
                .parse::<u64>()
                .context("ANALYSIS_RETRY_BASE_MS must be a number of milliseconds")?,
            None => 1000,
        };
        let idle_secs = match lookup("SESSION_IDLE_TIMEOUT_SECS") {
            Some(secs) => secs
                .parse::<u64>()
                .context("SESSION_IDLE_TIMEOUT_SECS must be a number of seconds")?,
            None => 3600,
        };

        Ok(Self {
            port,
            api_key: lookup("GEMINI_API_KEY").filter(|key| !key.trim().is_empty()),
            api_base: lookup("GEMINI_API_BASE")
                .map(|base| base.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            analysis_model: lookup("GEMINI_ANALYSIS_MODEL")
                .unwrap_or_else(|| DEFAULT_ANALYSIS_MODEL.to_string()),
            chat_model: lookup("GEMINI_CHAT_MODEL")
                .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            max_retries,
            retry_base_delay: Duration::from_millis(retry_base_ms),
            session_idle_timeout: Duration::from_secs(idle_secs),
        })
    }
}
