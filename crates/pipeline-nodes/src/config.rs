//! Configuration for the generation provider client

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default values for provider configuration
pub mod defaults {
    /// Base URL of the generation API
    pub const API_BASE_URL: &str = "http://localhost:8787";
    /// Per-request timeout; generation calls can take minutes
    pub const REQUEST_TIMEOUT_SECS: u64 = 120;
}

/// Environment variable overriding [`PipelineConfig::api_base_url`]
pub const ENV_API_URL: &str = "PIPELINE_API_URL";
/// Environment variable overriding [`PipelineConfig::request_timeout_secs`]
pub const ENV_API_TIMEOUT_SECS: &str = "PIPELINE_API_TIMEOUT_SECS";

/// Provider client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Base URL the `/api/*` endpoints hang off
    pub api_base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            api_base_url: defaults::API_BASE_URL.to_string(),
            request_timeout_secs: defaults::REQUEST_TIMEOUT_SECS,
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden by `PIPELINE_API_URL` and `PIPELINE_API_TIMEOUT_SECS`
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup(ENV_API_URL).filter(|u| !u.trim().is_empty()) {
            self.api_base_url = url.trim().trim_end_matches('/').to_string();
        }
        if let Some(raw) = lookup(ENV_API_TIMEOUT_SECS) {
            match raw.trim().parse() {
                Ok(secs) => self.request_timeout_secs = secs,
                Err(_) => log::warn!(
                    "Ignoring invalid {}={:?}, using {}s",
                    ENV_API_TIMEOUT_SECS,
                    raw,
                    self.request_timeout_secs
                ),
            }
        }
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Full URL of an API endpoint such as `/api/generate`
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url.trim_end_matches('/'), path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.api_base_url, "http://localhost:8787");
        assert_eq!(config.request_timeout(), Duration::from_secs(120));
        assert_eq!(
            config.endpoint("/api/generate"),
            "http://localhost:8787/api/generate"
        );
    }

    #[test]
    fn test_overrides() {
        let config = PipelineConfig::default().with_overrides(|key| match key {
            ENV_API_URL => Some("https://gen.example.com/".to_string()),
            ENV_API_TIMEOUT_SECS => Some("30".to_string()),
            _ => None,
        });
        assert_eq!(config.api_base_url, "https://gen.example.com");
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[test]
    fn test_invalid_timeout_is_ignored() {
        let config = PipelineConfig::default().with_overrides(|key| {
            (key == ENV_API_TIMEOUT_SECS).then(|| "soon".to_string())
        });
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"request_timeout_secs": 5}"#).unwrap();
        assert_eq!(config.api_base_url, defaults::API_BASE_URL);
        assert_eq!(config.request_timeout_secs, 5);
    }
}
