// Configuration module
// Centralized management of application configuration

use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};

pub mod tts; // Polling, batching and retry settings

pub use tts::{BatchConfig, GenerationConfig, OrchestrationConfig};

pub const API_KEY_ENV: &str = "RUNPOD_API_KEY";
pub const API_URL_ENV: &str = "RUNPOD_API_URL";

// Имена переменных из .env файла фронтенда, принимаем как запасной вариант
const LEGACY_API_KEY_ENV: &str = "VITE_RUNPOD_API_KEY";
const LEGACY_API_URL_ENV: &str = "VITE_RUNPOD_API_URL";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Bearer token for the synthesis endpoint
    pub api_key: Option<String>,
    /// Full `/run` URL of the serverless endpoint
    pub endpoint_url: Option<String>,
    /// Per-request HTTP timeout
    pub request_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint_url: None,
            request_timeout_secs: 60,
        }
    }
}

impl AppConfig {
    pub fn new(endpoint_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            endpoint_url: Some(endpoint_url.into()),
            ..Self::default()
        }
    }

    /// Load configuration from the process environment.
    ///
    /// Missing values are kept as `None`; they only become an error when a
    /// request actually needs them (see [`AppConfig::credentials`]).
    pub fn from_env() -> Self {
        Self {
            api_key: read_env(&[API_KEY_ENV, LEGACY_API_KEY_ENV]),
            endpoint_url: read_env(&[API_URL_ENV, LEGACY_API_URL_ENV]),
            ..Self::default()
        }
    }

    /// Returns `(endpoint_url, api_key)` or a configuration error if either is missing.
    pub fn credentials(&self) -> AppResult<(&str, &str)> {
        match (self.endpoint_url.as_deref(), self.api_key.as_deref()) {
            (Some(url), Some(key)) => Ok((url, key)),
            _ => Err(AppError::ConfigurationError(format!(
                "RunPod API configuration missing. Set {} and {}.",
                API_URL_ENV, API_KEY_ENV
            ))),
        }
    }
}

fn read_env(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credentials_is_configuration_error() {
        let config = AppConfig::default();
        let err = config.credentials().unwrap_err();
        assert!(matches!(err, AppError::ConfigurationError(_)));

        let config = AppConfig {
            endpoint_url: Some("https://api.runpod.ai/v2/abc/run".into()),
            ..AppConfig::default()
        };
        assert!(config.credentials().is_err());
    }

    #[test]
    fn test_credentials_present() {
        let config = AppConfig::new("https://api.runpod.ai/v2/abc/run", "secret");
        let (url, key) = config.credentials().unwrap();
        assert_eq!(url, "https://api.runpod.ai/v2/abc/run");
        assert_eq!(key, "secret");
    }
}
