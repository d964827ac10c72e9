//! Process-level settings read from the environment (and `.env`).

use std::fmt;

pub const API_KEY_VAR: &str = "OPENAI_API_KEY";
pub const MODEL_VAR: &str = "REALTIME_MODEL";
pub const ENDPOINT_VAR: &str = "REALTIME_ENDPOINT";

const MASK_KEEP: usize = 5;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(&'static str, String),
}

#[derive(Clone)]
pub struct Settings {
    pub api_key: String,
    pub model: Option<String>,
    pub endpoint: Option<String>,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("api_key", &mask_secret(&self.api_key))
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl Settings {
    /// Load `.env` if present, then read settings from the process environment.
    ///
    /// # Errors
    /// Returns an error if the API key is missing or a value is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                tracing::warn!("Ignoring unreadable .env file: {err}");
            }
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup`, which maps a variable name to its value.
    ///
    /// # Errors
    /// Returns an error if the API key is missing or a value is malformed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_key = non_empty(lookup(API_KEY_VAR)).ok_or(ConfigError::MissingVar(API_KEY_VAR))?;
        if api_key.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidValue(API_KEY_VAR, "contains whitespace".to_string()));
        }

        let endpoint = non_empty(lookup(ENDPOINT_VAR));
        if let Some(endpoint) = &endpoint {
            let url = url::Url::parse(endpoint).map_err(|e| ConfigError::InvalidValue(ENDPOINT_VAR, e.to_string()))?;
            if !matches!(url.scheme(), "ws" | "wss") {
                return Err(ConfigError::InvalidValue(
                    ENDPOINT_VAR,
                    format!("expected a ws:// or wss:// URL, got {}://", url.scheme()),
                ));
            }
        }

        let settings = Self {
            api_key,
            model: non_empty(lookup(MODEL_VAR)),
            endpoint,
        };
        tracing::debug!(api_key = %settings.masked_api_key(), "Settings loaded");
        Ok(settings)
    }

    #[must_use]
    pub fn masked_api_key(&self) -> String {
        mask_secret(&self.api_key)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Keep the first and last five characters of a secret; short secrets are
/// hidden entirely.
#[must_use]
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= MASK_KEEP * 2 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..MASK_KEEP].iter().collect();
    let tail: String = chars[chars.len() - MASK_KEEP..].iter().collect();
    format!("{head}...{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn api_key_is_required() {
        assert_eq!(
            Settings::from_lookup(lookup(&[])).unwrap_err(),
            ConfigError::MissingVar(API_KEY_VAR)
        );
        assert_eq!(
            Settings::from_lookup(lookup(&[(API_KEY_VAR, "  ")])).unwrap_err(),
            ConfigError::MissingVar(API_KEY_VAR)
        );
    }

    #[test]
    fn optional_values_are_read() {
        let settings = Settings::from_lookup(lookup(&[
            (API_KEY_VAR, "sk-test-1234567890"),
            (MODEL_VAR, "gpt-4o-realtime-preview"),
            (ENDPOINT_VAR, "wss://example.test/v1/realtime"),
        ]))
        .unwrap();
        assert_eq!(settings.model.as_deref(), Some("gpt-4o-realtime-preview"));
        assert_eq!(settings.endpoint.as_deref(), Some("wss://example.test/v1/realtime"));
    }

    #[test]
    fn http_endpoint_is_rejected() {
        let err = Settings::from_lookup(lookup(&[(API_KEY_VAR, "sk-test"), (ENDPOINT_VAR, "https://example.test")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ENDPOINT_VAR, _)));
    }

    #[test]
    fn secrets_are_masked() {
        assert_eq!(mask_secret("sk-abcdefghijklmnop"), "sk-ab...lmnop");
        assert_eq!(mask_secret("short"), "*****");
        let settings = Settings::from_lookup(lookup(&[(API_KEY_VAR, "sk-abcdefghijklmnop")])).unwrap();
        assert!(!format!("{settings:?}").contains("cdefghijk"));
    }
}
