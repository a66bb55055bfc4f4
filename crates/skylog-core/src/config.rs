use anyhow::{Context, Result};
use config::{Config, Environment};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_LOG_FILE_PATH: &str = "logs/weather_app.log";
pub const DEFAULT_READINGS_FILE: &str = "weather_data.json";
pub const DEFAULT_API_KEY: &str = "YOUR_DEFAULT_API_KEY";
pub const DEFAULT_API_URL: &str = "http://api.openweathermap.org/data/2.5/weather";
pub const DEFAULT_CITIES_FILE: &str = "cities.json";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_RETENTION_DAYS: u32 = 3;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return String::new();
        }
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Runtime settings, sourced from the environment (and `.env`).
///
/// Field names map to upper-case variables: `api_key` is read from `API_KEY`,
/// `json_file_name` from `JSON_FILE_NAME`, and so on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log file the tracing subscriber appends to
    pub log_file_path: PathBuf,

    /// Flat JSON file holding every stored reading
    pub json_file_name: PathBuf,

    /// Weather API key, sent as `appid`
    pub api_key: String,

    /// Current-weather endpoint
    pub api_url: String,

    /// JSON file holding the known city names
    pub cities_file_name: PathBuf,

    /// Minimum spacing between stored readings
    pub poll_interval_secs: u64,

    /// Readings older than this many days are pruned
    pub retention_days: u32,

    /// Per-request HTTP timeout
    pub request_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_file_path: PathBuf::from(DEFAULT_LOG_FILE_PATH),
            json_file_name: PathBuf::from(DEFAULT_READINGS_FILE),
            api_key: DEFAULT_API_KEY.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            cities_file_name: PathBuf::from(DEFAULT_CITIES_FILE),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            retention_days: DEFAULT_RETENTION_DAYS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Settings {
    /// Load settings from the process environment, reading `.env` first if present.
    pub fn load() -> Result<Self> {
        if let Ok(path) = dotenv::dotenv() {
            tracing::debug!("Loaded environment overrides from {}", path.display());
        }
        Self::from_environment(Environment::default())
    }

    /// Load settings from an explicit set of variables instead of the process
    /// environment. Unset variables fall back to their defaults.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self> {
        Self::from_environment(Environment::default().source(Some(vars.into_iter().collect())))
    }

    fn from_environment(env: Environment) -> Result<Self> {
        let config = Config::builder()
            .set_default("log_file_path", DEFAULT_LOG_FILE_PATH)?
            .set_default("json_file_name", DEFAULT_READINGS_FILE)?
            .set_default("api_key", DEFAULT_API_KEY)?
            .set_default("api_url", DEFAULT_API_URL)?
            .set_default("cities_file_name", DEFAULT_CITIES_FILE)?
            .set_default("poll_interval_secs", DEFAULT_POLL_INTERVAL_SECS as i64)?
            .set_default("retention_days", i64::from(DEFAULT_RETENTION_DAYS))?
            .set_default("request_timeout_secs", DEFAULT_REQUEST_TIMEOUT_SECS as i64)?
            .add_source(env.try_parsing(true))
            .build()
            .context("Failed to read configuration from environment")?;

        config
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    /// Load settings and validate them
    ///
    /// Returns an error if validation fails with critical errors. Warnings are
    /// handed back so they can be logged once logging is up.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let settings = Self::load()?;
        let validation = settings.validate();

        if !validation.is_valid() {
            anyhow::bail!(
                "Configuration validation failed: {}",
                validation.error_summary()
            );
        }

        Ok((settings, validation))
    }

    /// Validate the settings
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        self.validate_url(&self.api_url, "API_URL", &mut result);

        if self.poll_interval_secs == 0 {
            result.add_error("POLL_INTERVAL_SECS", "Poll interval must be greater than 0");
        } else if self.poll_interval_secs > 86_400 {
            result.add_warning("POLL_INTERVAL_SECS", "Poll interval is more than 24 hours");
        }

        if self.retention_days == 0 {
            result.add_warning(
                "RETENTION_DAYS",
                "Retention of 0 days prunes every reading on each cycle",
            );
        }

        if self.request_timeout_secs == 0 {
            result.add_error("REQUEST_TIMEOUT_SECS", "Request timeout must be greater than 0");
        }

        if !self.has_api_key() {
            result.add_warning("API_KEY", "API key not configured - requests will be rejected");
        }

        if self.json_file_name.as_os_str().is_empty() {
            result.add_error("JSON_FILE_NAME", "Readings file path is empty");
        }

        if self.cities_file_name.as_os_str().is_empty() {
            result.add_error("CITIES_FILE_NAME", "City list file path is empty");
        }

        result
    }

    /// Check if the API key is set to something other than the placeholder
    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty() && self.api_key != DEFAULT_API_KEY
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(u64::from(self.retention_days) * 24 * 60 * 60)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }

                if url.port() == Some(0) {
                    result.add_error(field_name, "Port cannot be 0");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_from_empty_environment() {
        let settings = Settings::from_vars(HashMap::new()).unwrap();
        assert_eq!(settings.log_file_path, PathBuf::from(DEFAULT_LOG_FILE_PATH));
        assert_eq!(settings.json_file_name, PathBuf::from(DEFAULT_READINGS_FILE));
        assert_eq!(settings.api_key, DEFAULT_API_KEY);
        assert_eq!(settings.api_url, DEFAULT_API_URL);
        assert_eq!(settings.cities_file_name, PathBuf::from(DEFAULT_CITIES_FILE));
        assert_eq!(settings.poll_interval(), Duration::from_secs(60));
        assert_eq!(settings.retention(), Duration::from_secs(3 * 24 * 60 * 60));
    }

    #[test]
    fn test_environment_overrides() {
        let settings = Settings::from_vars(vars(&[
            ("API_KEY", "abc123"),
            ("API_URL", "https://weather.example.com/data"),
            ("JSON_FILE_NAME", "/tmp/readings.json"),
            ("POLL_INTERVAL_SECS", "300"),
            ("RETENTION_DAYS", "7"),
        ]))
        .unwrap();

        assert_eq!(settings.api_key, "abc123");
        assert_eq!(settings.api_url, "https://weather.example.com/data");
        assert_eq!(settings.json_file_name, PathBuf::from("/tmp/readings.json"));
        assert_eq!(settings.poll_interval_secs, 300);
        assert_eq!(settings.retention_days, 7);
        assert_eq!(settings.cities_file_name, PathBuf::from(DEFAULT_CITIES_FILE));
    }

    #[test]
    fn test_numeric_api_key_stays_a_string() {
        let settings = Settings::from_vars(vars(&[("API_KEY", "1234567890")])).unwrap();
        assert_eq!(settings.api_key, "1234567890");
    }

    #[test]
    fn test_non_numeric_interval_is_rejected() {
        let result = Settings::from_vars(vars(&[("POLL_INTERVAL_SECS", "soon")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_default_settings_are_valid() {
        let result = Settings::default().validate();
        assert!(result.is_valid(), "Default settings should be valid: {:?}", result.errors);
    }

    #[test]
    fn test_placeholder_api_key_is_warning() {
        let result = Settings::default().validate();
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.field == "API_KEY"));
    }

    #[test]
    fn test_invalid_url() {
        let settings = Settings {
            api_url: "not-a-url".to_string(),
            ..Settings::default()
        };
        let result = settings.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.field == "API_URL"));
    }

    #[test]
    fn test_invalid_url_scheme() {
        let settings = Settings {
            api_url: "ftp://weather.example.com".to_string(),
            ..Settings::default()
        };
        let result = settings.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.message.contains("http or https")));
    }

    #[test]
    fn test_zero_interval_is_error() {
        let settings = Settings {
            poll_interval_secs: 0,
            ..Settings::default()
        };
        let result = settings.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.field == "POLL_INTERVAL_SECS"));
    }

    #[test]
    fn test_zero_retention_is_warning() {
        let settings = Settings {
            retention_days: 0,
            api_key: "real-key".to_string(),
            ..Settings::default()
        };
        let result = settings.validate();
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.field == "RETENTION_DAYS"));
    }

    #[test]
    fn test_validation_result_error_summary() {
        let mut result = ValidationResult::default();
        result.add_error("field1", "error1");
        result.add_error("field2", "error2");
        let summary = result.error_summary();
        assert!(summary.contains("field1"));
        assert!(summary.contains("field2"));
    }
}
