//! Configuration loading from environment variables.

use std::env;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Application configuration loaded from environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file
    pub database_path: String,

    /// DataWars2 API base URL (prices and trade history)
    pub datawars_api_url: String,

    /// Official GW2 API base URL (vendor values and order books)
    pub gw2_api_url: String,

    /// HTTP request timeout in seconds
    pub request_timeout_secs: u64,

    /// Max retries for retriable HTTP failures
    pub max_retries: u32,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// All variables are optional (with defaults):
    /// - TP_DB_PATH: SQLite database path (default: gw2.db)
    /// - DATAWARS_API_URL: DataWars2 API base URL
    /// - GW2_API_URL: GW2 API base URL
    /// - HTTP_TIMEOUT_SECS: request timeout (default: 30)
    /// - HTTP_MAX_RETRIES: retry budget per request (default: 3)
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present
        dotenvy::dotenv().ok();
        Self::from_env_only()
    }

    /// Load configuration from environment variables only (no .env file).
    /// Useful for testing.
    pub fn from_env_only() -> Result<Self, ConfigError> {
        let database_path = env::var("TP_DB_PATH").unwrap_or_else(|_| "gw2.db".to_string());

        let datawars_api_url = env::var("DATAWARS_API_URL")
            .unwrap_or_else(|_| "https://api.datawars2.ie/gw2/v1".to_string());

        let gw2_api_url =
            env::var("GW2_API_URL").unwrap_or_else(|_| "https://api.guildwars2.com/v2".to_string());

        let request_timeout_secs = parse_var("HTTP_TIMEOUT_SECS", 30)?;
        let max_retries = parse_var("HTTP_MAX_RETRIES", 3)?;

        Ok(Self {
            database_path,
            datawars_api_url,
            gw2_api_url,
            request_timeout_secs,
            max_retries,
        })
    }
}

/// Parse an optional numeric variable, erroring only when it is present but malformed.
fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string(), raw)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_config_defaults() {
        env::remove_var("TP_DB_PATH");
        env::remove_var("DATAWARS_API_URL");
        env::remove_var("GW2_API_URL");
        env::remove_var("HTTP_TIMEOUT_SECS");
        env::remove_var("HTTP_MAX_RETRIES");

        let config = Config::from_env_only().unwrap();

        assert_eq!(config.database_path, "gw2.db");
        assert_eq!(config.datawars_api_url, "https://api.datawars2.ie/gw2/v1");
        assert_eq!(config.gw2_api_url, "https://api.guildwars2.com/v2");
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    #[serial]
    fn test_config_overrides() {
        env::set_var("TP_DB_PATH", "/tmp/test.db");
        env::set_var("HTTP_TIMEOUT_SECS", "5");

        let config = Config::from_env_only().unwrap();
        assert_eq!(config.database_path, "/tmp/test.db");
        assert_eq!(config.request_timeout_secs, 5);

        env::remove_var("TP_DB_PATH");
        env::remove_var("HTTP_TIMEOUT_SECS");
    }

    #[test]
    #[serial]
    fn test_config_invalid_numeric() {
        env::set_var("HTTP_TIMEOUT_SECS", "not-a-number");

        let result = Config::from_env_only();
        assert!(result.is_err());

        if let Err(ConfigError::InvalidValue(var, _)) = result {
            assert_eq!(var, "HTTP_TIMEOUT_SECS");
        } else {
            panic!("Expected InvalidValue error");
        }

        env::remove_var("HTTP_TIMEOUT_SECS");
    }
}
