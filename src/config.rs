//! Configuration management for the citycast application
//!
//! Handles loading configuration from files and environment variables,
//! and provides validation for all configuration settings.

use crate::CitycastError;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure for the citycast application
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CitycastConfig {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Weather API settings
    #[serde(default)]
    pub weather: WeatherConfig,
    /// City dataset settings
    #[serde(default)]
    pub cities: CitiesConfig,
    /// User database settings
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Session settings
    #[serde(default)]
    pub session: SessionConfig,
    /// Forecast cache settings
    #[serde(default)]
    pub cache: CacheConfig,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_server_host")]
    pub host: String,
    /// Bind port
    #[serde(default = "default_server_port")]
    pub port: u16,
}

/// Weather API configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// Base URL for the forecast API
    #[serde(default = "default_weather_base_url")]
    pub base_url: String,
    /// Request timeout in seconds
    #[serde(default = "default_weather_timeout")]
    pub timeout_seconds: u32,
    /// Maximum number of retries for failed requests
    #[serde(default = "default_weather_max_retries")]
    pub max_retries: u32,
    /// How long fetched forecasts stay fresh, in seconds
    #[serde(default = "default_cache_expiry")]
    pub cache_expiry_seconds: u64,
}

/// City dataset configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitiesConfig {
    /// Path to the JSON city dataset
    #[serde(default = "default_dataset_path")]
    pub dataset_path: String,
}

/// User database configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database path, or ":memory:"
    #[serde(default = "default_database_path")]
    pub path: String,
    /// Connection pool size
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Run schema migrations on startup
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

/// Session configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Minutes before an idle session expires
    #[serde(default = "default_session_ttl")]
    pub ttl_minutes: i64,
}

/// Forecast cache configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache directory location
    #[serde(default = "default_cache_location")]
    pub location: String,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8080
}

fn default_weather_base_url() -> String {
    "https://api.open-meteo.com/v1".to_string()
}

fn default_weather_timeout() -> u32 {
    30
}

fn default_weather_max_retries() -> u32 {
    5
}

fn default_cache_expiry() -> u64 {
    3600
}

fn default_dataset_path() -> String {
    "data/cities.json".to_string()
}

fn default_database_path() -> String {
    "citycast.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_run_migrations() -> bool {
    true
}

fn default_session_ttl() -> i64 {
    60
}

fn default_cache_location() -> String {
    ".cache/citycast".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url: default_weather_base_url(),
            timeout_seconds: default_weather_timeout(),
            max_retries: default_weather_max_retries(),
            cache_expiry_seconds: default_cache_expiry(),
        }
    }
}

impl Default for CitiesConfig {
    fn default() -> Self {
        Self {
            dataset_path: default_dataset_path(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
            run_migrations: default_run_migrations(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: default_session_ttl(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            location: default_cache_location(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl CitycastConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path(None)
    }

    /// Load configuration from specified path
    pub fn load_from_path(config_path: Option<PathBuf>) -> Result<Self> {
        let mut builder = Config::builder();

        let config_file = config_path.unwrap_or_else(|| {
            Self::get_config_path().unwrap_or_else(|| PathBuf::from("config.toml"))
        });

        if config_file.exists() {
            builder = builder.add_source(
                File::from(config_file.clone())
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // Environment variable overrides with CITYCAST_ prefix,
        // e.g. CITYCAST_WEATHER__BASE_URL
        builder = builder.add_source(
            Environment::with_prefix("CITYCAST")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .with_context(|| "Failed to build configuration")?;

        let config: CitycastConfig = settings
            .try_deserialize()
            .with_context(|| "Failed to deserialize configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Get the default configuration file path
    #[must_use]
    pub fn get_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("citycast").join("config.toml"))
    }

    /// Validate all configuration settings
    pub fn validate(&self) -> Result<()> {
        if self.weather.timeout_seconds == 0 || self.weather.timeout_seconds > 300 {
            return Err(CitycastError::config(
                "Weather API timeout must be between 1 and 300 seconds",
            )
            .into());
        }

        if self.weather.max_retries > 10 {
            return Err(CitycastError::config("Weather API max retries cannot exceed 10").into());
        }

        if self.weather.cache_expiry_seconds > 7 * 24 * 3600 {
            return Err(
                CitycastError::config("Forecast cache expiry cannot exceed one week").into(),
            );
        }

        if !self.weather.base_url.starts_with("http://")
            && !self.weather.base_url.starts_with("https://")
        {
            return Err(CitycastError::config(
                "Weather API base URL must be a valid HTTP or HTTPS URL",
            )
            .into());
        }

        if self.database.max_connections == 0 || self.database.max_connections > 64 {
            return Err(CitycastError::config(
                "Database pool size must be between 1 and 64 connections",
            )
            .into());
        }

        if self.session.ttl_minutes < 1 {
            return Err(CitycastError::config("Session TTL must be at least one minute").into());
        }

        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            return Err(CitycastError::config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            ))
            .into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CitycastConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.weather.base_url, "https://api.open-meteo.com/v1");
        assert_eq!(config.weather.max_retries, 5);
        assert_eq!(config.weather.cache_expiry_seconds, 3600);
        assert_eq!(config.cities.dataset_path, "data/cities.json");
        assert_eq!(config.database.path, "citycast.db");
        assert_eq!(config.session.ttl_minutes, 60);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_default_config_validates() {
        assert!(CitycastConfig::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation_invalid_log_level() {
        let mut config = CitycastConfig::default();
        config.logging.level = "verbose".to_string();
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid log level"));
    }

    #[test]
    fn test_config_validation_numeric_ranges() {
        let mut config = CitycastConfig::default();
        config.weather.timeout_seconds = 500;
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("timeout"));

        let mut config = CitycastConfig::default();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());

        let mut config = CitycastConfig::default();
        config.session.ttl_minutes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_base_url_scheme() {
        let mut config = CitycastConfig::default();
        config.weather.base_url = "ftp://example.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_path_generation() {
        let path = CitycastConfig::get_config_path();
        assert!(path.is_some());
        let path = path.unwrap();
        assert!(path.to_string_lossy().contains("citycast"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config =
            CitycastConfig::load_from_path(Some(PathBuf::from("/nonexistent/config.toml")))
                .unwrap();
        assert_eq!(config.server.port, 8080);
    }
}
