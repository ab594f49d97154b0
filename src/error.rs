//! Error types and handling for the citycast application

use thiserror::Error;

/// Main error type for the citycast application
#[derive(Error, Debug)]
pub enum CitycastError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Errors talking to the weather provider
    #[error("API error: {message}")]
    Api { message: String },

    /// Input validation errors
    #[error("Invalid input: {message}")]
    Validation { message: String },

    /// Uniqueness conflicts in the user store
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// City name with no entry in the directory dataset
    #[error("Unknown city: {name}")]
    CityNotFound { name: String },

    /// Cache operation errors
    #[error("Cache error: {message}")]
    Cache { message: String },

    /// Database errors
    #[error("Database error: {source}")]
    Database {
        #[from]
        source: rusqlite::Error,
    },

    /// Connection pool errors
    #[error("Connection pool error: {source}")]
    Pool {
        #[from]
        source: r2d2::Error,
    },

    /// Template rendering errors
    #[error("Template error: {source}")]
    Template {
        #[from]
        source: tera::Error,
    },

    /// I/O operation errors
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// General application errors
    #[error("Application error: {message}")]
    General { message: String },
}

impl CitycastError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new API error
    pub fn api<S: Into<String>>(message: S) -> Self {
        Self::Api {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a new conflict error
    pub fn conflict<S: Into<String>>(message: S) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Create a new city-not-found error
    pub fn city_not_found<S: Into<String>>(name: S) -> Self {
        Self::CityNotFound { name: name.into() }
    }

    /// Create a new cache error
    pub fn cache<S: Into<String>>(message: S) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    /// Create a new general error
    pub fn general<S: Into<String>>(message: S) -> Self {
        Self::General {
            message: message.into(),
        }
    }

    /// Get a message safe to show on a rendered page
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            CitycastError::Config { .. } => {
                "Configuration error. Please check the server configuration.".to_string()
            }
            CitycastError::Api { .. } => {
                "Unable to reach the weather service. Please try again later.".to_string()
            }
            CitycastError::Validation { message } | CitycastError::Conflict { message } => {
                message.clone()
            }
            CitycastError::CityNotFound { name } => {
                format!("Unknown city \"{name}\". Check the spelling and try again.")
            }
            CitycastError::Cache { .. } => {
                "A cache operation failed. Please try again.".to_string()
            }
            CitycastError::Database { .. } | CitycastError::Pool { .. } => {
                "A storage error occurred. Please try again.".to_string()
            }
            CitycastError::Template { .. }
            | CitycastError::Io { .. }
            | CitycastError::General { .. } => "Something went wrong on our side.".to_string(),
        }
    }
}

// Transport errors from the forecast client's HTTP stack all surface as
// API errors; the retry middleware has already done its work by then.
impl From<reqwest::Error> for CitycastError {
    fn from(source: reqwest::Error) -> Self {
        Self::api(source.to_string())
    }
}

impl From<reqwest_middleware::Error> for CitycastError {
    fn from(source: reqwest_middleware::Error) -> Self {
        Self::api(source.to_string())
    }
}

impl From<serde_json::Error> for CitycastError {
    fn from(source: serde_json::Error) -> Self {
        Self::general(format!("JSON error: {source}"))
    }
}
