//! citycast - multi-day city weather forecasts behind a simple login
//!
//! This library provides the city directory, the Open-Meteo forecast
//! client, the user store with hashed-password credentials, and the web
//! surface that ties them together.

pub mod auth;
pub mod cache;
pub mod cities;
pub mod config;
pub mod db;
pub mod error;
pub mod forecast;
pub mod handlers;
pub mod users;
pub mod web;

// Re-export core types for public API
pub use auth::{PasswordHasher, SessionStore};
pub use cache::ResponseCache;
pub use cities::{CityDirectory, CityEntry, Coords};
pub use config::CitycastConfig;
pub use error::CitycastError;
pub use forecast::{ForecastClient, ForecastTable};
pub use users::{User, UserStore};
pub use web::AppState;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Core result type used throughout the library
pub type Result<T> = std::result::Result<T, CitycastError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
