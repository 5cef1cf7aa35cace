//! Database configuration management

use std::env;

use anyhow::{Context, Result};

/// Default driver when `DB_DRIVER` is not set
pub const DEFAULT_DRIVER: &str = "mysql";

/// Default MySQL port when `DB_PORT` is not set
pub const DEFAULT_PORT: u16 = 3306;

/// Connection settings loaded from environment variables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Driver name used by the factory (`mysql` or `sqlite`)
    pub driver: String,

    /// Database server host
    pub host: String,

    /// Database server port
    pub port: u16,

    /// Login user
    pub user: String,

    /// Login password
    pub pass: String,

    /// Database (schema) name. For SQLite this is the file path.
    pub name: String,

    /// Full connection URL; takes precedence over the discrete fields
    pub url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            driver: DEFAULT_DRIVER.to_string(),
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            user: "root".to_string(),
            pass: String::new(),
            name: String::new(),
            url: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            driver: env::var("DB_DRIVER")
                .map(|v| v.to_lowercase())
                .unwrap_or(defaults.driver),

            host: env::var("DB_HOST").unwrap_or(defaults.host),

            port: match env::var("DB_PORT") {
                Ok(port) => port.parse().context("Invalid DB_PORT")?,
                Err(_) => defaults.port,
            },

            user: env::var("DB_USER").unwrap_or(defaults.user),

            pass: env::var("DB_PASS").unwrap_or(defaults.pass),

            name: env::var("DB_NAME").unwrap_or(defaults.name),

            url: env::var("DATABASE_URL").ok(),
        })
    }

    /// Configuration for a private in-memory SQLite database
    pub fn sqlite_memory() -> Self {
        Self {
            driver: "sqlite".to_string(),
            url: Some("sqlite::memory:".to_string()),
            ..Self::default()
        }
    }

    /// Configuration for a file-backed SQLite database
    pub fn sqlite_file(path: impl Into<String>) -> Self {
        Self {
            driver: "sqlite".to_string(),
            name: path.into(),
            ..Self::default()
        }
    }

    pub fn with_driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = driver.into().to_lowercase();
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Whether the configured driver is one this build can talk to
    pub fn driver_supported(&self) -> bool {
        match self.driver.as_str() {
            "mysql" => cfg!(feature = "mysql"),
            "sqlite" => cfg!(feature = "sqlite"),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_target_mysql() {
        let config = Config::default();
        assert_eq!(config.driver, "mysql");
        assert_eq!(config.port, 3306);
        assert!(config.url.is_none());
    }

    #[test]
    fn test_sqlite_memory_uses_url() {
        let config = Config::sqlite_memory();
        assert_eq!(config.driver, "sqlite");
        assert_eq!(config.url.as_deref(), Some("sqlite::memory:"));
        assert!(config.driver_supported());
    }

    #[test]
    fn test_driver_name_is_normalized() {
        let config = Config::default().with_driver("MySQL");
        assert_eq!(config.driver, "mysql");

        let config = Config::default().with_driver("oracle");
        assert!(!config.driver_supported());
    }
}
