//! Database connection, drivers and the component factory
//!
//! Collaborators (controllers, migration tooling) never build drivers
//! themselves. They ask a [`Factory`] for the shared [`Connection`] and for
//! fresh statement and criteria builders, all selected by the configured
//! driver name.

pub mod connection;
#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod value;

use std::sync::Arc;

use anyhow::Context;
use once_cell::sync::{Lazy, OnceCell};
use tracing::debug;

pub use connection::{Connection, Driver, QueryOutput, StatementKind, WriteResult};
pub use value::{Row, Value};

use crate::config::Config;
use crate::error::{OrmError, Result};
use crate::orm::{QueryBuilder, SqlCriteria};

/// Hands out the shared connection and fresh builders for one driver.
pub struct Factory {
    config: Config,
    connection: OnceCell<Arc<Connection>>,
}

static GLOBAL: Lazy<std::result::Result<Factory, String>> = Lazy::new(|| {
    Config::from_env()
        .context("Failed to load database configuration")
        .map(Factory::new)
        .map_err(|e| format!("{:#}", e))
});

impl Factory {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            connection: OnceCell::new(),
        }
    }

    /// Process-wide factory configured from the environment.
    pub fn global() -> anyhow::Result<&'static Factory> {
        Lazy::force(&GLOBAL).as_ref().map_err(|e| anyhow::anyhow!(e.clone()))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn driver(&self) -> &str {
        &self.config.driver
    }

    /// The shared connection, created on first request. The engine session
    /// itself opens lazily on first query.
    pub fn connection(&self) -> Result<Arc<Connection>> {
        self.connection
            .get_or_try_init(|| {
                debug!(driver = %self.config.driver, "Creating shared connection");
                Connection::new(self.config.clone()).map(Arc::new)
            })
            .cloned()
    }

    /// A fresh statement builder for the configured dialect.
    pub fn query_builder(&self) -> Result<QueryBuilder> {
        self.ensure_supported()?;
        Ok(QueryBuilder)
    }

    /// A fresh criteria builder for the configured dialect.
    pub fn criteria(&self) -> Result<SqlCriteria> {
        self.ensure_supported()?;
        Ok(SqlCriteria)
    }

    fn ensure_supported(&self) -> Result<()> {
        if self.config.driver_supported() {
            Ok(())
        } else {
            Err(OrmError::UnsupportedDriver(self.config.driver.clone()))
        }
    }
}
