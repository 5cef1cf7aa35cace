//! Lazily-opened, single-engine connection
//!
//! A [`Connection`] owns at most one live driver session. The session is
//! opened on first use, shared by every repository and relation loader
//! holding the same `Arc<Connection>`, and serialized behind an async
//! mutex since there is no pooling.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{debug, info};

use super::value::{Row, Value};
use crate::config::Config;
use crate::error::{OrmError, Result};

/// Outcome of a statement that does not return rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteResult {
    pub affected_rows: u64,
    pub changed_rows: u64,
    pub last_inserted_id: i64,
}

/// Result of a single statement, classified by its leading verb.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    Rows(Vec<Row>),
    Write(WriteResult),
}

impl QueryOutput {
    /// Rows of a read; empty for writes.
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            QueryOutput::Rows(rows) => rows,
            QueryOutput::Write(_) => Vec::new(),
        }
    }

    /// Write summary; `None` for reads.
    pub fn write_result(&self) -> Option<WriteResult> {
        match self {
            QueryOutput::Rows(_) => None,
            QueryOutput::Write(result) => Some(*result),
        }
    }
}

/// Kind of statement as far as result shape is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Read,
    Write,
}

impl StatementKind {
    /// `SELECT` reads, every other verb writes.
    pub fn classify(sql: &str) -> Self {
        match sql.split_whitespace().next() {
            Some(verb) if verb.eq_ignore_ascii_case("SELECT") => StatementKind::Read,
            _ => StatementKind::Write,
        }
    }
}

/// An engine session able to run MySQL-flavored statements.
///
/// Parameters use `?` placeholders and are bound in order.
#[async_trait]
pub trait Driver: Send {
    /// Driver name as used in configuration (e.g. "mysql")
    fn name(&self) -> &'static str;

    /// Run a statement and decode every returned row.
    async fn fetch(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Run a statement that does not return rows.
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<WriteResult>;

    /// Check the session is still usable.
    async fn ping(&mut self) -> bool;

    /// Gracefully end the session.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Shared connection handle.
pub struct Connection {
    config: Config,
    driver: Mutex<Option<Box<dyn Driver>>>,
    statements: AtomicU64,
}

impl Connection {
    /// Create a connection for the configured driver. Nothing is opened yet.
    pub fn new(config: Config) -> Result<Self> {
        if !config.driver_supported() {
            return Err(OrmError::UnsupportedDriver(config.driver.clone()));
        }

        Ok(Self {
            config,
            driver: Mutex::new(None),
            statements: AtomicU64::new(0),
        })
    }

    /// Wrap an already-open driver session.
    pub fn with_driver(config: Config, driver: Box<dyn Driver>) -> Self {
        Self {
            config,
            driver: Mutex::new(Some(driver)),
            statements: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Number of statements handed to the engine so far.
    pub fn statements_executed(&self) -> u64 {
        self.statements.load(Ordering::Relaxed)
    }

    /// Open the session if it is not open yet.
    pub async fn connect(&self) -> Result<()> {
        let mut slot = self.driver.lock().await;
        self.ensure_open(&mut slot).await
    }

    async fn ensure_open(&self, slot: &mut Option<Box<dyn Driver>>) -> Result<()> {
        if slot.is_none() {
            let driver = open_driver(&self.config).await?;
            info!(driver = driver.name(), "Database connection opened");
            *slot = Some(driver);
        }
        Ok(())
    }

    /// Locked access to the live driver session, opening it if needed.
    pub async fn get_conn(&self) -> Result<MappedMutexGuard<'_, dyn Driver>> {
        let mut slot = self.driver.lock().await;
        self.ensure_open(&mut slot).await?;
        MutexGuard::try_map(slot, |slot| slot.as_deref_mut()).map_err(|_| OrmError::NotConnected)
    }

    /// Opens the session if needed, then checks the engine answers.
    pub async fn is_connected(&self) -> bool {
        let mut slot = self.driver.lock().await;
        if self.ensure_open(&mut slot).await.is_err() {
            return false;
        }
        match slot.as_mut() {
            Some(driver) => driver.ping().await,
            None => false,
        }
    }

    /// Close the session. The next access opens a new one.
    pub async fn close(&self) -> Result<()> {
        let driver = self.driver.lock().await.take();
        if let Some(driver) = driver {
            let name = driver.name();
            driver.close().await?;
            info!(driver = name, "Database connection closed");
        }
        Ok(())
    }

    /// Run one statement.
    pub async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryOutput> {
        let mut slot = self.driver.lock().await;
        self.ensure_open(&mut slot).await?;
        let driver = slot.as_mut().ok_or(OrmError::NotConnected)?;
        self.statements.fetch_add(1, Ordering::Relaxed);

        let kind = StatementKind::classify(sql);
        debug!(sql = %sql, params = params.len(), ?kind, "Executing statement");

        match kind {
            StatementKind::Read => Ok(QueryOutput::Rows(driver.fetch(sql, params).await?)),
            StatementKind::Write => Ok(QueryOutput::Write(driver.execute(sql, params).await?)),
        }
    }

    /// Run statements one after another without parameters.
    ///
    /// A failing statement does not stop the ones after it. Outputs come
    /// back in call order, or the first error once every statement ran.
    pub async fn query_many<S: AsRef<str>>(&self, statements: &[S]) -> Result<Vec<QueryOutput>> {
        let mut outputs = Vec::with_capacity(statements.len());
        let mut first_error = None;

        for sql in statements {
            match self.query(sql.as_ref(), &[]).await {
                Ok(output) => outputs.push(output),
                Err(e) => {
                    debug!(sql = %sql.as_ref(), error = %e, "Statement in batch failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(outputs),
        }
    }

    /// Run a read and return its rows.
    pub async fn fetch(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        Ok(self.query(sql, params).await?.into_rows())
    }
}

async fn open_driver(config: &Config) -> Result<Box<dyn Driver>> {
    match config.driver.as_str() {
        #[cfg(feature = "mysql")]
        "mysql" => Ok(Box::new(super::mysql::MySqlDriver::connect(config).await?)),
        #[cfg(feature = "sqlite")]
        "sqlite" => Ok(Box::new(super::sqlite::SqliteDriver::connect(config).await?)),
        other => Err(OrmError::UnsupportedDriver(other.to_string())),
    }
}
