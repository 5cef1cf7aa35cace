//! SQLite driver
//!
//! SQLite accepts the MySQL-flavored statements the builders produce
//! (backtick identifiers, `LIMIT n OFFSET m`), which makes it the embedded
//! engine for local development and tests. SQLite stores booleans as 0/1
//! integers and datetimes as TEXT; values come back as stored.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqliteRow};
use sqlx::{Column, Connection as _, Row as _, Sqlite, SqliteConnection, TypeInfo, ValueRef};

use super::connection::{Driver, WriteResult};
use super::value::{Row, Value};
use crate::config::Config;
use crate::error::Result;

pub struct SqliteDriver {
    conn: SqliteConnection,
}

impl SqliteDriver {
    /// Open the database named by `config.url`, or the file at `config.name`.
    pub async fn connect(config: &Config) -> Result<Self> {
        let options = match &config.url {
            Some(url) => SqliteConnectOptions::from_str(url)?,
            None => SqliteConnectOptions::new().filename(&config.name),
        }
        .create_if_missing(true);

        let conn = SqliteConnection::connect_with(&options).await?;
        Ok(Self { conn })
    }
}

/// Bind a value to a sqlx query. Dates and JSON travel as TEXT.
fn bind_value<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &'q Value,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(if *b { 1i64 } else { 0i64 }),
        Value::Int(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::String(s) => query.bind(s.as_str()),
        Value::DateTime(dt) => query.bind(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
        Value::Json(json) => query.bind(json.to_string()),
    }
}

/// Decode a row using each value's storage class.
fn decode_row(row: &SqliteRow) -> Result<Row> {
    let mut decoded = Row::new();

    for column in row.columns() {
        let index = column.ordinal();
        let raw = row.try_get_raw(index)?;

        let value = if raw.is_null() {
            Value::Null
        } else {
            let storage = raw.type_info().name().to_string();
            match storage.as_str() {
                "INTEGER" | "BOOLEAN" => Value::Int(row.try_get::<i64, _>(index)?),
                "REAL" | "NUMERIC" => Value::Float(row.try_get::<f64, _>(index)?),
                "BLOB" => {
                    let bytes = row.try_get::<Vec<u8>, _>(index)?;
                    Value::String(String::from_utf8_lossy(&bytes).into_owned())
                }
                _ => Value::String(row.try_get::<String, _>(index)?),
            }
        };

        decoded.push(column.name(), value);
    }

    Ok(decoded)
}

#[async_trait]
impl Driver for SqliteDriver {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn fetch(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let mut query = sqlx::query(sql);
        for value in params {
            query = bind_value(query, value);
        }

        let rows = query.fetch_all(&mut self.conn).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<WriteResult> {
        let mut query = sqlx::query(sql);
        for value in params {
            query = bind_value(query, value);
        }

        let result = query.execute(&mut self.conn).await?;
        Ok(WriteResult {
            affected_rows: result.rows_affected(),
            // SQLite only reports matched rows
            changed_rows: result.rows_affected(),
            last_inserted_id: result.last_insert_rowid(),
        })
    }

    async fn ping(&mut self) -> bool {
        self.conn.ping().await.is_ok()
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.conn.close().await?;
        Ok(())
    }
}
