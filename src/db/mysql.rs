//! MySQL driver

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use sqlx::mysql::{MySqlArguments, MySqlConnectOptions, MySqlRow};
use sqlx::{Arguments, Column, Connection as _, MySqlConnection, Row as _, TypeInfo, ValueRef};

use super::connection::{Driver, WriteResult};
use super::value::{Row, Value};
use crate::config::Config;
use crate::error::Result;

pub struct MySqlDriver {
    conn: MySqlConnection,
}

impl MySqlDriver {
    /// Connect using `config.url` when present, otherwise the discrete
    /// host/port/user/pass/name settings.
    pub async fn connect(config: &Config) -> Result<Self> {
        let options = match &config.url {
            Some(url) => url.parse::<MySqlConnectOptions>()?,
            None => {
                let options = MySqlConnectOptions::new()
                    .host(&config.host)
                    .port(config.port)
                    .username(&config.user)
                    .password(&config.pass);
                if config.name.is_empty() {
                    options
                } else {
                    options.database(&config.name)
                }
            }
        };

        let conn = MySqlConnection::connect_with(&options).await?;
        Ok(Self { conn })
    }
}

/// Encode parameters positionally for a `?`-placeholder statement.
fn bind_args(params: &[Value]) -> Result<MySqlArguments> {
    let mut args = MySqlArguments::default();
    for value in params {
        let added = match value {
            Value::Null => args.add(None::<String>),
            Value::Bool(b) => args.add(*b),
            Value::Int(i) => args.add(*i),
            Value::Float(f) => args.add(*f),
            Value::String(s) => args.add(s.clone()),
            Value::DateTime(dt) => args.add(*dt),
            Value::Json(json) => args.add(sqlx::types::Json(json.clone())),
        };
        added.map_err(sqlx::Error::Encode)?;
    }
    Ok(args)
}

/// How a declared column type is read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnClass {
    // TINYINT(1); kept as 1/0 so boolean coercion sees the stored integer
    Boolean,
    Signed,
    Unsigned,
    Float,
    Double,
    Decimal,
    DateTime,
    Date,
    Time,
    Json,
    Binary,
    Text,
}

impl ColumnClass {
    fn of(type_name: &str) -> Self {
        match type_name {
            "BOOLEAN" => Self::Boolean,
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => Self::Signed,
            name if name.ends_with("UNSIGNED") => Self::Unsigned,
            "FLOAT" => Self::Float,
            "DOUBLE" => Self::Double,
            "DECIMAL" => Self::Decimal,
            "DATETIME" | "TIMESTAMP" => Self::DateTime,
            "DATE" => Self::Date,
            "TIME" => Self::Time,
            "JSON" => Self::Json,
            "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BINARY" | "VARBINARY" => Self::Binary,
            _ => Self::Text,
        }
    }
}

fn bool_value(b: bool) -> Value {
    Value::Int(i64::from(b))
}

/// Values past `i64::MAX` clamp to it.
fn unsigned_value(n: u64) -> Value {
    Value::Int(i64::try_from(n).unwrap_or(i64::MAX))
}

fn decimal_value(d: Decimal) -> Value {
    Value::Float(d.to_f64().unwrap_or_default())
}

fn date_value(date: NaiveDate) -> Value {
    Value::DateTime(date.and_time(NaiveTime::MIN))
}

fn binary_value(bytes: &[u8]) -> Value {
    Value::String(String::from_utf8_lossy(bytes).into_owned())
}

/// Decode a row using the declared column types.
fn decode_row(row: &MySqlRow) -> Result<Row> {
    let mut decoded = Row::new();

    for column in row.columns() {
        let index = column.ordinal();
        let raw = row.try_get_raw(index)?;

        let value = if raw.is_null() {
            Value::Null
        } else {
            match ColumnClass::of(column.type_info().name()) {
                ColumnClass::Boolean => bool_value(row.try_get::<bool, _>(index)?),
                ColumnClass::Signed => Value::Int(row.try_get::<i64, _>(index)?),
                ColumnClass::Unsigned => unsigned_value(row.try_get::<u64, _>(index)?),
                ColumnClass::Float => Value::Float(f64::from(row.try_get::<f32, _>(index)?)),
                ColumnClass::Double => Value::Float(row.try_get::<f64, _>(index)?),
                ColumnClass::Decimal => decimal_value(row.try_get::<Decimal, _>(index)?),
                ColumnClass::DateTime => Value::DateTime(row.try_get::<NaiveDateTime, _>(index)?),
                ColumnClass::Date => date_value(row.try_get::<NaiveDate, _>(index)?),
                ColumnClass::Time => Value::String(row.try_get::<NaiveTime, _>(index)?.to_string()),
                ColumnClass::Json => Value::Json(row.try_get::<serde_json::Value, _>(index)?),
                ColumnClass::Binary => binary_value(&row.try_get::<Vec<u8>, _>(index)?),
                ColumnClass::Text => Value::String(row.try_get::<String, _>(index)?),
            }
        };

        decoded.push(column.name(), value);
    }

    Ok(decoded)
}

#[async_trait]
impl Driver for MySqlDriver {
    fn name(&self) -> &'static str {
        "mysql"
    }

    async fn fetch(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let rows = sqlx::query_with(sql, bind_args(params)?)
            .fetch_all(&mut self.conn).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<WriteResult> {
        let result = sqlx::query_with(sql, bind_args(params)?)
            .execute(&mut self.conn).await?;
        Ok(WriteResult {
            affected_rows: result.rows_affected(),
            // the protocol's changed-row count is not exposed by sqlx
            changed_rows: result.rows_affected(),
            last_inserted_id: i64::try_from(result.last_insert_id()).unwrap_or(i64::MAX),
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
