//! Relational Query Client
//!
//! Runs a single read-only statement per request over a fresh MySQL
//! connection and renders each row as an ordered JSON object.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Number, Value};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{Column, ConnectOptions, Connection, Row, TypeInfo, ValueRef};
use thiserror::Error;
use tracing::{info, instrument};

use super::secrets::DbCredentials;

const DEFAULT_PORT: u16 = 3306;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),
}

/// One result row: column name to value, in select-list order.
pub type QueryRow = Map<String, Value>;

#[async_trait]
pub trait Database: Send + Sync {
    async fn query(&self, credentials: &DbCredentials, sql: &str) -> Result<Vec<QueryRow>, DatabaseError>;
}

/// MySQL backend; connects, queries and disconnects per call.
#[derive(Debug, Clone, Default)]
pub struct MySqlDatabase;

impl MySqlDatabase {
    pub fn new() -> Self {
        Self
    }

    fn connect_options(credentials: &DbCredentials) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&credentials.host)
            .port(credentials.port.unwrap_or(DEFAULT_PORT))
            .username(&credentials.username)
            .password(&credentials.password)
            .database(&credentials.dbname)
    }
}

#[async_trait]
impl Database for MySqlDatabase {
    #[instrument(skip(self, credentials, sql), fields(host = %credentials.host, dbname = %credentials.dbname))]
    async fn query(&self, credentials: &DbCredentials, sql: &str) -> Result<Vec<QueryRow>, DatabaseError> {
        let mut conn: MySqlConnection = Self::connect_options(credentials)
            .connect()
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;

        let fetched = sqlx::query(sql).fetch_all(&mut conn).await;
        // Closed on both the success and the failure path.
        let _ = conn.close().await;

        let rows = fetched.map_err(|e| DatabaseError::Query(e.to_string()))?;
        info!(rows = rows.len(), "Query completed");
        Ok(rows.iter().map(row_to_json).collect())
    }
}

fn row_to_json(row: &MySqlRow) -> QueryRow {
    row.columns()
        .iter()
        .map(|column| {
            let value = column_value(row, column.ordinal(), column.type_info().name());
            (column.name().to_string(), value)
        })
        .collect()
}

/// Decode one cell. Values without a JSON counterpart (decimals, temporal
/// types, blobs) are rendered as strings.
fn column_value(row: &MySqlRow, index: usize, type_name: &str) -> Value {
    match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Err(_) => return Value::Null,
        Ok(_) => {}
    }

    match type_name {
        "BOOLEAN" | "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => row
            .try_get::<i64, _>(index)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" | "BIT" => row
            .try_get::<u64, _>(index)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "FLOAT" => row
            .try_get::<f32, _>(index)
            .ok()
            .and_then(|f| Number::from_f64(f64::from(f)))
            .map_or(Value::Null, Value::Number),
        "DOUBLE" => row
            .try_get::<f64, _>(index)
            .ok()
            .and_then(Number::from_f64)
            .map_or(Value::Null, Value::Number),
        "DECIMAL" => text(row.try_get::<Decimal, _>(index)),
        "DATETIME" => text(row.try_get::<NaiveDateTime, _>(index)),
        "TIMESTAMP" => text(row.try_get::<DateTime<Utc>, _>(index)),
        "DATE" => text(row.try_get::<NaiveDate, _>(index)),
        "TIME" => text(row.try_get::<NaiveTime, _>(index)),
        _ => match row.try_get::<String, _>(index) {
            Ok(s) => Value::String(s),
            Err(_) => row
                .try_get::<Vec<u8>, _>(index)
                .map(|bytes| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
                .unwrap_or(Value::Null),
        },
    }
}

fn text<T: ToString>(decoded: Result<T, sqlx::Error>) -> Value {
    decoded.map_or(Value::Null, |v| Value::String(v.to_string()))
}
