use async_trait::async_trait;
use serde_json::{Map, Number, Value};
use sqlx::postgres::{PgArguments, PgConnection, PgRow};
use sqlx::{Column, Connection, Row, TypeInfo};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use super::error::QueryError;
use crate::filter::SqlResult;

/// One joined row as column name -> scalar value.
pub type Record = Map<String, Value>;

/// A single-use authenticated connection scoped to one logical operation.
#[async_trait]
pub trait Session: Send + Sized {
    /// Run a `COUNT(*)` style query and return the first column of the first row.
    async fn fetch_count(&mut self, query: &SqlResult) -> Result<i64, QueryError>;

    async fn fetch_records(&mut self, query: &SqlResult) -> Result<Vec<Record>, QueryError>;

    /// Run a write statement, returning the affected row count.
    async fn execute(&mut self, statement: &SqlResult) -> Result<u64, QueryError>;

    /// Release the connection. Never fails; problems are only logged.
    async fn close(self);
}

pub struct PgSession {
    conn: PgConnection,
    query_timeout: Duration,
}

impl PgSession {
    pub fn new(conn: PgConnection, query_timeout: Duration) -> Self {
        Self { conn, query_timeout }
    }
}

#[async_trait]
impl Session for PgSession {
    async fn fetch_count(&mut self, query: &SqlResult) -> Result<i64, QueryError> {
        let mut q = sqlx::query(&query.query);
        for p in query.params.iter() {
            q = bind_param(q, p);
        }
        let row = bounded(self.query_timeout, q.fetch_one(&mut self.conn)).await?;
        let count: i64 = row.try_get(0)?;
        Ok(count)
    }

    async fn fetch_records(&mut self, query: &SqlResult) -> Result<Vec<Record>, QueryError> {
        let mut q = sqlx::query(&query.query);
        for p in query.params.iter() {
            q = bind_param(q, p);
        }
        let rows = bounded(self.query_timeout, q.fetch_all(&mut self.conn)).await?;
        debug!("Fetched {} rows", rows.len());
        rows.iter().map(row_to_record).collect()
    }

    async fn execute(&mut self, statement: &SqlResult) -> Result<u64, QueryError> {
        let mut q = sqlx::query(&statement.query);
        for p in statement.params.iter() {
            q = bind_param(q, p);
        }
        let result = bounded(self.query_timeout, q.execute(&mut self.conn)).await?;
        Ok(result.rows_affected())
    }

    async fn close(self) {
        if let Err(e) = self.conn.close().await {
            debug!("Error while closing database session: {}", e);
        }
    }
}

async fn bounded<T, F>(limit: Duration, fut: F) -> Result<T, QueryError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(QueryError::from),
        Err(_) => Err(QueryError::Timeout(limit)),
    }
}

fn bind_param<'q>(
    q: sqlx::query::Query<'q, sqlx::Postgres, PgArguments>,
    v: &'q Value,
) -> sqlx::query::Query<'q, sqlx::Postgres, PgArguments> {
    match v {
        Value::Null => {
            let none: Option<String> = None;
            q.bind(none)
        }
        Value::Bool(b) => q.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                q.bind(i)
            } else if let Some(f) = n.as_f64() {
                q.bind(f)
            } else {
                q.bind(n.to_string())
            }
        }
        Value::String(s) => q.bind(s.as_str()),
        Value::Array(_) | Value::Object(_) => q.bind(sqlx::types::Json(v.clone())),
    }
}

/// Convert a row into a [`Record`], decoding by declared column type.
pub fn row_to_record(row: &PgRow) -> Result<Record, QueryError> {
    let mut map = Map::new();

    for (i, column) in row.columns().iter().enumerate() {
        let name = column.name();
        let type_name = column.type_info().name();

        let value = match type_name {
            "BOOL" => decode::<bool>(row, i, name)?.map(Value::Bool),
            "INT2" => decode::<i16>(row, i, name)?.map(Value::from),
            "INT4" => decode::<i32>(row, i, name)?.map(Value::from),
            "INT8" => decode::<i64>(row, i, name)?.map(Value::from),
            "FLOAT4" => decode::<f32>(row, i, name)?.map(|f| float(f as f64)),
            "FLOAT8" => decode::<f64>(row, i, name)?.map(float),
            "NUMERIC" => decode::<sqlx::types::BigDecimal>(row, i, name)?.map(|d| Value::String(d.to_string())),
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => decode::<String>(row, i, name)?.map(Value::String),
            "DATE" => decode::<chrono::NaiveDate>(row, i, name)?.map(|d| Value::String(d.to_string())),
            "TIMESTAMP" => decode::<chrono::NaiveDateTime>(row, i, name)?
                .map(|t| Value::String(t.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
            "TIMESTAMPTZ" => decode::<chrono::DateTime<chrono::Utc>>(row, i, name)?
                .map(|t| Value::String(t.to_rfc3339())),
            "JSON" | "JSONB" => decode::<Value>(row, i, name)?,
            other => {
                return Err(QueryError::Mapping {
                    column: name.to_string(),
                    reason: format!("unsupported column type {}", other),
                })
            }
        };

        map.insert(name.to_string(), value.unwrap_or(Value::Null));
    }

    Ok(map)
}

fn decode<'r, T>(row: &'r PgRow, index: usize, column: &str) -> Result<Option<T>, QueryError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get::<Option<T>, _>(index).map_err(|e| QueryError::Mapping {
        column: column.to_string(),
        reason: e.to_string(),
    })
}

fn float(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}
