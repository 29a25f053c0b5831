//! Database access abstractions.
//!
//! The scrape pipeline only sees the [`Database`] and [`Connector`] traits,
//! which allows it to run against a pooled PostgreSQL backend in production
//! and against [`mock::MockDatabase`] in tests.
//!
//! ```text
//!   Exporter ──connect(dsn)──► Connector ──► Arc<dyn Database>
//!                                              │
//!                              ping() / query(sql, timeout)
//!                                              │
//!                      ┌───────────────────────┴──────────────┐
//!                      │                                      │
//!               ┌──────▼──────┐                        ┌──────▼───────┐
//!               │ PgDatabase  │                        │ MockDatabase │
//!               │   (sqlx)    │                        │  (testing)   │
//!               └─────────────┘                        └──────────────┘
//! ```

pub mod mock;
mod pg;
mod row;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

pub use pg::{PgConnector, PgDatabase, PoolOptions};
pub use row::NormalizedRow;

/// Errors reported by a database backend.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DbError {
    /// The handle was closed and must be replaced.
    #[error("database is closed")]
    Closed,
    /// The connection string could not be parsed.
    #[error("invalid connection string: {0}")]
    InvalidDsn(String),
    /// A connection could not be established.
    #[error("connection failed: {0}")]
    Connect(String),
    /// The query exceeded its deadline and was cancelled.
    #[error("query timed out after {0:?}")]
    Timeout(Duration),
    /// The server rejected or failed the query.
    #[error("{0}")]
    Query(String),
}

/// A native column value as delivered by the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    /// Textual representation used by the row normalizer.
    ///
    /// Null becomes an empty string and numbers use their plain decimal form.
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Text(s) => s.clone(),
            Value::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

/// Tabular query result: column names plus rows of native values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Appends a row, builder style.
    pub fn with_row<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push_row(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn push_row(&mut self, values: Vec<Value>) {
        self.rows.push(values);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<Vec<Value>>) {
        (self.columns, self.rows)
    }
}

/// A live, shareable database handle.
///
/// Implementations must allow concurrent `query` calls from several threads.
pub trait Database: Send + Sync {
    /// Verifies the database is reachable.
    ///
    /// Returns [`DbError::Closed`] when the handle itself has been closed.
    fn ping(&self) -> Result<(), DbError>;

    /// Executes `sql`, cancelling it if it runs longer than `timeout`.
    fn query(&self, sql: &str, timeout: Duration) -> Result<ResultSet, DbError>;
}

/// Opens database handles from connection strings.
pub trait Connector: Send + Sync {
    fn connect(&self, dsn: &str) -> Result<Arc<dyn Database>, DbError>;
}
