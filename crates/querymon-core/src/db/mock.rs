//! In-memory database for testing the scrape pipeline without a server.
//!
//! # Usage
//!
//! ```
//! use std::time::Duration;
//! use querymon_core::db::{Database, ResultSet, Value};
//! use querymon_core::db::mock::MockDatabase;
//!
//! let db = MockDatabase::new().with_rows(
//!     "SELECT 1 AS one",
//!     ResultSet::new(["one"]).with_row([Value::Int(1)]),
//! );
//! let rs = db.query("SELECT 1 AS one", Duration::from_secs(1)).unwrap();
//! assert_eq!(rs.rows().len(), 1);
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use super::{Connector, Database, DbError, ResultSet};

#[derive(Debug, Clone)]
enum Response {
    Rows(ResultSet),
    Error(String),
    Delayed(Duration, ResultSet),
}

/// Scripted database: each query text maps to a fixed response.
///
/// Unknown queries fail with a query error, like a missing relation would.
#[derive(Debug, Default)]
pub struct MockDatabase {
    responses: HashMap<String, Response>,
    ping_error: Option<DbError>,
    closed: AtomicBool,
    pings: AtomicUsize,
    executed: Mutex<Vec<String>>,
}

impl MockDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers `sql` with `rows`.
    pub fn with_rows(mut self, sql: &str, rows: ResultSet) -> Self {
        self.responses.insert(sql.to_string(), Response::Rows(rows));
        self
    }

    /// Fails `sql` with a query error carrying `message`.
    pub fn with_error(mut self, sql: &str, message: &str) -> Self {
        self.responses
            .insert(sql.to_string(), Response::Error(message.to_string()));
        self
    }

    /// Answers `sql` after `delay`; if the caller's timeout is shorter,
    /// the query times out instead.
    pub fn with_delay(mut self, sql: &str, delay: Duration, rows: ResultSet) -> Self {
        self.responses
            .insert(sql.to_string(), Response::Delayed(delay, rows));
        self
    }

    /// Makes `ping` fail with `error`.
    pub fn with_ping_error(mut self, error: DbError) -> Self {
        self.ping_error = Some(error);
        self
    }

    /// Marks the handle closed; `ping` and `query` report [`DbError::Closed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn ping_count(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    /// Queries executed so far, in completion order.
    pub fn executed(&self) -> Vec<String> {
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Database for MockDatabase {
    fn ping(&self) -> Result<(), DbError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        if self.closed.load(Ordering::SeqCst) {
            return Err(DbError::Closed);
        }
        match &self.ping_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn query(&self, sql: &str, timeout: Duration) -> Result<ResultSet, DbError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DbError::Closed);
        }
        let result = match self.responses.get(sql) {
            Some(Response::Rows(rows)) => Ok(rows.clone()),
            Some(Response::Error(message)) => Err(DbError::Query(message.clone())),
            Some(Response::Delayed(delay, rows)) => {
                if *delay > timeout {
                    thread::sleep(timeout);
                    Err(DbError::Timeout(timeout))
                } else {
                    thread::sleep(*delay);
                    Ok(rows.clone())
                }
            }
            None => Err(DbError::Query(format!(
                "ERROR: no scripted response for query {sql:?}"
            ))),
        };
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sql.to_string());
        result
    }
}

/// Hands out pre-built handles in order, recording each requested DSN.
#[derive(Default)]
pub struct MockConnector {
    handles: Mutex<VecDeque<Arc<MockDatabase>>>,
    dsns: Mutex<Vec<String>>,
}

impl MockConnector {
    pub fn new<I>(handles: I) -> Self
    where
        I: IntoIterator<Item = Arc<MockDatabase>>,
    {
        Self {
            handles: Mutex::new(handles.into_iter().collect()),
            dsns: Mutex::new(Vec::new()),
        }
    }

    /// Connection strings passed to `connect`, in call order.
    pub fn dsns(&self) -> Vec<String> {
        self.dsns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Connector for MockConnector {
    fn connect(&self, dsn: &str) -> Result<Arc<dyn Database>, DbError> {
        self.dsns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(dsn.to_string());
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .map(|db| db as Arc<dyn Database>)
            .ok_or_else(|| DbError::Connect("no more mock handles".to_string()))
    }
}
