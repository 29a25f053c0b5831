//! querymon-core: SQL query to Prometheus metrics bridge.
//!
//! Provides:
//! - `metric`: metric definitions, the definition catalog loader, value kinds,
//!   samples and the row-to-sample translator
//! - `db`: database abstractions, row normalization, the pooled PostgreSQL
//!   backend and an in-memory mock backend
//! - `scrape`: query execution with deadlines and the per-definition pipeline
//! - `exporter`: the scrape-cycle collector exposed as a `prometheus` collector
//! - `target`: credential store and per-request target resolution (probe mode)

pub mod db;
pub mod error;
pub mod exporter;
pub mod metric;
pub mod scrape;
pub mod target;

pub use error::ConfigError;

/// Crate version, shared with the binaries for `--version` output.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
