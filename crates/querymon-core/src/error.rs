//! Configuration errors shared by the definition catalog and the credential store.

use std::path::PathBuf;

use thiserror::Error;

/// Error raised while loading or validating static configuration.
///
/// These are fatal to the affected definition or file and are never
/// downgraded to a default at scrape time.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration file could not be read.
    #[error("failed to read {}: {error}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    /// The metric definition file is not valid TOML or has the wrong shape.
    #[error("failed to parse metric definitions from {origin}: {error}")]
    Definitions {
        origin: String,
        #[source]
        error: toml::de::Error,
    },

    /// The credential store is not a valid INI file.
    #[error("failed to parse credential store: {0}")]
    Credentials(String),

    /// A definition has no query text.
    #[error("metric definition {context:?} has no request; did you forget to define it?")]
    EmptyQuery { context: String },

    /// A definition has no value columns.
    #[error("metric definition {context:?} has no metricsdesc; did you forget to define it?")]
    NoValueColumns { context: String },

    /// A context, label or value column that cannot appear in a metric.
    #[error("metric definition {context:?} has invalid {what} {name:?}")]
    InvalidName {
        context: String,
        what: &'static str,
        name: String,
    },

    /// A value kind token other than `gauge` or `counter`.
    #[error("unknown metric type {token:?} for column {column:?}")]
    UnknownKind { column: String, token: String },
}
