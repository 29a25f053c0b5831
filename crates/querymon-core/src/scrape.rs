//! Query execution and the per-definition scrape pipeline.

use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::db::{Database, DbError, NormalizedRow};
use crate::error::ConfigError;
use crate::metric::{MetricDefinition, Sample, translate};

/// Failure of one definition's scrape.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// The query exceeded its deadline and was cancelled.
    #[error("query timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),
    /// The query itself failed.
    #[error("query failed: {0}")]
    Query(DbError),
    /// The definition expects data but nothing was translated.
    #[error("no metrics found while parsing")]
    NoMetrics,
    /// The definition is not scrapable.
    #[error("invalid metric definition: {0}")]
    Invalid(#[from] ConfigError),
    /// A row handler rejected a row.
    #[error("row handler failed: {0}")]
    Row(String),
    /// The scrape task could not be started.
    #[error("failed to spawn scrape task: {0}")]
    Spawn(#[source] std::io::Error),
    /// The scrape task died before reporting.
    #[error("scrape task panicked")]
    Panicked,
}

impl ScrapeError {
    /// True when the query was slow rather than broken.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ScrapeError::Timeout(_))
    }
}

impl From<DbError> for ScrapeError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::Timeout(after) => ScrapeError::Timeout(after),
            other => ScrapeError::Query(other),
        }
    }
}

/// Executes `query` under `timeout` and feeds every row, in result order,
/// to `handler`.
///
/// A handler error stops the iteration and is returned unchanged. The result
/// set is owned by this call and released on every return path.
pub fn scrape_rows<D, F>(
    db: &D,
    query: &str,
    timeout: Duration,
    mut handler: F,
) -> Result<(), ScrapeError>
where
    D: Database + ?Sized,
    F: FnMut(NormalizedRow) -> Result<(), ScrapeError>,
{
    let (columns, rows) = db.query(query, timeout)?.into_parts();
    for values in rows {
        handler(NormalizedRow::normalize(&columns, &values))?;
    }
    Ok(())
}

/// Runs one definition end to end: query, translate, zero-result policy.
pub fn scrape_definition<D>(
    db: &D,
    definition: &MetricDefinition,
    timeout: Duration,
) -> Result<Vec<Sample>, ScrapeError>
where
    D: Database + ?Sized,
{
    definition.validate()?;
    debug!(
        context = %definition.context,
        labels = ?definition.labels,
        metrics = ?definition.value_columns.keys().collect::<Vec<_>>(),
        field_to_append = ?definition.field_naming(),
        ignore_zero_result = definition.ignore_zero_rows,
        "about to scrape metric"
    );

    let mut samples = Vec::new();
    scrape_rows(db, &definition.query, timeout, |row| {
        samples.extend(translate(definition, &row));
        Ok(())
    })?;

    debug!(context = %definition.context, count = samples.len(), "scraped metric");
    if !definition.ignore_zero_rows && samples.is_empty() {
        return Err(ScrapeError::NoMetrics);
    }
    Ok(samples)
}
