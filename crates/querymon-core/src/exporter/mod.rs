//! Scrape-cycle collector.
//!
//! One [`Exporter`] owns the database handle and health counters of one
//! target. Each cycle:
//!
//! ```text
//!   Idle ─► Pinging ──ok──────────────────────► ScrapingAll ─► Idle
//!              │                                    ▲
//!              └─closed─► Reconnecting ─► Pinging ──┘
//!              └─other error─► up=0, cycle aborted
//! ```
//!
//! `ScrapingAll` is a fork-join: one scoped thread per definition, all
//! sharing the read-only handle, joined before health samples are emitted.
//! A failed definition only bumps its own error counter.

mod family;
mod health;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::db::{Connector, Database, DbError};
use crate::metric::{MetricCatalog, MetricDefinition, Sample};
use crate::scrape::{ScrapeError, scrape_definition};
use health::HealthMetrics;

/// Failure to build an exporter.
#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("failed to open database handle: {0}")]
    Connect(#[from] DbError),
    #[error("failed to create health metrics: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Collects all configured definitions from one target.
///
/// Scrape cycles of one exporter are serialized; the database handle is
/// only replaced between cycles, never while definitions are running.
pub struct Exporter {
    dsn: String,
    connector: Arc<dyn Connector>,
    catalog: Arc<MetricCatalog>,
    query_timeout: Duration,
    db: Mutex<Arc<dyn Database>>,
    cycle: Mutex<()>,
    health: HealthMetrics,
}

impl Exporter {
    /// Opens a handle for `dsn` through `connector`.
    ///
    /// Opening a handle does not have to reach the server; connectivity is
    /// checked at the start of every cycle.
    pub fn new(
        dsn: impl Into<String>,
        connector: Arc<dyn Connector>,
        catalog: Arc<MetricCatalog>,
        query_timeout: Duration,
    ) -> Result<Self, ExporterError> {
        let dsn = dsn.into();
        let db = connector.connect(&dsn)?;
        Ok(Self {
            dsn,
            connector,
            catalog,
            query_timeout,
            db: Mutex::new(db),
            cycle: Mutex::new(()),
            health: HealthMetrics::new()?,
        })
    }

    /// Runs one scrape cycle and returns the samples of every definition
    /// that succeeded. Health metrics are updated as a side effect.
    pub fn scrape(&self) -> Vec<Sample> {
        let _cycle = self.cycle.lock().unwrap_or_else(PoisonError::into_inner);
        self.health.total_scrapes.inc();

        let db = match self.ping_or_reconnect() {
            Ok(db) => db,
            Err(e) => {
                error!(error = %e, "error pinging database");
                self.health.up.set(0.0);
                self.health.last_error.set(1.0);
                return Vec::new();
            }
        };
        debug!("successfully pinged database");
        self.health.up.set(1.0);

        let begun = Instant::now();
        let outcomes = run_definitions(db.as_ref(), self.catalog.definitions(), self.query_timeout);
        self.health.duration.set(begun.elapsed().as_secs_f64());

        let mut samples = Vec::new();
        let mut failed = false;
        for (definition, outcome) in outcomes {
            match outcome {
                Ok(scraped) => {
                    debug!(context = %definition.context, "successfully scraped metric");
                    samples.extend(scraped);
                }
                Err(e) => {
                    failed = true;
                    error!(
                        context = %definition.context,
                        timeout = e.is_timeout(),
                        error = %e,
                        "error scraping metric"
                    );
                    self.health
                        .scrape_errors
                        .with_label_values(&[definition.context.as_str()])
                        .inc();
                }
            }
        }
        self.health.last_error.set(if failed { 1.0 } else { 0.0 });
        samples
    }

    /// Pings the current handle, replacing it once if it reports itself closed.
    fn ping_or_reconnect(&self) -> Result<Arc<dyn Database>, DbError> {
        let mut db = self.lock_db();
        match db.ping() {
            Ok(()) => return Ok(db.clone()),
            Err(DbError::Closed) => {
                info!("reconnecting to database");
                *db = self.connector.connect(&self.dsn)?;
            }
            Err(e) => return Err(e),
        }
        db.ping()?;
        Ok(db.clone())
    }

    fn lock_db(&self) -> MutexGuard<'_, Arc<dyn Database>> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Collector for Exporter {
    fn desc(&self) -> Vec<&Desc> {
        self.health.desc()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let samples = self.scrape();
        let mut families = self.health.collect();
        families.extend(family::into_families(samples));
        families
    }
}

/// Scrapes every definition on its own thread and waits for all of them.
///
/// Each task reports only through its own return value.
fn run_definitions<'a>(
    db: &dyn Database,
    definitions: &'a [MetricDefinition],
    timeout: Duration,
) -> Vec<(&'a MetricDefinition, Result<Vec<Sample>, ScrapeError>)> {
    thread::scope(|s| {
        let handles: Vec<_> = definitions
            .iter()
            .map(|definition| {
                let handle = thread::Builder::new()
                    .name(format!("scrape-{}", definition.context))
                    .spawn_scoped(s, move || scrape_definition(db, definition, timeout));
                (definition, handle)
            })
            .collect();

        handles
            .into_iter()
            .map(|(definition, handle)| {
                let outcome = match handle {
                    Ok(handle) => handle.join().unwrap_or(Err(ScrapeError::Panicked)),
                    Err(e) => Err(ScrapeError::Spawn(e)),
                };
                (definition, outcome)
            })
            .collect()
    })
}
