//! Exporter self-observation metrics.

use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{Counter, CounterVec, Gauge, Opts};

use crate::metric::NAMESPACE;

const SUBSYSTEM: &str = "exporter";

/// Health samples of one exporter instance.
///
/// Counters are cumulative over the exporter's lifetime: process-long in
/// single-target mode, one request in probe mode.
pub(crate) struct HealthMetrics {
    pub(crate) up: Gauge,
    pub(crate) duration: Gauge,
    pub(crate) last_error: Gauge,
    pub(crate) total_scrapes: Counter,
    pub(crate) scrape_errors: CounterVec,
}

impl HealthMetrics {
    pub(crate) fn new() -> Result<Self, prometheus::Error> {
        Ok(Self {
            up: Gauge::with_opts(
                Opts::new("up", "Whether the database server is up.").namespace(NAMESPACE),
            )?,
            duration: Gauge::with_opts(
                Opts::new(
                    "last_scrape_duration_seconds",
                    "Duration of the last scrape of metrics from the database.",
                )
                .namespace(NAMESPACE)
                .subsystem(SUBSYSTEM),
            )?,
            last_error: Gauge::with_opts(
                Opts::new(
                    "last_scrape_error",
                    "Whether the last scrape of metrics resulted in an error (1 for error, 0 for success).",
                )
                .namespace(NAMESPACE)
                .subsystem(SUBSYSTEM),
            )?,
            total_scrapes: Counter::with_opts(
                Opts::new(
                    "scrapes_total",
                    "Total number of times the database was scraped for metrics.",
                )
                .namespace(NAMESPACE)
                .subsystem(SUBSYSTEM),
            )?,
            scrape_errors: CounterVec::new(
                Opts::new(
                    "scrape_errors_total",
                    "Total number of times an error occurred scraping a metric definition.",
                )
                .namespace(NAMESPACE)
                .subsystem(SUBSYSTEM),
                &["collector"],
            )?,
        })
    }

    pub(crate) fn desc(&self) -> Vec<&Desc> {
        let mut descs = Vec::new();
        descs.extend(self.up.desc());
        descs.extend(self.duration.desc());
        descs.extend(self.last_error.desc());
        descs.extend(self.total_scrapes.desc());
        descs.extend(self.scrape_errors.desc());
        descs
    }

    pub(crate) fn collect(&self) -> Vec<MetricFamily> {
        let mut families = Vec::new();
        families.extend(self.up.collect());
        families.extend(self.duration.collect());
        families.extend(self.last_error.collect());
        families.extend(self.total_scrapes.collect());
        // An empty vector has no metrics yet and must not reach the encoder.
        families.extend(
            self.scrape_errors
                .collect()
                .into_iter()
                .filter(|mf| !mf.get_metric().is_empty()),
        );
        families
    }
}
