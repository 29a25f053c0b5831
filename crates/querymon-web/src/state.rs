//! Shared application state and the global allocator.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::sync::Arc;
use std::time::Duration;

use prometheus::Registry;

use querymon_core::db::Connector;
use querymon_core::metric::MetricCatalog;
use querymon_core::target::CredentialStore;

/// Everything a probe request needs to build a one-shot exporter.
pub(crate) struct ProbeConfig {
    pub(crate) credentials: CredentialStore,
    pub(crate) catalog: Arc<MetricCatalog>,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) query_timeout: Duration,
}

/// Exactly one of `registry` (single-target mode) and `probe` is set.
pub(crate) struct WebAppInner {
    pub(crate) telemetry_path: String,
    /// Registry holding the long-lived exporter.
    pub(crate) registry: Option<Registry>,
    pub(crate) probe: Option<ProbeConfig>,
}

pub(crate) type SharedState = Arc<WebAppInner>;
