mod access_log;
mod handlers;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{ArgAction, Parser};
use prometheus::Registry;
use tracing::level_filters::LevelFilter;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use querymon_core::db::{PgConnector, PoolOptions};
use querymon_core::exporter::Exporter;
use querymon_core::metric::MetricCatalog;
use querymon_core::target::CredentialStore;

use state::{ProbeConfig, SharedState, WebAppInner};

// ============================================================
// CLI
// ============================================================

#[derive(Parser)]
#[command(
    name = "querymon",
    about = "Prometheus exporter for metrics defined as SQL queries",
    version = querymon_core::VERSION
)]
struct Args {
    /// Address to listen on for web interface and telemetry.
    #[arg(long = "web.listen-address", env = "LISTEN_ADDRESS", default_value = "0.0.0.0:9161")]
    listen_address: String,

    /// Path under which to expose metrics.
    #[arg(long = "web.telemetry-path", env = "TELEMETRY_PATH", default_value = "/metrics")]
    telemetry_path: String,

    /// TOML file with the default metric definitions.
    #[arg(long = "default.metrics", env = "DEFAULT_METRICS", default_value = "default-metrics.toml")]
    default_metrics: PathBuf,

    /// TOML file with additional metric definitions.
    #[arg(long = "custom.metrics", env = "CUSTOM_METRICS")]
    custom_metrics: Option<PathBuf>,

    /// Query timeout in seconds.
    #[arg(long = "query.timeout", env = "QUERY_TIMEOUT", default_value_t = 5)]
    query_timeout: u64,

    /// Connections kept open between scrapes.
    #[arg(long = "database.maxIdleConns", env = "DATABASE_MAXIDLECONNS", default_value_t = 0)]
    max_idle_conns: u32,

    /// Maximum open connections in the pool (0 = up to 1024).
    #[arg(long = "database.maxOpenConns", env = "DATABASE_MAXOPENCONNS", default_value_t = 10)]
    max_open_conns: u32,

    /// INI credential file for probe mode. Defaults to $HOME/config.default.cnf.
    #[arg(long = "config.cnf", env = "CONFIG_CNF")]
    config_cnf: Option<PathBuf>,

    /// Connection string of the single target. Unset enables probe mode on /scrape.
    #[arg(long = "data-source-name", env = "DATA_SOURCE_NAME", hide_env_values = true)]
    data_source_name: Option<String>,

    /// Increase verbosity (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (errors only).
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn custom_metrics(&self) -> Option<&PathBuf> {
        self.custom_metrics
            .as_ref()
            .filter(|p| !p.as_os_str().is_empty())
    }

    fn data_source_name(&self) -> Option<&str> {
        self.data_source_name
            .as_deref()
            .filter(|dsn| !dsn.trim().is_empty())
    }

    fn credentials_path(&self) -> PathBuf {
        self.config_cnf.clone().unwrap_or_else(|| {
            std::env::var_os("HOME")
                .map(PathBuf::from)
                .unwrap_or_default()
                .join("config.default.cnf")
        })
    }

    fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            max_idle: self.max_idle_conns,
            max_open: self.max_open_conns,
            acquire_timeout: Duration::from_secs(self.query_timeout),
        }
    }
}

/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        LevelFilter::ERROR
    } else {
        match verbose {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    };

    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

// ============================================================
// Main
// ============================================================

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to build tokio runtime");
            process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(async_main(args)) {
        error!("{e:#}");
        process::exit(1);
    }
}

async fn async_main(args: Args) -> anyhow::Result<()> {
    info!(version = querymon_core::VERSION, "starting querymon");

    let state = build_state(&args)?;
    let app = handlers::router(state).into_make_service_with_connect_info::<SocketAddr>();

    let addr = parse_listen_address(&args.listen_address)?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    info!("shut down");
    Ok(())
}

fn build_state(args: &Args) -> anyhow::Result<SharedState> {
    let telemetry_path = args.telemetry_path.trim().to_string();
    if !telemetry_path.starts_with('/') || matches!(telemetry_path.as_str(), "/" | "/healthz" | "/scrape") {
        bail!("invalid telemetry path {telemetry_path:?}");
    }

    let catalog = Arc::new(
        MetricCatalog::load_with_custom(&args.default_metrics, args.custom_metrics().map(PathBuf::as_path))
            .context("failed to load metric definitions")?,
    );
    let connector = Arc::new(PgConnector::new(
        args.pool_options(),
        tokio::runtime::Handle::current(),
    ));
    let query_timeout = Duration::from_secs(args.query_timeout);

    let inner = match args.data_source_name() {
        Some(dsn) => {
            info!(definitions = catalog.len(), "single-target mode");
            let exporter = Exporter::new(dsn, connector, catalog, query_timeout)
                .context("failed to create exporter")?;
            let registry = Registry::new();
            registry
                .register(Box::new(exporter))
                .context("failed to register exporter")?;
            WebAppInner {
                telemetry_path,
                registry: Some(registry),
                probe: None,
            }
        }
        None => {
            let path = args.credentials_path();
            let credentials = CredentialStore::load(&path)
                .with_context(|| format!("error parsing config, file: {}", path.display()))?;
            info!(config = %path.display(), definitions = catalog.len(), "probe mode on /scrape");
            WebAppInner {
                telemetry_path,
                registry: None,
                probe: Some(ProbeConfig {
                    credentials,
                    catalog,
                    connector,
                    query_timeout,
                }),
            }
        }
    };
    Ok(Arc::new(inner))
}

/// Accepts `host:port` and the bare `:port` form.
fn parse_listen_address(raw: &str) -> anyhow::Result<SocketAddr> {
    let full = if raw.starts_with(':') {
        format!("0.0.0.0{raw}")
    } else {
        raw.to_string()
    };
    full.parse()
        .with_context(|| format!("invalid listen address {raw:?}"))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
