//! HTTP request handlers and the router.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, Registry, TextEncoder};
use serde::Deserialize;
use tower_http::compression::CompressionLayer;
use tracing::{error, info};

use querymon_core::exporter::{Exporter, ExporterError};
use querymon_core::target::resolve_target;

use crate::access_log::AccessLogLayer;
use crate::state::SharedState;

/// Builds the application router. `/scrape` only exists in probe mode.
pub(crate) fn router(state: SharedState) -> Router {
    let mut app = Router::new()
        .route("/", get(handle_landing))
        .route("/healthz", get(handle_health))
        .route(&state.telemetry_path, get(handle_metrics));
    if state.probe.is_some() {
        app = app.route("/scrape", get(handle_probe));
    }
    let routine_paths = [state.telemetry_path.clone(), "/scrape".to_string(), "/healthz".to_string()];
    app.with_state(state)
        .layer(AccessLogLayer::new(routine_paths))
        .layer(CompressionLayer::new())
}

// ============================================================
// Landing page / health
// ============================================================

pub(crate) async fn handle_landing(State(state): State<SharedState>) -> Html<String> {
    Html(format!(
        "<html>\n\
         <head><title>Querymon Exporter</title></head>\n\
         <body>\n\
         <h1>Querymon Exporter</h1>\n\
         <p><a href='{}'>Metrics</a></p>\n\
         </body>\n\
         </html>\n",
        state.telemetry_path
    ))
}

pub(crate) async fn handle_health() -> &'static str {
    "ok"
}

// ============================================================
// Metrics
// ============================================================

/// Process metrics plus, in single-target mode, a full scrape of the target.
pub(crate) async fn handle_metrics(State(state): State<SharedState>) -> Response {
    let gathered = tokio::task::spawn_blocking(move || {
        let mut families = prometheus::gather();
        if let Some(registry) = &state.registry {
            families.extend(registry.gather());
        }
        families
    })
    .await;

    match gathered {
        Ok(families) => encode(&families),
        Err(e) => {
            error!(error = %e, "metrics collection task failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics collection failed").into_response()
        }
    }
}

// ============================================================
// Probe
// ============================================================

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ProbeQuery {
    #[serde(default)]
    target: String,
    #[serde(default)]
    module: String,
}

/// Scrapes the requested target with a fresh exporter and registry, served
/// together with the process metrics of the default registry.
pub(crate) async fn handle_probe(
    State(state): State<SharedState>,
    Query(query): Query<ProbeQuery>,
) -> Response {
    let Some(probe) = &state.probe else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let target = match resolve_target(&query.target, &query.module, &probe.credentials) {
        Ok(target) => target,
        Err(e) => {
            info!(target = %query.target, module = %query.module, error = %e, "error parsing target");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    let connector = probe.connector.clone();
    let catalog = Arc::clone(&probe.catalog);
    let timeout = probe.query_timeout;
    let gathered = tokio::task::spawn_blocking(move || -> Result<Vec<MetricFamily>, ExporterError> {
        let exporter = Exporter::new(target.to_connection_string(), connector, catalog, timeout)?;
        let registry = Registry::new();
        registry.register(Box::new(exporter))?;
        let mut families = prometheus::gather();
        families.extend(registry.gather());
        Ok(families)
    })
    .await;

    match gathered {
        Ok(Ok(families)) => encode(&families),
        Ok(Err(e)) => {
            error!(target = %query.target, error = %e, "failed to create exporter");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
        Err(e) => {
            error!(target = %query.target, error = %e, "probe task failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "probe failed").into_response()
        }
    }
}

fn encode(families: &[MetricFamily]) -> Response {
    let encoder = TextEncoder::new();
    let mut buf = Vec::new();
    if let Err(e) = encoder.encode(families, &mut buf) {
        error!(error = %e, "failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }
    (
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buf,
    )
        .into_response()
}
