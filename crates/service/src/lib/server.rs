use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Json, Router};
use csm_dashboard_scripts::operator_service::LookupOptions;
use csm_dashboard_shared::io::api::{HealthResponse, OperatorListResponse, OperatorResponse};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{Instrument, Span};

use crate::common::{list_operators, lookup_operator, AppState, Error};

const INDEX_HTML: &str = include_str!("../../static/index.html");

#[derive(Debug, Default, Deserialize)]
struct OperatorParams {
    #[serde(default)]
    detailed: bool,
    #[serde(default)]
    history: bool,
    #[serde(default)]
    withdrawals: bool,
}

impl From<OperatorParams> for LookupOptions {
    fn from(value: OperatorParams) -> Self {
        // history is rendered as part of the detailed view
        LookupOptions {
            include_validators: value.detailed || value.history,
            include_history: value.history,
            include_withdrawals: value.withdrawals,
        }
    }
}

pub fn router(state: Arc<AppState>, parent_span: Span) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .route("/api/health", get(api_health))
        .route("/api/operators", get(operators_handler))
        .route("/api/operator/{identifier}", get(operator_handler))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(parent_span))
        .with_state(state)
}

pub async fn run_server(state: Arc<AppState>, addr: SocketAddr, parent_span: Span) -> anyhow::Result<()> {
    let app = router(state, parent_span);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Starting service at {:?}", addr);
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    tracing::info!("Service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e:?}");
        std::future::pending::<()>().await;
    }
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health() -> &'static str {
    "ok"
}

async fn api_health() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.report_metrics() {
        Ok((buffer, format)) => ([(header::CONTENT_TYPE, format)], buffer).into_response(),
        Err(e) => {
            tracing::error!("Failed to collect metrics: {e:?}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to collect metrics").into_response()
        }
    }
}

async fn operator_handler(
    State(state): State<Arc<AppState>>,
    Path(identifier): Path<String>,
    params: Result<Query<OperatorParams>, QueryRejection>,
    Extension(parent_span): Extension<Span>,
) -> Result<Json<OperatorResponse>, Error> {
    let Query(params) = params.map_err(|e| Error::InvalidQuery(e.body_text()))?;
    let span = tracing::info_span!(parent: &parent_span, "operator", identifier = %identifier);
    lookup_operator(&state, &identifier, params.into())
        .instrument(span)
        .await
        .map(Json)
}

async fn operators_handler(
    State(state): State<Arc<AppState>>,
    Extension(parent_span): Extension<Span>,
) -> Result<Json<OperatorListResponse>, Error> {
    list_operators(&state)
        .instrument(parent_span)
        .await
        .map(|ids| Json(OperatorListResponse::from(ids)))
}
