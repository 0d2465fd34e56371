use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use csm_dashboard_scripts::operator_service::{self, LookupOptions};
use csm_dashboard_scripts::prometheus_metrics::Registar;
use csm_dashboard_scripts::scripts::prelude::{callers, ScriptRuntime};
use csm_dashboard_shared::csm::NodeOperatorId;
use csm_dashboard_shared::io::api::{ErrorResponse, IdentifierError, OperatorIdentifier, OperatorResponse};
use prometheus::{Encoder, Registry, TextEncoder};

pub struct AppState {
    pub registry: Registry,
    pub script_runtime: ScriptRuntime,
}

impl AppState {
    pub fn new(script_runtime: ScriptRuntime) -> anyhow::Result<Self> {
        let registry = Registry::new();
        script_runtime.metrics.register_on(&registry)?;
        Ok(Self {
            registry,
            script_runtime,
        })
    }

    pub fn log_config(&self) {
        tracing::info!(
            env_vars = ?self.script_runtime.env_vars,
            "Env vars",
        );
    }

    pub fn report_metrics(&self) -> Result<(Vec<u8>, String), prometheus::Error> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        encoder.encode(&mf, &mut buffer)?;
        Ok((buffer, encoder.format_type().to_owned()))
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    InvalidIdentifier(#[from] IdentifierError),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Operator not found")]
    NotFound,

    #[error(transparent)]
    Upstream(#[from] operator_service::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidIdentifier(_) | Error::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            detail: self.to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

pub async fn lookup_operator(
    state: &AppState,
    identifier: &str,
    options: LookupOptions,
) -> Result<OperatorResponse, Error> {
    let identifier: OperatorIdentifier = identifier.parse()?;
    let rewards = state
        .script_runtime
        .lookup(callers::HTTP, &identifier, options)
        .await
        .inspect_err(|e| tracing::error!("Lookup failed for {identifier:?}: {e}"))?;
    rewards.as_ref().map(OperatorResponse::from).ok_or(Error::NotFound)
}

pub async fn list_operators(state: &AppState) -> Result<Vec<NodeOperatorId>, Error> {
    let ids = state
        .script_runtime
        .operator_service
        .get_all_operators_with_rewards()
        .await
        .inspect_err(|e| tracing::error!("Failed to list operators: {e}"))?;
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status_codes() {
        assert_eq!(
            Error::from(IdentifierError::InvalidFormat).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::InvalidQuery("bad".to_owned()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(Error::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            Error::from(operator_service::Error::Validators(anyhow::anyhow!("down"))).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn error_detail_messages() {
        assert_eq!(Error::NotFound.to_string(), "Operator not found");
        assert_eq!(
            Error::from(IdentifierError::InvalidFormat).to_string(),
            "Invalid identifier format"
        );
    }
}
