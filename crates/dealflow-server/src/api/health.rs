//! Health check endpoint

use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use crate::server::DealflowServer;

/// Liveness plus the non-secret settings the pipelines run with
pub async fn health_check(State(server): State<Arc<DealflowServer>>) -> impl IntoResponse {
    debug!("Health check requested");
    let config = server.orchestrator().config();
    Json(json!({
        "status": "UP",
        "version": env!("CARGO_PKG_VERSION"),
        "orchestrator": {
            "fanOutConcurrency": config.fan_out_concurrency,
            "correlationField": config.correlation_field,
        },
        "fallbackCredential": server.config.crm_api_token.is_some(),
    }))
}
