//! Pipeline endpoints
//!
//! Each handler runs its pipeline on a spawned task and waits for it, so a
//! client that disconnects mid-request does not cut a pipeline short between
//! a remote write and its local mirror.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::Response,
    Json,
};
use std::sync::Arc;
use tracing::info;

use dealflow_core::{CreateOpportunityInput, LocalId, ReplacePricingInput};

use super::errors::workflow_response;
use crate::error::{ServerError, ServerResult};
use crate::server::DealflowServer;

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ServerResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ServerError::ValidationError(rejection.body_text()))
}

/// `POST /api/v1/opportunities`
pub async fn create_opportunity_handler(
    State(server): State<Arc<DealflowServer>>,
    headers: HeaderMap,
    payload: Result<Json<CreateOpportunityInput>, JsonRejection>,
) -> ServerResult<Response> {
    let credential = server.credential(bearer_token(&headers))?;
    let input = body(payload)?;
    info!(account = %input.account, offerings = input.offerings.len(), "Creating opportunity");

    let orchestrator = server.orchestrator().clone();
    let result = tokio::spawn(async move {
        orchestrator
            .create_opportunity_with_pricing(&credential, input)
            .await
    })
    .await?;

    Ok(workflow_response(result, StatusCode::CREATED))
}

/// `PUT /api/v1/opportunities/:id/pricing`
pub async fn replace_pricing_handler(
    State(server): State<Arc<DealflowServer>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<ReplacePricingInput>, JsonRejection>,
) -> ServerResult<Response> {
    let credential = server.credential(bearer_token(&headers))?;
    let input = body(payload)?;
    let opportunity = LocalId::from(id);
    info!(%opportunity, offerings = input.offerings.len(), "Replacing opportunity pricing");

    let orchestrator = server.orchestrator().clone();
    let result = tokio::spawn(async move {
        orchestrator
            .replace_opportunity_pricing(&credential, &opportunity, input)
            .await
    })
    .await?;

    Ok(workflow_response(result, StatusCode::OK))
}

/// `POST /api/v1/opportunities/:id/quote`
pub async fn generate_quote_handler(
    State(server): State<Arc<DealflowServer>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ServerResult<Response> {
    let credential = server.credential(bearer_token(&headers))?;
    let opportunity = LocalId::from(id);
    info!(%opportunity, "Generating quote");

    let orchestrator = server.orchestrator().clone();
    let result = tokio::spawn(async move {
        orchestrator.generate_quote(&credential, &opportunity).await
    })
    .await?;

    Ok(workflow_response(result, StatusCode::OK))
}
