//! API routes of the Dealflow Server

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod errors;
pub mod health;
pub mod opportunities;

use crate::server::DealflowServer;

/// Build the router for API endpoints
pub fn build_router(server: Arc<DealflowServer>) -> Router {
    Router::new()
        .route(
            "/api/v1/opportunities",
            post(opportunities::create_opportunity_handler),
        )
        .route(
            "/api/v1/opportunities/:id/pricing",
            put(opportunities::replace_pricing_handler),
        )
        .route(
            "/api/v1/opportunities/:id/quote",
            post(opportunities::generate_quote_handler),
        )
        .route("/health", get(health::health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(server)
}

pub use errors::{status_for_error, status_for_result, workflow_response};
