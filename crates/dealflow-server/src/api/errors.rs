//! HTTP mapping of errors and workflow outcomes

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use dealflow_core::{Outcome, StepError, WorkflowResult};

use crate::error::ServerError;

impl ServerError {
    /// Status code and machine-readable code of this error
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ServerError::ValidationError(_) => (StatusCode::BAD_REQUEST, "ERR_VALIDATION_ERROR"),
            ServerError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "ERR_UNAUTHORIZED"),
            ServerError::ConfigError(_)
            | ServerError::LocalStoreError(_)
            | ServerError::CrmClientError(_)
            | ServerError::InternalError(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "ERR_INTERNAL_ERROR")
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (
            status,
            Json(json!({
                "error": {
                    "code": code,
                    "message": self.to_string(),
                }
            })),
        )
            .into_response()
    }
}

/// Status code for a hard failure of the given class
pub fn status_for_error(error: &StepError) -> StatusCode {
    match error {
        StepError::NotFound { .. } => StatusCode::NOT_FOUND,
        StepError::NotSynced { .. }
        | StepError::ValidationFailed { .. }
        | StepError::RemoteRejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        StepError::RemoteUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        StepError::LocalPersistenceFailed { .. } | StepError::LocalStoreFailed { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Status code of a pipeline response
pub fn status_for_result(result: &WorkflowResult, success: StatusCode) -> StatusCode {
    match result.outcome {
        Outcome::Success => success,
        Outcome::PartialFailure => StatusCode::MULTI_STATUS,
        Outcome::HardFailure => result
            .error
            .as_ref()
            .map(status_for_error)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// Render a workflow result; the body is always the full result
pub fn workflow_response(result: WorkflowResult, success: StatusCode) -> Response {
    let status = status_for_result(&result, success);
    (status, Json(result)).into_response()
}
