//! Error types for the Dealflow Server

use thiserror::Error;

use dealflow_core::{RemoteError, StoreError};

/// Server error types
#[derive(Error, Debug)]
pub enum ServerError {
    /// Request body or parameters could not be used
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// No credential for the CRM
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The local store could not be opened
    #[error("Local store error: {0}")]
    LocalStoreError(String),

    /// The CRM client could not be built
    #[error("CRM client error: {0}")]
    CrmClientError(String),

    /// Internal server error
    #[error("Internal server error: {0}")]
    InternalError(String),
}

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        ServerError::LocalStoreError(err.to_string())
    }
}

impl From<RemoteError> for ServerError {
    fn from(err: RemoteError) -> Self {
        ServerError::CrmClientError(err.to_string())
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        ServerError::InternalError(format!("IO error: {}", err))
    }
}

impl From<tokio::task::JoinError> for ServerError {
    fn from(err: tokio::task::JoinError) -> Self {
        ServerError::InternalError(format!("Pipeline task failed: {}", err))
    }
}
