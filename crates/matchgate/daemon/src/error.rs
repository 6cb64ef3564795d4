//! Error types for matchgate-daemon

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use matchgate_credential::CredentialError;
use matchgate_storage::StorageError;
use serde::Serialize;
use thiserror::Error;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Server startup error
    #[error("Server error: {0}")]
    Server(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Credential setup error
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Request-level errors raised by the session service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Any credential or lookup failure. Deliberately carries no detail.
    #[error("request rejected")]
    Rejected,

    /// Durable store failed; nothing was minted or applied.
    #[error("storage unavailable: {0}")]
    Storage(StorageError),

    /// Minting a credential failed after validation.
    #[error("credential issuance failed: {0}")]
    Issuance(CredentialError),
}

/// Lookup misses and refused inputs are rejections; anything else is a
/// store failure.
impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(_) | StorageError::InvalidInput(_) => ServiceError::Rejected,
            other => ServiceError::Storage(other),
        }
    }
}

impl ServiceError {
    fn status(&self, rejected: StatusCode) -> StatusCode {
        match self {
            ServiceError::Rejected => rejected,
            ServiceError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Issuance(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Body shared by every JSON failure.
#[derive(Debug, Serialize)]
pub struct FailureBody {
    pub success: bool,
}

/// Body of a failed text endpoint.
pub const FAILURE_MARKER: &str = "failure";

/// How a failed request is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Text,
    Json,
}

/// API-facing error: a service error plus the endpoint's response format.
#[derive(Debug)]
pub struct ApiError {
    pub source: ServiceError,
    pub format: ResponseFormat,
}

impl ApiError {
    pub fn text(source: ServiceError) -> Self {
        Self {
            source,
            format: ResponseFormat::Text,
        }
    }

    pub fn json(source: ServiceError) -> Self {
        Self {
            source,
            format: ResponseFormat::Json,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self.source {
            ServiceError::Rejected => {}
            ServiceError::Storage(err) => tracing::error!(error = %err, "storage failure"),
            ServiceError::Issuance(err) => tracing::error!(error = %err, "issuance failure"),
        }

        match self.format {
            ResponseFormat::Text => (
                self.source.status(StatusCode::UNAUTHORIZED),
                FAILURE_MARKER,
            )
                .into_response(),
            // Rejections are 200 so the status line says no more than the body.
            ResponseFormat::Json => (
                self.source.status(StatusCode::OK),
                Json(FailureBody { success: false }),
            )
                .into_response(),
        }
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type alias for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;
