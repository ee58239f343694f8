//! HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::core::ServiceError;

/// Errors surfaced to HTTP clients as plain-text responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request body could not be parsed.
    #[error("Invalid request")]
    BadRequest,

    /// The result path had no playbook name.
    #[error("Playbook name required")]
    NameRequired,

    /// No playbook with that name in the catalog.
    #[error("Playbook not found")]
    PlaybookNotFound(String),

    /// A run is in flight and concurrent runs are rejected.
    #[error("Playbook is already running")]
    AlreadyRunning(String),

    /// Wrong HTTP method for the endpoint.
    #[error("Method not allowed")]
    MethodNotAllowed,

    /// The index page could not be read.
    #[error("Failed to load template")]
    Template,

    /// Unexpected failure inside the server.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest | Self::NameRequired => StatusCode::BAD_REQUEST,
            Self::PlaybookNotFound(_) => StatusCode::NOT_FOUND,
            Self::AlreadyRunning(_) => StatusCode::CONFLICT,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Template | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(name) => Self::PlaybookNotFound(name),
            ServiceError::AlreadyRunning(name) => Self::AlreadyRunning(name),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = ?self, "Request rejected");
        }
        (status, format!("{}\n", self)).into_response()
    }
}
