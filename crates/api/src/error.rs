//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use saga::SagaError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// The workflow closed with a failure.
    WorkflowFailed(String),
    /// Saga or runtime error.
    Saga(SagaError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::WorkflowFailed(reason) => (StatusCode::UNPROCESSABLE_ENTITY, reason),
            ApiError::Saga(err) => saga_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn saga_error_to_response(err: SagaError) -> (StatusCode, String) {
    match &err {
        SagaError::WorkflowNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        SagaError::InvalidAddress(_) | SagaError::UnknownQuery(_) => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        SagaError::AddressLocked | SagaError::AlreadyStarted(_) | SagaError::InvalidState { .. } => {
            (StatusCode::CONFLICT, err.to_string())
        }
        _ => {
            tracing::error!(error = %err, "internal server error");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}
