//! Application error type mapping to HTTP status codes and envelope format.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use agentry_types::error::DispatchError;

use crate::http::response::status_for_code;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Dispatch, status and listing errors from the orchestrator.
    Dispatch(DispatchError),
    /// Malformed headers or query parameters.
    Validation(String),
    /// Generic internal error.
    Internal(String),
}

impl From<DispatchError> for AppError {
    fn from(e: DispatchError) -> Self {
        AppError::Dispatch(e)
    }
}

impl AppError {
    /// Machine-readable code and message for the envelope.
    pub fn code_and_message(&self) -> (&'static str, String) {
        match self {
            AppError::Dispatch(e @ DispatchError::InvalidRequest(_)) => ("INVALID_REQUEST", e.to_string()),
            AppError::Dispatch(e @ DispatchError::NotFound { .. }) => ("NOT_FOUND", e.to_string()),
            AppError::Dispatch(e @ DispatchError::Conflict { .. }) => ("CONFLICT", e.to_string()),
            AppError::Dispatch(e @ DispatchError::Storage(_)) => ("STORAGE_ERROR", e.to_string()),
            AppError::Dispatch(e @ DispatchError::ShuttingDown) => ("SHUTTING_DOWN", e.to_string()),
            AppError::Validation(msg) => ("VALIDATION_ERROR", msg.clone()),
            AppError::Internal(msg) => ("INTERNAL_ERROR", msg.clone()),
        }
    }

    pub fn status(&self) -> StatusCode {
        status_for_code(self.code_and_message().0)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (code, message) = self.code_and_message();
        let status = status_for_code(code);
        if status.is_server_error() {
            tracing::error!(code, %message, "request failed");
        } else {
            tracing::debug!(code, %message, "request rejected");
        }

        let body = json!({
            "data": null,
            "meta": {
                "request_id": "",
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "response_time_ms": 0
            },
            "errors": [{
                "code": code,
                "message": message,
            }]
        });

        (
            status,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response()
    }
}
