//! HTTP middleware for the web server

use axum::{
    extract::rejection::JsonRejection,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use std::time::Instant;
use uuid::Uuid;

use crate::application::errors::{AdvisoryError, ApplicationError, VulnerabilityError};
use crate::domain::DomainError;
use crate::presentation::models::ErrorResponse;

fn error_response(status: StatusCode, code: &str, message: &str, detail: String) -> Response {
    let body = ErrorResponse {
        code: code.to_string(),
        message: message.to_string(),
        detail: Some(detail),
        request_id: Uuid::new_v4(),
        timestamp: Utc::now(),
    };

    (status, Json(body)).into_response()
}

/// Error handling middleware
impl IntoResponse for ApplicationError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApplicationError::Domain(
                DomainError::InvalidInput { .. }
                | DomainError::InvalidVulnerabilityId { .. }
                | DomainError::InvalidFixStatus { .. },
            )
            | ApplicationError::InvalidInput { .. } => {
                (StatusCode::BAD_REQUEST, "INVALID_INPUT", "Invalid request")
            }
            ApplicationError::NotFound { .. } => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", "Resource not found")
            }
            ApplicationError::Vulnerability(VulnerabilityError::UpstreamRateLimited { .. }) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "UPSTREAM_RATE_LIMITED",
                "Vulnerability registry rate limit exceeded",
            ),
            ApplicationError::Vulnerability(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "UPSTREAM_UNAVAILABLE",
                "Vulnerability registry is unavailable",
            ),
            ApplicationError::Advisory(AdvisoryError::Store(_)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "STORE_ERROR",
                "Advisory store error",
            ),
            ApplicationError::Configuration { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIGURATION_ERROR",
                "Service configuration error",
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred",
            ),
        };

        if status.is_server_error() {
            tracing::error!(code = code, error = %self, "Request failed");
        } else {
            tracing::debug!(code = code, error = %self, "Request rejected");
        }

        error_response(status, code, message, self.to_string())
    }
}

/// Malformed or ill-typed JSON bodies are client errors
pub fn json_rejection(rejection: JsonRejection) -> Response {
    tracing::debug!(error = %rejection.body_text(), "Rejected request body");
    error_response(
        StatusCode::BAD_REQUEST,
        "INVALID_INPUT",
        "Invalid request body",
        rejection.body_text(),
    )
}

/// Request logging middleware with timing and request ID
pub async fn logging_middleware(request: Request<axum::body::Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = Uuid::new_v4();
    let start_time = Instant::now();

    tracing::info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        "Processing request"
    );

    let response = next.run(request).await;

    tracing::info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = %response.status(),
        duration_ms = start_time.elapsed().as_millis() as u64,
        "Request completed"
    );

    response
}
