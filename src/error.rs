//! Error types and HTTP error response handling.
//!
//! Every handler returns `Result<_, AppError>`. Failures are converted at the
//! handler boundary into a JSON body with a coarse status code; nothing is
//! retried.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Application-wide error type.
///
/// # Status Code Mapping
///
/// - `InvalidRequest`, `InvalidSignature` → 400
/// - `Unauthenticated` → 401
/// - `PaymentRequired` → 402
/// - `NotFound` → 404
/// - `Conflict` → 409
/// - `Database`, `Upstream`, `Email`, `Internal` → 500 (details are logged, not returned)
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Session missing, forged, expired, or credentials rejected.
    #[error("{0}")]
    Unauthenticated(String),

    /// The user's plan or subscription status does not allow this action.
    #[error("{0}")]
    PaymentRequired(String),

    /// Requested resource does not exist or is not owned by the caller.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Request body or parameters are invalid.
    #[error("{0}")]
    InvalidRequest(String),

    /// Billing webhook failed signature verification.
    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),

    /// Write collided with a uniqueness constraint.
    #[error("{0}")]
    Conflict(String),

    /// Billing provider or completion API call failed.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Outbound email could not be sent.
    #[error("Email error: {0}")]
    Email(String),

    /// Anything else unexpected, including missing configuration.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn unauthenticated() -> Self {
        AppError::Unauthenticated("Authentication required".to_string())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest(_) | AppError::InvalidSignature(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::PaymentRequired(_) => StatusCode::PAYMENT_REQUIRED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Database(_)
            | AppError::Upstream(_)
            | AppError::Email(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) | AppError::Internal(_) => "internal_error",
            AppError::Unauthenticated(_) => "unauthenticated",
            AppError::PaymentRequired(_) => "payment_required",
            AppError::NotFound(_) => "not_found",
            AppError::InvalidRequest(_) => "invalid_request",
            AppError::InvalidSignature(_) => "invalid_signature",
            AppError::Conflict(_) => "conflict",
            AppError::Upstream(_) => "upstream_error",
            AppError::Email(_) => "email_error",
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::InvalidRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::InvalidRequest(rejection.body_text())
    }
}

/// Convert AppError into an HTTP response.
///
/// All errors return JSON in this format:
/// ```json
/// {
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let message = match &self {
            AppError::Database(_) | AppError::Internal(_) => {
                tracing::error!("Internal error: {}", self);
                "An internal error occurred".to_string()
            }
            AppError::Upstream(_) => {
                tracing::error!("{}", self);
                "An upstream service failed".to_string()
            }
            AppError::Email(_) => {
                tracing::error!("{}", self);
                "Failed to send email".to_string()
            }
            AppError::Unauthenticated(_) | AppError::PaymentRequired(_) => {
                tracing::info!("Access denied: {}", self);
                self.to_string()
            }
            _ => {
                tracing::debug!("Client error: {}", self);
                self.to_string()
            }
        };

        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
