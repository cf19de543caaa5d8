use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::ports::RepositoryError;
use crate::processor::ProcessorError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Payment processor unavailable: {0}")]
    ProcessorUnavailable(String),

    #[error("Payment processor rejected the request: {0}")]
    ProcessorRejected(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Payment required: {0}")]
    PaymentRequired(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::ProcessorUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::ProcessorRejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::PaymentRequired(_) => StatusCode::PAYMENT_REQUIRED,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::ProcessorUnavailable(_) => "processor_unavailable",
            AppError::ProcessorRejected(_) => "processor_rejected",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::NotFound(_) => "not_found",
            AppError::PaymentRequired(_) => "payment_required",
            AppError::Database(_) | AppError::Internal(_) => "internal_error",
        }
    }

    /// Text safe to show to the caller. Persistence and internal failures never
    /// leak their underlying error.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Validation(msg)
            | AppError::ProcessorRejected(msg)
            | AppError::NotFound(msg)
            | AppError::PaymentRequired(msg) => msg.clone(),
            AppError::ProcessorUnavailable(_) => {
                "Payment provider is temporarily unavailable, please retry.".to_string()
            }
            AppError::Unauthorized(_) => "Invalid or missing signature.".to_string(),
            AppError::Database(_) | AppError::Internal(_) => {
                "An internal error occurred.".to_string()
            }
        }
    }
}

impl From<ProcessorError> for AppError {
    fn from(err: ProcessorError) -> Self {
        match err {
            ProcessorError::Rejected { message, .. } => AppError::ProcessorRejected(message),
            ProcessorError::NotFound(id) => AppError::NotFound(format!("Payment {} not found", id)),
            other => AppError::ProcessorUnavailable(other.to_string()),
        }
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(what) => AppError::NotFound(what),
            RepositoryError::Database(e) => AppError::Database(e),
            RepositoryError::Unavailable(e) => AppError::Internal(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = Json(json!({
            "error": self.kind(),
            "message": self.public_message(),
        }));

        (status, body).into_response()
    }
}
