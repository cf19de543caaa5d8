use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::error::AppError;
use crate::services::webhook::SIGNATURE_HEADER;
use crate::AppState;

/// Processor push endpoint. Answers 200 for anything processed or deliberately
/// ignored, 401 for bad signatures and 500 when a redelivery is wanted.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok());

    match state.webhooks.ingest(&body, signature).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(json!({
                "received": true,
                "outcome": outcome.label(),
            })),
        )
            .into_response(),
        Err(e @ AppError::Unauthorized(_)) => e.into_response(),
        Err(e) => {
            tracing::error!(error = %e, "webhook processing failed, asking for redelivery");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "internal_error",
                    "message": "Notification not processed.",
                })),
            )
                .into_response()
        }
    }
}
