pub mod contact;
pub mod payments;
pub mod webhook;

use crate::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub store: String,
    pub uptime_seconds: u64,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let store = match state.transactions.ping().await {
        Ok(()) => "connected",
        Err(e) => {
            tracing::warn!(error = %e, "transaction store unreachable");
            "disconnected"
        }
    };
    let healthy = store == "connected";

    let body = HealthStatus {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store: store.to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    };

    // 503 tells the load balancer to stop routing here
    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(body))
}
