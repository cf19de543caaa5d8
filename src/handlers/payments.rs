use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::Deserialize;

use crate::error::AppError;
use crate::services::{ChargeCreated, StatusReport};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChargeRequest {
    #[serde(alias = "clienteId", alias = "buyer_id")]
    pub buyer_id: String,
    #[serde(alias = "prestadorId", alias = "seller_id")]
    pub seller_id: String,
}

/// Processor ids are numeric; browsers send them either way.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PaymentIdInput {
    Text(String),
    Number(u64),
}

impl PaymentIdInput {
    pub fn into_string(self) -> String {
        match self {
            PaymentIdInput::Text(id) => id,
            PaymentIdInput::Number(id) => id.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    #[serde(alias = "payment_id")]
    pub payment_id: PaymentIdInput,
}

pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::Validation(rejection.body_text()))
}

pub async fn create_charge(
    State(state): State<AppState>,
    payload: Result<Json<CreateChargeRequest>, JsonRejection>,
) -> Result<Json<ChargeCreated>, AppError> {
    let request = json_body(payload)?;
    let created = state
        .charges
        .create_charge(&request.buyer_id, &request.seller_id)
        .await?;
    Ok(Json(created))
}

pub async fn payment_status(
    State(state): State<AppState>,
    payload: Result<Json<StatusRequest>, JsonRejection>,
) -> Result<Json<StatusReport>, AppError> {
    let request = json_body(payload)?;
    let reconciliation = state
        .reconciler
        .check_status(&request.payment_id.into_string())
        .await?;
    Ok(Json(reconciliation.report))
}
