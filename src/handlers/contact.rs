use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::Deserialize;

use super::payments::{json_body, PaymentIdInput};
use crate::error::AppError;
use crate::services::ContactReveal;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactAccessRequest {
    #[serde(alias = "payment_id")]
    pub payment_id: PaymentIdInput,
    #[serde(alias = "prestadorId", alias = "seller_id")]
    pub seller_id: String,
}

pub async fn contact_access(
    State(state): State<AppState>,
    payload: Result<Json<ContactAccessRequest>, JsonRejection>,
) -> Result<Json<ContactReveal>, AppError> {
    let request = json_body(payload)?;
    let reveal = state
        .contacts
        .reveal(&request.payment_id.into_string(), &request.seller_id)
        .await?;
    Ok(Json(reveal))
}
