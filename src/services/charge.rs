//! Charge creation: opens a PIX charge for contact access and records it.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::domain::{ExternalReference, PaymentStatus, Transaction};
use crate::error::AppError;
use crate::ports::{PaymentProcessor, ProfileDirectory, TransactionRepository};
use crate::processor::ChargeRequest;
use crate::validation::{validate_positive_amount, validate_profile_id, ValidationError};

const CHARGE_DESCRIPTION: &str = "Contact access";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChargeCreated {
    pub payment_id: String,
    pub qr_code: String,
    pub qr_code_image: String,
    pub ticket_url: Option<String>,
    pub amount: BigDecimal,
    pub status: PaymentStatus,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct ChargeSettings {
    pub amount: BigDecimal,
    pub notification_url: String,
    pub expiration: Duration,
}

pub struct ChargeService {
    processor: Arc<dyn PaymentProcessor>,
    transactions: Arc<dyn TransactionRepository>,
    directory: Arc<dyn ProfileDirectory>,
    settings: ChargeSettings,
}

impl ChargeService {
    pub fn new(
        processor: Arc<dyn PaymentProcessor>,
        transactions: Arc<dyn TransactionRepository>,
        directory: Arc<dyn ProfileDirectory>,
        settings: ChargeSettings,
    ) -> Self {
        Self {
            processor,
            transactions,
            directory,
            settings,
        }
    }

    /// Opens a charge for `buyer_id` to unlock `seller_id`'s contact.
    ///
    /// The amount always comes from configuration. Each attempt carries its own
    /// idempotency key: the processor deduplicates a resent attempt, while an
    /// explicit retry opens a new charge. No transaction is written unless the
    /// processor accepted the charge.
    #[tracing::instrument(name = "create_charge", skip(self))]
    pub async fn create_charge(
        &self,
        buyer_id: &str,
        seller_id: &str,
    ) -> Result<ChargeCreated, AppError> {
        let buyer_id = validate_profile_id("buyerId", buyer_id)?;
        let seller_id = validate_profile_id("sellerId", seller_id)?;
        if buyer_id == seller_id {
            return Err(ValidationError::new("sellerId", "must differ from buyerId").into());
        }
        validate_positive_amount(&self.settings.amount)?;

        let payer = self
            .directory
            .payer_info(&buyer_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Buyer {} not found", buyer_id)))?;
        if payer.email.is_empty() {
            return Err(ValidationError::new("buyerId", "profile has no email for the payer").into());
        }
        if !self.directory.exists(&seller_id).await? {
            return Err(AppError::NotFound(format!("Seller {} not found", seller_id)));
        }

        let reference = ExternalReference::new(buyer_id.clone(), seller_id.clone());
        let request = ChargeRequest {
            amount: self.settings.amount.clone(),
            description: CHARGE_DESCRIPTION.to_string(),
            payer,
            external_reference: reference.encode(),
            notification_url: self.settings.notification_url.clone(),
            expires_at: Utc::now() + self.settings.expiration,
        };
        let idempotency_key = Uuid::new_v4().to_string();

        let charge = self
            .processor
            .create_charge(&request, &idempotency_key)
            .await?;

        let tx = Transaction::new(
            buyer_id,
            seller_id,
            charge.processor_payment_id.clone(),
            Some(request.external_reference.clone()),
            PaymentStatus::Pending,
            request.amount.clone(),
        );

        let outcome = match self.transactions.upsert(&tx).await {
            Ok(outcome) => outcome,
            Err(e) => {
                // The charge exists at the processor; webhook or status
                // reconciliation will rebuild the row from the reference.
                error!(
                    payment_id = %charge.processor_payment_id,
                    external_reference = %request.external_reference,
                    error = %e,
                    "charge accepted by processor but not recorded"
                );
                return Err(AppError::Internal(format!(
                    "failed to record charge {}: {}",
                    charge.processor_payment_id, e
                )));
            }
        };

        let stored = outcome.transaction();
        info!(
            payment_id = %stored.external_payment_id,
            status = %stored.status,
            outcome = outcome.label(),
            "charge created"
        );

        Ok(ChargeCreated {
            payment_id: stored.external_payment_id.clone(),
            qr_code: charge.qr_code,
            qr_code_image: charge.qr_code_image,
            ticket_url: charge.ticket_url,
            amount: stored.amount.clone(),
            status: stored.status,
            expires_at: charge.expires_at,
        })
    }
}
