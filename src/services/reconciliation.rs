//! Status reconciliation between the local store and the processor.
//!
//! Every write that follows a processor answer goes through
//! [`Reconciler::apply_charge_detail`], whether the answer was pulled by a status
//! check or fetched after a webhook.

use bigdecimal::BigDecimal;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::{ExternalReference, PaymentStatus, Transaction};
use crate::error::AppError;
use crate::ports::{PaymentProcessor, TransactionRepository, UpsertOutcome};
use crate::processor::ChargeDetail;
use crate::validation::validate_payment_id;

/// Where the reported status came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusSource {
    /// Local record already approved; the processor was not consulted.
    Store,
    Processor,
    /// Processor unreachable; the local, possibly stale, status is reported.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub status: PaymentStatus,
    pub approved: bool,
    pub message: String,
    #[serde(default)]
    pub fallback: bool,
}

impl StatusReport {
    pub fn new(status: PaymentStatus, fallback: bool) -> Self {
        Self {
            status,
            approved: status.is_approved(),
            message: status.message().to_string(),
            fallback,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub report: StatusReport,
    pub source: StatusSource,
    pub transaction: Transaction,
}

pub struct Reconciler {
    processor: Arc<dyn PaymentProcessor>,
    transactions: Arc<dyn TransactionRepository>,
    default_amount: BigDecimal,
}

impl Reconciler {
    /// `default_amount` is recorded for rebuilt transactions when the processor
    /// does not report the charged amount.
    pub fn new(
        processor: Arc<dyn PaymentProcessor>,
        transactions: Arc<dyn TransactionRepository>,
        default_amount: BigDecimal,
    ) -> Self {
        Self {
            processor,
            transactions,
            default_amount,
        }
    }

    /// Resolves the current status of `payment_id`.
    ///
    /// An approved local record is trusted as is. Otherwise the processor is
    /// asked and the store is brought in line with its answer. If the processor
    /// cannot be reached and a local record exists, that record's status is
    /// returned flagged as a fallback.
    #[tracing::instrument(name = "check_status", skip(self))]
    pub async fn check_status(&self, payment_id: &str) -> Result<Reconciliation, AppError> {
        let payment_id = validate_payment_id(payment_id)?;
        let local = self.transactions.find_by_external_id(&payment_id).await?;

        if let Some(tx) = local.as_ref().filter(|tx| tx.status.is_approved()) {
            debug!(payment_id = %payment_id, "approved in store, skipping processor");
            return Ok(Reconciliation {
                report: StatusReport::new(tx.status, false),
                source: StatusSource::Store,
                transaction: tx.clone(),
            });
        }

        match self.processor.get_charge(&payment_id).await {
            Ok(detail) => {
                let transaction = self.apply_charge_detail(detail, local).await?.into_transaction();
                Ok(Reconciliation {
                    report: StatusReport::new(transaction.status, false),
                    source: StatusSource::Processor,
                    transaction,
                })
            }
            Err(e) => match local {
                Some(tx) => {
                    warn!(
                        payment_id = %payment_id,
                        status = %tx.status,
                        error = %e,
                        "processor lookup failed, reporting stored status"
                    );
                    Ok(Reconciliation {
                        report: StatusReport::new(tx.status, true),
                        source: StatusSource::Fallback,
                        transaction: tx,
                    })
                }
                None => Err(e.into()),
            },
        }
    }

    /// Records a processor answer for a payment whose local row is not loaded yet.
    pub async fn record_charge_detail(&self, detail: ChargeDetail) -> Result<UpsertOutcome, AppError> {
        let local = self
            .transactions
            .find_by_external_id(&detail.processor_payment_id)
            .await?;
        self.apply_charge_detail(detail, local).await
    }

    /// Moves the stored transaction to the processor's status, rebuilding the
    /// row from the external reference when none exists. The store refuses
    /// backward moves, so the returned transaction is whatever is stored now.
    pub async fn apply_charge_detail(
        &self,
        detail: ChargeDetail,
        local: Option<Transaction>,
    ) -> Result<UpsertOutcome, AppError> {
        let approved_at = if detail.status.is_approved() {
            detail.approved_at.or_else(|| Some(Utc::now()))
        } else {
            None
        };

        let candidate = match local {
            Some(tx) if tx.status == detail.status => return Ok(UpsertOutcome::Unchanged(tx)),
            Some(tx) => Transaction::new(
                tx.buyer_id,
                tx.seller_id,
                tx.external_payment_id,
                tx.external_reference.or(detail.external_reference.clone()),
                detail.status,
                tx.amount,
            ),
            None => self.rebuild(&detail)?,
        };
        let candidate = candidate
            .with_status_detail(detail.status_detail.clone())
            .with_approved_at(approved_at);

        let outcome = self.transactions.upsert(&candidate).await?;
        match &outcome {
            UpsertOutcome::Updated { transaction, previous } => info!(
                payment_id = %transaction.external_payment_id,
                previous = %previous,
                status = %transaction.status,
                "transaction status updated"
            ),
            UpsertOutcome::Inserted(transaction) => info!(
                payment_id = %transaction.external_payment_id,
                buyer_id = %transaction.buyer_id,
                seller_id = %transaction.seller_id,
                status = %transaction.status,
                "transaction rebuilt from external reference"
            ),
            UpsertOutcome::Unchanged(transaction) if transaction.status != detail.status => debug!(
                payment_id = %transaction.external_payment_id,
                stored = %transaction.status,
                reported = %detail.status,
                "ignored status that would move transaction backward"
            ),
            UpsertOutcome::Unchanged(_) => {}
        }

        Ok(outcome)
    }

    fn rebuild(&self, detail: &ChargeDetail) -> Result<Transaction, AppError> {
        let raw = detail.external_reference.as_deref().ok_or_else(|| {
            AppError::NotFound(format!(
                "Payment {} is not tracked and carries no external reference",
                detail.processor_payment_id
            ))
        })?;
        let reference: ExternalReference = raw.parse().map_err(|_| {
            AppError::NotFound(format!(
                "Payment {} is not tracked and its external reference is not ours",
                detail.processor_payment_id
            ))
        })?;

        let mut tx = Transaction::new(
            reference.buyer_id,
            reference.seller_id,
            detail.processor_payment_id.clone(),
            Some(raw.to_string()),
            detail.status,
            detail
                .amount
                .clone()
                .unwrap_or_else(|| self.default_amount.clone()),
        );
        if let Some(created_at) = detail.created_at {
            tx.created_at = created_at;
        }
        Ok(tx)
    }
}
