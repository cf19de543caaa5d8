//! Seams between the reconciliation core and its collaborators.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{PaymentStatus, Transaction};
use crate::processor::{ChargeDetail, ChargeRequest, PayerInfo, ProcessorCharge, ProcessorError};

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// What an upsert did to the stored row.
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    Inserted(Transaction),
    Updated {
        transaction: Transaction,
        previous: PaymentStatus,
    },
    /// The row exists and the incoming status was equal, older, or the row is terminal.
    Unchanged(Transaction),
}

impl UpsertOutcome {
    pub fn transaction(&self) -> &Transaction {
        match self {
            UpsertOutcome::Inserted(tx) | UpsertOutcome::Unchanged(tx) => tx,
            UpsertOutcome::Updated { transaction, .. } => transaction,
        }
    }

    pub fn into_transaction(self) -> Transaction {
        match self {
            UpsertOutcome::Inserted(tx) | UpsertOutcome::Unchanged(tx) => tx,
            UpsertOutcome::Updated { transaction, .. } => transaction,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            UpsertOutcome::Inserted(_) => "inserted",
            UpsertOutcome::Updated { .. } => "updated",
            UpsertOutcome::Unchanged(_) => "unchanged",
        }
    }
}

/// Durable store of transactions, keyed for reconciliation by `external_payment_id`.
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn find_by_external_id(
        &self,
        external_payment_id: &str,
    ) -> RepositoryResult<Option<Transaction>>;

    /// Inserts `tx` when no row carries its `external_payment_id`. Otherwise the
    /// stored status (with detail and approval time) is replaced only when
    /// `stored.can_transition_to(tx.status)` holds, checked atomically in the store.
    async fn upsert(&self, tx: &Transaction) -> RepositoryResult<UpsertOutcome>;

    async fn ping(&self) -> RepositoryResult<()>;
}

/// Read side of the profile directory owned by the marketplace.
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    /// Payer data for a buyer profile, `None` when the profile does not exist.
    async fn payer_info(&self, profile_id: &str) -> RepositoryResult<Option<PayerInfo>>;

    async fn exists(&self, profile_id: &str) -> RepositoryResult<bool>;

    /// The gated contact channel (WhatsApp number) of a seller profile.
    async fn contact_channel(&self, profile_id: &str) -> RepositoryResult<Option<String>>;
}

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn create_charge(
        &self,
        request: &ChargeRequest,
        idempotency_key: &str,
    ) -> Result<ProcessorCharge, ProcessorError>;

    async fn get_charge(&self, processor_payment_id: &str) -> Result<ChargeDetail, ProcessorError>;
}
