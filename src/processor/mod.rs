//! Payment processor integration: wire models and the HTTP client.

pub mod client;

pub use client::ProcessorClient;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::PaymentStatus;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessorError {
    #[error("processor unavailable: {0}")]
    Unavailable(String),
    #[error("processor rejected the request (status {status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("charge not found: {0}")]
    NotFound(String),
    #[error("invalid response from processor: {0}")]
    InvalidResponse(String),
    #[error("processor circuit breaker is open")]
    CircuitOpen,
}

impl ProcessorError {
    /// Failures that say nothing about the request itself and may clear up on retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProcessorError::Unavailable(_)
                | ProcessorError::InvalidResponse(_)
                | ProcessorError::CircuitOpen
        )
    }
}

impl From<reqwest::Error> for ProcessorError {
    fn from(err: reqwest::Error) -> Self {
        ProcessorError::Unavailable(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayerInfo {
    pub email: String,
    pub first_name: Option<String>,
}

/// Everything the processor needs to open a PIX charge.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub amount: BigDecimal,
    pub description: String,
    pub payer: PayerInfo,
    pub external_reference: String,
    pub notification_url: String,
    pub expires_at: DateTime<Utc>,
}

/// Result of a successful charge creation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorCharge {
    pub processor_payment_id: String,
    pub status: PaymentStatus,
    pub qr_code: String,
    pub qr_code_image: String,
    pub ticket_url: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Authoritative view of a charge as reported by the processor.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargeDetail {
    pub processor_payment_id: String,
    pub status: PaymentStatus,
    pub status_detail: Option<String>,
    pub amount: Option<BigDecimal>,
    pub external_reference: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
}
