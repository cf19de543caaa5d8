//! Transaction domain entity.
//! Framework-agnostic record of one contact-access charge and its lifecycle.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle status of a charge, as stored locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    InProcess,
    Approved,
    Rejected,
    Cancelled,
    Refunded,
    ChargedBack,
    Error,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 8] = [
        PaymentStatus::Pending,
        PaymentStatus::InProcess,
        PaymentStatus::Approved,
        PaymentStatus::Rejected,
        PaymentStatus::Cancelled,
        PaymentStatus::Refunded,
        PaymentStatus::ChargedBack,
        PaymentStatus::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::InProcess => "in_process",
            PaymentStatus::Approved => "approved",
            PaymentStatus::Rejected => "rejected",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::ChargedBack => "charged_back",
            PaymentStatus::Error => "error",
        }
    }

    /// Maps a status string reported by the processor. Aliases the processor uses
    /// for intermediate states fold into the local set; anything unknown is `Error`.
    pub fn from_processor(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" | "authorized" => PaymentStatus::Pending,
            "in_process" | "in_mediation" => PaymentStatus::InProcess,
            "approved" => PaymentStatus::Approved,
            "rejected" => PaymentStatus::Rejected,
            "cancelled" | "canceled" => PaymentStatus::Cancelled,
            "refunded" => PaymentStatus::Refunded,
            "charged_back" => PaymentStatus::ChargedBack,
            _ => PaymentStatus::Error,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Approved
                | PaymentStatus::Rejected
                | PaymentStatus::Cancelled
                | PaymentStatus::Refunded
                | PaymentStatus::ChargedBack
        )
    }

    pub fn is_approved(&self) -> bool {
        *self == PaymentStatus::Approved
    }

    /// Progress toward a terminal state. Writers may only move a record forward.
    pub fn rank(&self) -> u8 {
        match self {
            PaymentStatus::Pending | PaymentStatus::Error => 0,
            PaymentStatus::InProcess => 1,
            _ => 2,
        }
    }

    /// Whether a record currently in `self` may be overwritten with `next`.
    /// Terminal records are frozen; equal statuses are a no-op, not a change.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        !self.is_terminal() && *self != next && next.rank() >= self.rank()
    }

    /// User-facing explanation for the status.
    pub fn message(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "Payment not yet confirmed, retry shortly.",
            PaymentStatus::InProcess => "Payment is being processed, retry shortly.",
            PaymentStatus::Approved => "Payment approved. Contact unlocked.",
            PaymentStatus::Rejected => "Payment rejected.",
            PaymentStatus::Cancelled => "Payment cancelled.",
            PaymentStatus::Refunded => "Payment refunded.",
            PaymentStatus::ChargedBack => "Payment charged back.",
            PaymentStatus::Error => "Payment could not be verified, retry shortly.",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown payment status: {}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for PaymentStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// Domain entity representing one payment attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    pub id: Uuid,
    pub buyer_id: String,
    pub seller_id: String,
    pub external_payment_id: String,
    pub external_reference: Option<String>,
    pub status: PaymentStatus,
    pub status_detail: Option<String>,
    pub amount: BigDecimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
}

impl Transaction {
    pub fn new(
        buyer_id: String,
        seller_id: String,
        external_payment_id: String,
        external_reference: Option<String>,
        status: PaymentStatus,
        amount: BigDecimal,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            buyer_id,
            seller_id,
            external_payment_id,
            external_reference,
            status,
            status_detail: None,
            amount,
            created_at: now,
            updated_at: now,
            approved_at: None,
        }
    }

    pub fn with_status_detail(mut self, detail: Option<String>) -> Self {
        self.status_detail = detail;
        self
    }

    pub fn with_approved_at(mut self, approved_at: Option<DateTime<Utc>>) -> Self {
        self.approved_at = approved_at;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        let terminal: Vec<_> = PaymentStatus::ALL
            .iter()
            .filter(|s| s.is_terminal())
            .map(|s| s.as_str())
            .collect();
        assert_eq!(
            terminal,
            vec!["approved", "rejected", "cancelled", "refunded", "charged_back"]
        );
    }

    #[test]
    fn test_approved_is_frozen() {
        for next in PaymentStatus::ALL {
            assert!(!PaymentStatus::Approved.can_transition_to(next));
        }
    }

    #[test]
    fn test_forward_transitions() {
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::InProcess));
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Approved));
        assert!(PaymentStatus::InProcess.can_transition_to(PaymentStatus::Rejected));
        assert!(PaymentStatus::Error.can_transition_to(PaymentStatus::Pending));
        assert!(!PaymentStatus::InProcess.can_transition_to(PaymentStatus::Pending));
        assert!(!PaymentStatus::Pending.can_transition_to(PaymentStatus::Pending));
    }

    #[test]
    fn test_processor_status_mapping() {
        assert_eq!(PaymentStatus::from_processor("approved"), PaymentStatus::Approved);
        assert_eq!(PaymentStatus::from_processor("authorized"), PaymentStatus::Pending);
        assert_eq!(PaymentStatus::from_processor("in_mediation"), PaymentStatus::InProcess);
        assert_eq!(PaymentStatus::from_processor("CANCELLED"), PaymentStatus::Cancelled);
        assert_eq!(PaymentStatus::from_processor("weird"), PaymentStatus::Error);
    }

    #[test]
    fn test_status_string_roundtrip_is_strict() {
        assert_eq!("charged_back".parse::<PaymentStatus>(), Ok(PaymentStatus::ChargedBack));
        assert!("authorized".parse::<PaymentStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&PaymentStatus::InProcess).unwrap();
        assert_eq!(json, "\"in_process\"");
    }
}
