//! Processor notification ingestion.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::AppError;
use crate::ports::PaymentProcessor;
use crate::processor::ProcessorError;
use crate::services::reconciliation::Reconciler;
use crate::validation::validate_payment_id;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-signature";
const SIGNATURE_PREFIX: &str = "sha256=";

#[derive(Debug, Deserialize)]
struct Notification {
    #[serde(rename = "type", alias = "topic")]
    kind: Option<String>,
    action: Option<String>,
    data: Option<NotificationData>,
}

#[derive(Debug, Deserialize)]
struct NotificationData {
    id: Option<serde_json::Value>,
}

impl Notification {
    fn is_payment_event(&self) -> bool {
        self.kind.as_deref() == Some("payment")
            || self
                .action
                .as_deref()
                .is_some_and(|action| action.starts_with("payment."))
    }

    fn payment_id(&self) -> Option<String> {
        match self.data.as_ref()?.id.as_ref()? {
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::String(s) => Some(s.trim().to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Accepted but deliberately not acted on.
    Ignored(&'static str),
    Recorded {
        payment_id: String,
        status: crate::domain::PaymentStatus,
        outcome: &'static str,
    },
}

impl WebhookOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            WebhookOutcome::Ignored(_) => "ignored",
            WebhookOutcome::Recorded { outcome, .. } => *outcome,
        }
    }
}

/// Hex HMAC-SHA256 of `body` under `secret`, as the processor sends it.
pub fn compute_signature(secret: &str, body: &[u8]) -> Result<String, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(e.to_string()))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub struct WebhookIngestor {
    secret: String,
    processor: Arc<dyn PaymentProcessor>,
    reconciler: Arc<Reconciler>,
}

impl WebhookIngestor {
    pub fn new(
        secret: String,
        processor: Arc<dyn PaymentProcessor>,
        reconciler: Arc<Reconciler>,
    ) -> Self {
        Self {
            secret,
            processor,
            reconciler,
        }
    }

    /// Checks `signature` against the HMAC of the raw body. The comparison is
    /// constant time.
    pub fn verify_signature(&self, body: &[u8], signature: Option<&str>) -> Result<(), AppError> {
        if self.secret.is_empty() {
            warn!(target: "security", "webhook rejected: no shared secret configured");
            return Err(AppError::Unauthorized("webhook secret not configured".to_string()));
        }

        let signature = signature.map(str::trim).filter(|s| !s.is_empty()).ok_or_else(|| {
            warn!(target: "security", "webhook rejected: missing signature");
            AppError::Unauthorized("missing signature".to_string())
        })?;
        let signature = signature.strip_prefix(SIGNATURE_PREFIX).unwrap_or(signature);

        let expected = hex::decode(signature).map_err(|_| {
            warn!(target: "security", "webhook rejected: malformed signature");
            AppError::Unauthorized("malformed signature".to_string())
        })?;

        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| AppError::Internal(e.to_string()))?;
        mac.update(body);
        mac.verify_slice(&expected).map_err(|_| {
            warn!(target: "security", body_len = body.len(), "webhook rejected: signature mismatch");
            AppError::Unauthorized("signature mismatch".to_string())
        })
    }

    /// Verifies, parses, and records one notification. Only signature failures
    /// and failures worth a redelivery come back as errors.
    pub async fn ingest(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, AppError> {
        self.verify_signature(body, signature)?;

        let notification: Notification = match serde_json::from_slice(body) {
            Ok(notification) => notification,
            Err(e) => {
                warn!(error = %e, "signed webhook body is not a notification");
                return Ok(WebhookOutcome::Ignored("malformed notification"));
            }
        };

        if !notification.is_payment_event() {
            info!(kind = ?notification.kind, action = ?notification.action, "ignoring non-payment notification");
            return Ok(WebhookOutcome::Ignored("not a payment event"));
        }

        let Some(payment_id) = notification
            .payment_id()
            .and_then(|id| validate_payment_id(&id).ok())
        else {
            warn!("payment notification without a usable payment id");
            return Ok(WebhookOutcome::Ignored("missing payment id"));
        };

        let detail = match self.processor.get_charge(&payment_id).await {
            Ok(detail) => detail,
            Err(ProcessorError::NotFound(_)) => {
                warn!(payment_id = %payment_id, "notification for a payment the processor does not know");
                return Ok(WebhookOutcome::Ignored("unknown payment"));
            }
            Err(e) => return Err(e.into()),
        };

        match self.reconciler.record_charge_detail(detail).await {
            Ok(outcome) => {
                let transaction = outcome.transaction();
                info!(
                    payment_id = %payment_id,
                    status = %transaction.status,
                    outcome = outcome.label(),
                    "payment notification processed"
                );
                Ok(WebhookOutcome::Recorded {
                    payment_id,
                    status: transaction.status,
                    outcome: outcome.label(),
                })
            }
            Err(AppError::NotFound(reason)) => {
                warn!(payment_id = %payment_id, reason = %reason, "payment notification not tracked");
                Ok(WebhookOutcome::Ignored("untracked payment"))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_is_hex_sha256() {
        let signature = compute_signature("test_secret_key", br#"{"type":"payment"}"#).unwrap();
        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_notification_payment_id_from_number_or_string() {
        let n: Notification =
            serde_json::from_str(r#"{"type":"payment","data":{"id":123456}}"#).unwrap();
        assert!(n.is_payment_event());
        assert_eq!(n.payment_id().as_deref(), Some("123456"));

        let n: Notification =
            serde_json::from_str(r#"{"action":"payment.updated","data":{"id":"987"}}"#).unwrap();
        assert!(n.is_payment_event());
        assert_eq!(n.payment_id().as_deref(), Some("987"));
    }

    #[test]
    fn test_notification_kinds() {
        let n: Notification = serde_json::from_str(r#"{"topic":"payment","data":{"id":1}}"#).unwrap();
        assert!(n.is_payment_event());

        let n: Notification =
            serde_json::from_str(r#"{"type":"merchant_order","data":{"id":1}}"#).unwrap();
        assert!(!n.is_payment_event());

        let n: Notification = serde_json::from_str(r#"{"type":"payment"}"#).unwrap();
        assert_eq!(n.payment_id(), None);
    }
}
