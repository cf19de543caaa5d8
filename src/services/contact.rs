//! Contact reveal, gated on an approved payment for the same seller.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::error::AppError;
use crate::ports::ProfileDirectory;
use crate::services::reconciliation::Reconciler;
use crate::validation::validate_profile_id;

const WHATSAPP_LINK_BASE: &str = "https://wa.me/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactReveal {
    pub seller_id: String,
    pub whatsapp: String,
    pub whatsapp_url: String,
}

pub fn whatsapp_link(number: &str) -> Option<String> {
    let digits: String = number.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        None
    } else {
        Some(format!("{WHATSAPP_LINK_BASE}{digits}"))
    }
}

pub struct ContactGate {
    reconciler: Arc<Reconciler>,
    directory: Arc<dyn ProfileDirectory>,
}

impl ContactGate {
    pub fn new(reconciler: Arc<Reconciler>, directory: Arc<dyn ProfileDirectory>) -> Self {
        Self {
            reconciler,
            directory,
        }
    }

    pub async fn reveal(&self, payment_id: &str, seller_id: &str) -> Result<ContactReveal, AppError> {
        let seller_id = validate_profile_id("sellerId", seller_id)?;
        let reconciliation = self.reconciler.check_status(payment_id).await?;

        if !reconciliation.report.approved {
            return Err(AppError::PaymentRequired(reconciliation.report.message));
        }
        if reconciliation.transaction.seller_id != seller_id {
            return Err(AppError::NotFound(format!(
                "No approved payment for seller {}",
                seller_id
            )));
        }

        let whatsapp = self
            .directory
            .contact_channel(&seller_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Seller {} has no contact", seller_id)))?;
        let whatsapp_url = whatsapp_link(&whatsapp)
            .ok_or_else(|| AppError::NotFound(format!("Seller {} has no contact", seller_id)))?;

        info!(
            payment_id = %reconciliation.transaction.external_payment_id,
            seller_id = %seller_id,
            "contact revealed"
        );

        Ok(ContactReveal {
            seller_id,
            whatsapp,
            whatsapp_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whatsapp_link_keeps_digits() {
        assert_eq!(
            whatsapp_link("+55 (11) 98765-4321").as_deref(),
            Some("https://wa.me/5511987654321")
        );
        assert_eq!(whatsapp_link("n/a"), None);
    }
}
