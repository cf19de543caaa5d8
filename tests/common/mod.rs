#![allow(dead_code)]

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::Utc;
use pix_contact_gate::adapters::{InMemoryProfileDirectory, InMemoryTransactionRepository, Profile};
use pix_contact_gate::domain::PaymentStatus;
use pix_contact_gate::ports::PaymentProcessor;
use pix_contact_gate::processor::{ChargeDetail, ChargeRequest, ProcessorCharge, ProcessorError};
use pix_contact_gate::{AppState, ServiceSettings};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const WEBHOOK_SECRET: &str = "test_webhook_secret";
pub const BUYER: &str = "buyer-1";
pub const SELLER: &str = "seller-1";
pub const SELLER_WHATSAPP: &str = "+55 11 98765-4321";

/// Processor double keeping charges in memory.
#[derive(Default)]
pub struct FakeProcessor {
    charges: Mutex<HashMap<String, ChargeDetail>>,
    requests: Mutex<Vec<(ChargeRequest, String)>>,
    next_id: AtomicU64,
    unavailable: AtomicBool,
    get_calls: AtomicUsize,
}

impl FakeProcessor {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1_000),
            ..Self::default()
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_status(&self, payment_id: &str, status: PaymentStatus) {
        let mut charges = self.charges.lock().unwrap();
        let charge = charges.get_mut(payment_id).expect("unknown charge");
        charge.status = status;
        charge.approved_at = status.is_approved().then(Utc::now);
    }

    /// Registers a charge opened outside this process.
    pub fn insert(&self, detail: ChargeDetail) {
        self.charges
            .lock()
            .unwrap()
            .insert(detail.processor_payment_id.clone(), detail);
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<(ChargeRequest, String)> {
        self.requests.lock().unwrap().clone()
    }

    fn check_available(&self) -> Result<(), ProcessorError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(ProcessorError::Unavailable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PaymentProcessor for FakeProcessor {
    async fn create_charge(
        &self,
        request: &ChargeRequest,
        idempotency_key: &str,
    ) -> Result<ProcessorCharge, ProcessorError> {
        self.check_available()?;
        self.requests
            .lock()
            .unwrap()
            .push((request.clone(), idempotency_key.to_string()));

        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        self.insert(ChargeDetail {
            processor_payment_id: id.clone(),
            status: PaymentStatus::Pending,
            status_detail: Some("pending_waiting_transfer".to_string()),
            amount: Some(request.amount.clone()),
            external_reference: Some(request.external_reference.clone()),
            created_at: Some(Utc::now()),
            approved_at: None,
        });

        Ok(ProcessorCharge {
            processor_payment_id: id,
            status: PaymentStatus::Pending,
            qr_code: "00020126580014br.gov.bcb.pix".to_string(),
            qr_code_image: "iVBORw0KGgo=".to_string(),
            ticket_url: Some("https://pay.example.com/ticket".to_string()),
            expires_at: Some(request.expires_at),
        })
    }

    async fn get_charge(&self, processor_payment_id: &str) -> Result<ChargeDetail, ProcessorError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        self.charges
            .lock()
            .unwrap()
            .get(processor_payment_id)
            .cloned()
            .ok_or_else(|| ProcessorError::NotFound(processor_payment_id.to_string()))
    }
}

pub struct TestEnv {
    pub processor: Arc<FakeProcessor>,
    pub transactions: Arc<InMemoryTransactionRepository>,
    pub directory: Arc<InMemoryProfileDirectory>,
    pub state: AppState,
}

pub fn contact_fee() -> BigDecimal {
    "2.00".parse().unwrap()
}

impl TestEnv {
    pub async fn new() -> Self {
        let processor = Arc::new(FakeProcessor::new());
        let transactions = Arc::new(InMemoryTransactionRepository::new());
        let directory = Arc::new(InMemoryProfileDirectory::new());

        directory
            .insert(
                BUYER,
                Profile {
                    name: Some("Ana Souza".to_string()),
                    email: Some("ana@example.com".to_string()),
                    whatsapp: None,
                },
            )
            .await;
        directory
            .insert(
                SELLER,
                Profile {
                    name: Some("Bruno Lima".to_string()),
                    email: Some("bruno@example.com".to_string()),
                    whatsapp: Some(SELLER_WHATSAPP.to_string()),
                },
            )
            .await;

        let state = AppState::new(
            processor.clone(),
            transactions.clone(),
            directory.clone(),
            ServiceSettings {
                contact_fee: contact_fee(),
                notification_url: "https://api.example.com/webhooks/payment".to_string(),
                charge_expiration: chrono::Duration::minutes(30),
                webhook_secret: WEBHOOK_SECRET.to_string(),
            },
        );

        Self {
            processor,
            transactions,
            directory,
            state,
        }
    }
}

pub fn payment_notification(payment_id: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "action": "payment.updated",
        "type": "payment",
        "data": { "id": payment_id },
    }))
    .unwrap()
}
