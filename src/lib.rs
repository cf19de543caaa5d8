pub mod adapters;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod poller;
pub mod ports;
pub mod processor;
pub mod services;
pub mod validation;

use axum::{
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use bigdecimal::BigDecimal;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::adapters::{PostgresProfileDirectory, PostgresTransactionRepository};
use crate::config::{Config, CorsOrigins};
use crate::ports::{PaymentProcessor, ProfileDirectory, TransactionRepository};
use crate::processor::ProcessorClient;
use crate::services::{ChargeService, ChargeSettings, ContactGate, Reconciler, WebhookIngestor};

/// Values the services read from configuration.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub contact_fee: BigDecimal,
    pub notification_url: String,
    pub charge_expiration: chrono::Duration,
    pub webhook_secret: String,
}

impl ServiceSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            contact_fee: config.contact_fee.clone(),
            notification_url: config.notification_url.clone(),
            charge_expiration: chrono::Duration::minutes(config.charge_expiration_minutes),
            webhook_secret: config.webhook_secret.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub charges: Arc<ChargeService>,
    pub reconciler: Arc<Reconciler>,
    pub webhooks: Arc<WebhookIngestor>,
    pub contacts: Arc<ContactGate>,
    pub transactions: Arc<dyn TransactionRepository>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        processor: Arc<dyn PaymentProcessor>,
        transactions: Arc<dyn TransactionRepository>,
        directory: Arc<dyn ProfileDirectory>,
        settings: ServiceSettings,
    ) -> Self {
        let reconciler = Arc::new(Reconciler::new(
            processor.clone(),
            transactions.clone(),
            settings.contact_fee.clone(),
        ));
        let charges = Arc::new(ChargeService::new(
            processor.clone(),
            transactions.clone(),
            directory.clone(),
            ChargeSettings {
                amount: settings.contact_fee,
                notification_url: settings.notification_url,
                expiration: settings.charge_expiration,
            },
        ));
        let webhooks = Arc::new(WebhookIngestor::new(
            settings.webhook_secret,
            processor,
            reconciler.clone(),
        ));
        let contacts = Arc::new(ContactGate::new(reconciler.clone(), directory));

        Self {
            charges,
            reconciler,
            webhooks,
            contacts,
            transactions,
            started_at: Instant::now(),
        }
    }
}

/// Wires the Postgres adapters and the processor client from configuration.
pub fn build_state(config: &Config, pool: PgPool) -> AppState {
    let processor = ProcessorClient::new(
        config.processor_base_url.clone(),
        config.processor_access_token.clone(),
        config.processor_timeout,
    );
    tracing::info!(base_url = %processor.base_url(), "processor client initialized");

    AppState::new(
        Arc::new(processor),
        Arc::new(PostgresTransactionRepository::new(pool.clone())),
        Arc::new(PostgresProfileDirectory::new(pool)),
        ServiceSettings::from_config(config),
    )
}

pub fn cors_layer(origins: &CorsOrigins) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(Duration::from_secs(86_400));

    match origins {
        CorsOrigins::Any => layer.allow_origin(Any),
        CorsOrigins::List(list) => layer.allow_origin(AllowOrigin::list(
            list.iter()
                .filter_map(|origin| HeaderValue::from_str(origin).ok()),
        )),
    }
}

pub fn create_app(state: AppState, cors: &CorsOrigins) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/payments/pix", post(handlers::payments::create_charge))
        .route("/payments/status", post(handlers::payments::payment_status))
        .route("/webhooks/payment", post(handlers::webhook::payment_webhook))
        .route("/contact-access", post(handlers::contact::contact_access))
        .layer(axum::middleware::from_fn(
            middleware::request_logger_middleware,
        ))
        .layer(cors_layer(cors))
        .with_state(state)
}
