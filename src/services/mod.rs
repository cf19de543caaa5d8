pub mod charge;
pub mod contact;
pub mod reconciliation;
pub mod webhook;

pub use charge::{ChargeCreated, ChargeService, ChargeSettings};
pub use contact::{ContactGate, ContactReveal};
pub use reconciliation::{Reconciler, Reconciliation, StatusReport, StatusSource};
pub use webhook::{WebhookIngestor, WebhookOutcome};
