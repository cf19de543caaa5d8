pub mod reference;
pub mod transaction;

pub use reference::{ExternalReference, InvalidReference};
pub use transaction::{PaymentStatus, Transaction};
