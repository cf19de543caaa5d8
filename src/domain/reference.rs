//! External reference carried through the processor.
//!
//! The reference is attached to every charge and echoed back on queries and
//! notifications, so a lost local record can be rebuilt from it.

use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::validation::validate_profile_id;

const PREFIX: &str = "contact";
const SEPARATOR: char = ':';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalReference {
    pub buyer_id: String,
    pub seller_id: String,
    pub nonce: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidReference(pub String);

impl fmt::Display for InvalidReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid external reference: {}", self.0)
    }
}

impl std::error::Error for InvalidReference {}

impl ExternalReference {
    /// Builds a reference with a fresh nonce. Ids must already be validated
    /// and free of the separator.
    pub fn new(buyer_id: impl Into<String>, seller_id: impl Into<String>) -> Self {
        Self {
            buyer_id: buyer_id.into(),
            seller_id: seller_id.into(),
            nonce: Uuid::new_v4().simple().to_string(),
        }
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ExternalReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{PREFIX}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}",
            self.buyer_id, self.seller_id, self.nonce
        )
    }
}

impl FromStr for ExternalReference {
    type Err = InvalidReference;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = raw.trim().split(SEPARATOR).collect();
        match parts.as_slice() {
            [prefix, buyer, seller, nonce]
                if *prefix == PREFIX
                    && is_identifier(buyer)
                    && is_identifier(seller)
                    && is_identifier(nonce) =>
            {
                Ok(Self {
                    buyer_id: buyer.to_string(),
                    seller_id: seller.to_string(),
                    nonce: nonce.to_string(),
                })
            }
            _ => Err(InvalidReference(raw.to_string())),
        }
    }
}

/// Each part must already be a valid id as written; nothing is sanitized here.
fn is_identifier(part: &str) -> bool {
    matches!(validate_profile_id("reference", part), Ok(clean) if clean == part)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_and_parse() {
        let reference = ExternalReference::new("buyer-1", "seller_9");
        let encoded = reference.encode();
        assert!(encoded.starts_with("contact:buyer-1:seller_9:"));

        let parsed: ExternalReference = encoded.parse().unwrap();
        assert_eq!(parsed, reference);
    }

    #[test]
    fn test_nonce_differs_per_reference() {
        let a = ExternalReference::new("b", "s");
        let b = ExternalReference::new("b", "s");
        assert_ne!(a.nonce, b.nonce);
    }

    #[test]
    fn test_rejects_foreign_references() {
        assert!("".parse::<ExternalReference>().is_err());
        assert!("order-123".parse::<ExternalReference>().is_err());
        assert!("contact:b1:s1".parse::<ExternalReference>().is_err());
        assert!("contact::s1:n".parse::<ExternalReference>().is_err());
        assert!("contact:b1:s1:n:extra".parse::<ExternalReference>().is_err());
        assert!("invoice:b1:s1:n".parse::<ExternalReference>().is_err());
    }

    #[test]
    fn test_rejects_ids_outside_the_profile_id_rules() {
        let overlong = format!("contact:{}:s1:n", "x".repeat(200));
        assert!(overlong.parse::<ExternalReference>().is_err());
        assert!("contact:b1:seller with spaces:n".parse::<ExternalReference>().is_err());
        assert!("contact:b1:s\t1:n".parse::<ExternalReference>().is_err());
        assert!("contact:b1:s/1:n".parse::<ExternalReference>().is_err());
        assert!("contact:b1:s1:n!".parse::<ExternalReference>().is_err());
    }
}
