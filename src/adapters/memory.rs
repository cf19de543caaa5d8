//! In-memory adapters used by tests and local runs without Postgres.
//! They follow the same upsert rules as the Postgres store.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::domain::Transaction;
use crate::ports::{
    ProfileDirectory, RepositoryError, RepositoryResult, TransactionRepository, UpsertOutcome,
};
use crate::processor::PayerInfo;

#[derive(Default)]
pub struct InMemoryTransactionRepository {
    rows: RwLock<HashMap<String, Transaction>>,
    unavailable: AtomicBool,
}

impl InMemoryTransactionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail, to exercise persistence failure paths.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    fn check_available(&self) -> RepositoryResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("in-memory store disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TransactionRepository for InMemoryTransactionRepository {
    async fn find_by_external_id(
        &self,
        external_payment_id: &str,
    ) -> RepositoryResult<Option<Transaction>> {
        self.check_available()?;
        Ok(self.rows.read().await.get(external_payment_id).cloned())
    }

    async fn upsert(&self, tx: &Transaction) -> RepositoryResult<UpsertOutcome> {
        self.check_available()?;
        let mut rows = self.rows.write().await;

        let stored = match rows.entry(tx.external_payment_id.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(tx.clone());
                return Ok(UpsertOutcome::Inserted(tx.clone()));
            }
            Entry::Occupied(slot) => slot.into_mut(),
        };

        if !stored.status.can_transition_to(tx.status) {
            return Ok(UpsertOutcome::Unchanged(stored.clone()));
        }

        let previous = stored.status;
        stored.status = tx.status;
        if tx.status_detail.is_some() {
            stored.status_detail = tx.status_detail.clone();
        }
        if tx.approved_at.is_some() {
            stored.approved_at = tx.approved_at;
        }
        if stored.external_reference.is_none() {
            stored.external_reference = tx.external_reference.clone();
        }
        stored.updated_at = Utc::now();

        Ok(UpsertOutcome::Updated {
            transaction: stored.clone(),
            previous,
        })
    }

    async fn ping(&self) -> RepositoryResult<()> {
        self.check_available()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Profile {
    pub name: Option<String>,
    pub email: Option<String>,
    pub whatsapp: Option<String>,
}

#[derive(Default)]
pub struct InMemoryProfileDirectory {
    profiles: RwLock<HashMap<String, Profile>>,
}

impl InMemoryProfileDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, id: impl Into<String>, profile: Profile) {
        self.profiles.write().await.insert(id.into(), profile);
    }
}

#[async_trait]
impl ProfileDirectory for InMemoryProfileDirectory {
    async fn payer_info(&self, profile_id: &str) -> RepositoryResult<Option<PayerInfo>> {
        Ok(self.profiles.read().await.get(profile_id).map(|p| PayerInfo {
            email: p.email.clone().unwrap_or_default(),
            first_name: p.name.clone(),
        }))
    }

    async fn exists(&self, profile_id: &str) -> RepositoryResult<bool> {
        Ok(self.profiles.read().await.contains_key(profile_id))
    }

    async fn contact_channel(&self, profile_id: &str) -> RepositoryResult<Option<String>> {
        Ok(self
            .profiles
            .read()
            .await
            .get(profile_id)
            .and_then(|p| p.whatsapp.clone()))
    }
}
