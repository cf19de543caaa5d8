//! Read-only view of the marketplace profile directory.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::ports::{ProfileDirectory, RepositoryResult};
use crate::processor::PayerInfo;

#[derive(Clone)]
pub struct PostgresProfileDirectory {
    pool: PgPool,
}

impl PostgresProfileDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PayerRow {
    name: Option<String>,
    email: Option<String>,
}

#[async_trait]
impl ProfileDirectory for PostgresProfileDirectory {
    async fn payer_info(&self, profile_id: &str) -> RepositoryResult<Option<PayerInfo>> {
        let row = sqlx::query_as::<_, PayerRow>("SELECT name, email FROM profiles WHERE id = $1")
            .bind(profile_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| PayerInfo {
            email: row.email.map(|email| email.trim().to_string()).unwrap_or_default(),
            first_name: row.name.and_then(|name| {
                name.split_whitespace().next().map(str::to_string)
            }),
        }))
    }

    async fn exists(&self, profile_id: &str) -> RepositoryResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM profiles WHERE id = $1)")
                .bind(profile_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn contact_channel(&self, profile_id: &str) -> RepositoryResult<Option<String>> {
        let whatsapp: Option<Option<String>> =
            sqlx::query_scalar("SELECT whatsapp FROM profiles WHERE id = $1")
                .bind(profile_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(whatsapp.flatten().filter(|w| !w.trim().is_empty()))
    }
}
