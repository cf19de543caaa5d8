//! Postgres implementation of TransactionRepository.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{PaymentStatus, Transaction};
use crate::ports::{RepositoryError, RepositoryResult, TransactionRepository, UpsertOutcome};

const COLUMNS: &str = "id, buyer_id, seller_id, external_payment_id, external_reference, status, \
     status_detail, amount, created_at, updated_at, approved_at";

/// Progress rank of a status column, mirrors `PaymentStatus::rank`.
fn rank_sql(column: &str) -> String {
    format!(
        "(CASE {column} WHEN 'in_process' THEN 1 \
         WHEN 'approved' THEN 2 WHEN 'rejected' THEN 2 WHEN 'cancelled' THEN 2 \
         WHEN 'refunded' THEN 2 WHEN 'charged_back' THEN 2 ELSE 0 END)"
    )
}

/// Single-statement upsert. The `WHERE` on the conflict branch is the guard that
/// keeps a late writer from moving a row backward; when it filters the row out,
/// nothing is returned and the row is left untouched.
fn upsert_sql() -> String {
    format!(
        r#"
        INSERT INTO transactions ({COLUMNS})
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (external_payment_id) DO UPDATE SET
            status = EXCLUDED.status,
            status_detail = COALESCE(EXCLUDED.status_detail, transactions.status_detail),
            approved_at = COALESCE(EXCLUDED.approved_at, transactions.approved_at),
            external_reference = COALESCE(transactions.external_reference, EXCLUDED.external_reference),
            updated_at = NOW()
        WHERE transactions.status <> EXCLUDED.status
          AND {current} < 2
          AND {incoming} >= {current}
        RETURNING {COLUMNS}, (xmax = 0) AS inserted
        "#,
        current = rank_sql("transactions.status"),
        incoming = rank_sql("EXCLUDED.status"),
    )
}

/// Postgres-backed transaction repository.
#[derive(Clone)]
pub struct PostgresTransactionRepository {
    pool: PgPool,
}

impl PostgresTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionRepository for PostgresTransactionRepository {
    async fn find_by_external_id(
        &self,
        external_payment_id: &str,
    ) -> RepositoryResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {COLUMNS} FROM transactions WHERE external_payment_id = $1"
        ))
        .bind(external_payment_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn upsert(&self, tx: &Transaction) -> RepositoryResult<UpsertOutcome> {
        let mut db_tx = self.pool.begin().await?;

        // Serialize writers per payment id. A row lock alone does not cover two
        // first writers racing on a row that does not exist yet.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&tx.external_payment_id)
            .execute(&mut *db_tx)
            .await?;

        // Lock the existing row first so the previous status reported in the
        // outcome is the one the guarded update actually replaced.
        let previous: Option<String> = sqlx::query_scalar(
            "SELECT status FROM transactions WHERE external_payment_id = $1 FOR UPDATE",
        )
        .bind(&tx.external_payment_id)
        .fetch_optional(&mut *db_tx)
        .await?;

        let written = sqlx::query_as::<_, UpsertedRow>(&upsert_sql())
            .bind(tx.id)
            .bind(&tx.buyer_id)
            .bind(&tx.seller_id)
            .bind(&tx.external_payment_id)
            .bind(&tx.external_reference)
            .bind(tx.status.as_str())
            .bind(&tx.status_detail)
            .bind(&tx.amount)
            .bind(tx.created_at)
            .bind(tx.updated_at)
            .bind(tx.approved_at)
            .fetch_optional(&mut *db_tx)
            .await?;

        let outcome = match written {
            Some(row) if row.inserted => UpsertOutcome::Inserted(row.record.into_domain()?),
            Some(row) => {
                let previous = previous
                    .ok_or_else(|| {
                        RepositoryError::Unavailable(format!(
                            "payment {} appeared while locked",
                            tx.external_payment_id
                        ))
                    })?
                    .parse::<PaymentStatus>()
                    .map_err(|e| RepositoryError::Unavailable(e.to_string()))?;
                UpsertOutcome::Updated {
                    transaction: row.record.into_domain()?,
                    previous,
                }
            }
            None => {
                let current = sqlx::query_as::<_, TransactionRow>(&format!(
                    "SELECT {COLUMNS} FROM transactions WHERE external_payment_id = $1"
                ))
                .bind(&tx.external_payment_id)
                .fetch_one(&mut *db_tx)
                .await?;
                UpsertOutcome::Unchanged(current.into_domain()?)
            }
        };

        db_tx.commit().await?;
        Ok(outcome)
    }

    async fn ping(&self) -> RepositoryResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Internal row type for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    buyer_id: String,
    seller_id: String,
    external_payment_id: String,
    external_reference: Option<String>,
    status: String,
    status_detail: Option<String>,
    amount: bigdecimal::BigDecimal,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
    approved_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, sqlx::FromRow)]
struct UpsertedRow {
    #[sqlx(flatten)]
    record: TransactionRow,
    inserted: bool,
}

impl TransactionRow {
    fn into_domain(self) -> RepositoryResult<Transaction> {
        let status = self
            .status
            .parse::<PaymentStatus>()
            .map_err(|e| RepositoryError::Unavailable(e.to_string()))?;

        Ok(Transaction {
            id: self.id,
            buyer_id: self.buyer_id,
            seller_id: self.seller_id,
            external_payment_id: self.external_payment_id,
            external_reference: self.external_reference,
            status,
            status_detail: self.status_detail,
            amount: self.amount,
            created_at: self.created_at,
            updated_at: self.updated_at,
            approved_at: self.approved_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_sql_matches_domain_rank() {
        let sql = rank_sql("s");
        for status in PaymentStatus::ALL {
            let expected_branch = match status.rank() {
                0 => continue,
                rank => format!("WHEN '{}' THEN {}", status.as_str(), rank),
            };
            assert!(sql.contains(&expected_branch), "missing {expected_branch}");
        }
        assert!(sql.contains("ELSE 0"));
    }

    #[test]
    fn test_upsert_sql_guards_terminal_rows() {
        let sql = upsert_sql();
        assert!(sql.contains("ON CONFLICT (external_payment_id) DO UPDATE"));
        assert!(sql.contains("transactions.status <> EXCLUDED.status"));
        assert!(sql.contains("< 2"));
    }
}
