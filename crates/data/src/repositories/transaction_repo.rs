//! Append-only transaction ledger.
//!
//! There is deliberately no update or delete here; corrections are modeled
//! as new compensating entries.

use anyhow::Result;
use ltv_guard_core::models::Transaction;
use sqlx::PgPool;

use crate::models::TransactionRecord;

#[derive(Debug, Clone)]
pub struct TransactionRepository {
    pool: PgPool,
}

impl TransactionRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Appends one immutable ledger entry and returns its id.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn append(&self, transaction: &Transaction) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO transactions
                (portfolio_id, kind, description, amount_a, amount_b,
                 ltv_ratio, total_value, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(transaction.portfolio_id)
        .bind(transaction.kind.as_str())
        .bind(&transaction.description)
        .bind(transaction.amount_a)
        .bind(transaction.amount_b)
        .bind(transaction.ltv_ratio)
        .bind(transaction.total_value)
        .bind(transaction.timestamp)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    /// Gets the most recent entries for a portfolio, newest first.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn recent(&self, portfolio_id: i64, limit: i64) -> Result<Vec<TransactionRecord>> {
        let records = sqlx::query_as::<_, TransactionRecord>(
            r#"
            SELECT id, portfolio_id, kind, description, amount_a, amount_b,
                   ltv_ratio, total_value, timestamp
            FROM transactions
            WHERE portfolio_id = $1
            ORDER BY timestamp DESC
            LIMIT $2
            "#,
        )
        .bind(portfolio_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}
