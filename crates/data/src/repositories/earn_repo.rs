//! Earn position repository, keyed by (portfolio, venue product id).

use anyhow::Result;
use ltv_guard_core::models::EarnPosition;
use sqlx::PgPool;

use crate::models::EarnPositionRecord;

#[derive(Debug, Clone)]
pub struct EarnPositionRepository {
    pool: PgPool,
}

impl EarnPositionRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts or refreshes the row for this venue product.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn upsert(&self, position: &EarnPosition) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO earn_positions
                (portfolio_id, asset, kind, product_id, principal, current_amount,
                 rewards_earned, apr, status, subscribed_at, redeemed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (portfolio_id, product_id) DO UPDATE
            SET current_amount = EXCLUDED.current_amount,
                rewards_earned = EXCLUDED.rewards_earned,
                apr = EXCLUDED.apr,
                status = EXCLUDED.status,
                subscribed_at = EXCLUDED.subscribed_at,
                redeemed_at = EXCLUDED.redeemed_at
            "#,
        )
        .bind(position.portfolio_id)
        .bind(&position.asset)
        .bind(position.kind.as_str())
        .bind(&position.product_id)
        .bind(position.principal)
        .bind(position.current_amount)
        .bind(position.rewards_earned)
        .bind(position.apr)
        .bind(position.status.as_str())
        .bind(position.subscribed_at)
        .bind(position.redeemed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Lists all earn rows for a portfolio.
    ///
    /// # Errors
    /// Returns an error if the query fails or a stored status is unknown.
    pub async fn list(&self, portfolio_id: i64) -> Result<Vec<EarnPosition>> {
        let records = sqlx::query_as::<_, EarnPositionRecord>(
            r#"
            SELECT id, portfolio_id, asset, kind, product_id, principal,
                   current_amount, rewards_earned, apr, status, subscribed_at, redeemed_at
            FROM earn_positions
            WHERE portfolio_id = $1
            ORDER BY subscribed_at ASC
            "#,
        )
        .bind(portfolio_id)
        .fetch_all(&self.pool)
        .await?;

        records.into_iter().map(EarnPosition::try_from).collect()
    }
}
