//! Loan position repository, keyed by (portfolio, venue order id).

use anyhow::Result;
use ltv_guard_core::models::LoanPosition;
use sqlx::PgPool;

use crate::models::LoanPositionRecord;

#[derive(Debug, Clone)]
pub struct LoanPositionRepository {
    pool: PgPool,
}

impl LoanPositionRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts or refreshes the row for this venue order.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn upsert(&self, loan: &LoanPosition) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO loan_positions
                (portfolio_id, loan_asset, collateral_asset, principal, outstanding,
                 interest_rate, status, order_id, borrowed_at, repaid_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (portfolio_id, order_id) DO UPDATE
            SET outstanding = EXCLUDED.outstanding,
                interest_rate = EXCLUDED.interest_rate,
                status = EXCLUDED.status,
                repaid_at = EXCLUDED.repaid_at
            "#,
        )
        .bind(loan.portfolio_id)
        .bind(&loan.loan_asset)
        .bind(&loan.collateral_asset)
        .bind(loan.principal)
        .bind(loan.outstanding)
        .bind(loan.interest_rate)
        .bind(loan.status.as_str())
        .bind(&loan.order_id)
        .bind(loan.borrowed_at)
        .bind(loan.repaid_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Lists all loan rows for a portfolio.
    ///
    /// # Errors
    /// Returns an error if the query fails or a stored status is unknown.
    pub async fn list(&self, portfolio_id: i64) -> Result<Vec<LoanPosition>> {
        let records = sqlx::query_as::<_, LoanPositionRecord>(
            r#"
            SELECT id, portfolio_id, loan_asset, collateral_asset, principal,
                   outstanding, interest_rate, status, order_id, borrowed_at, repaid_at
            FROM loan_positions
            WHERE portfolio_id = $1
            ORDER BY borrowed_at ASC
            "#,
        )
        .bind(portfolio_id)
        .fetch_all(&self.pool)
        .await?;

        records.into_iter().map(LoanPosition::try_from).collect()
    }
}
