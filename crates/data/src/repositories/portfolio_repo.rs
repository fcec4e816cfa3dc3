//! Portfolio repository.

use anyhow::Result;
use ltv_guard_core::models::{Portfolio, PortfolioStatus};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::models::PortfolioRecord;

const PORTFOLIO_COLUMNS: &str = "id, owner_id, asset_a, asset_b, balance_a, balance_b, \
     price_a, price_b, total_value, current_ltv, target_ltv_min, target_ltv_max, \
     auto_rebalance, status, created_at, last_updated, last_rebalance";

/// Repository for portfolio rows.
#[derive(Debug, Clone)]
pub struct PortfolioRepository {
    pool: PgPool,
}

impl PortfolioRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a new portfolio and returns the generated id.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn insert(&self, portfolio: &Portfolio) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO portfolios
                (owner_id, asset_a, asset_b, balance_a, balance_b, price_a, price_b,
                 total_value, current_ltv, target_ltv_min, target_ltv_max,
                 auto_rebalance, status, created_at, last_updated, last_rebalance)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING id
            "#,
        )
        .bind(portfolio.owner_id)
        .bind(&portfolio.asset_a)
        .bind(&portfolio.asset_b)
        .bind(portfolio.balance_a)
        .bind(portfolio.balance_b)
        .bind(portfolio.price_a)
        .bind(portfolio.price_b)
        .bind(portfolio.total_value)
        .bind(portfolio.current_ltv)
        .bind(portfolio.target_ltv_min)
        .bind(portfolio.target_ltv_max)
        .bind(portfolio.auto_rebalance)
        .bind(portfolio.status.as_str())
        .bind(portfolio.created_at)
        .bind(portfolio.last_updated)
        .bind(portfolio.last_rebalance)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    /// Writes back every mutable portfolio field.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn update(&self, portfolio: &Portfolio) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE portfolios
            SET balance_a = $2, balance_b = $3, price_a = $4, price_b = $5,
                total_value = $6, current_ltv = $7, target_ltv_min = $8,
                target_ltv_max = $9, auto_rebalance = $10, status = $11,
                last_updated = $12, last_rebalance = $13
            WHERE id = $1
            "#,
        )
        .bind(portfolio.id)
        .bind(portfolio.balance_a)
        .bind(portfolio.balance_b)
        .bind(portfolio.price_a)
        .bind(portfolio.price_b)
        .bind(portfolio.total_value)
        .bind(portfolio.current_ltv)
        .bind(portfolio.target_ltv_min)
        .bind(portfolio.target_ltv_max)
        .bind(portfolio.auto_rebalance)
        .bind(portfolio.status.as_str())
        .bind(portfolio.last_updated)
        .bind(portfolio.last_rebalance)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a portfolio by id.
    ///
    /// # Errors
    /// Returns an error if the query fails or the stored status is unknown.
    pub async fn get(&self, id: i64) -> Result<Option<Portfolio>> {
        let record = sqlx::query_as::<_, PortfolioRecord>(&format!(
            "SELECT {PORTFOLIO_COLUMNS} FROM portfolios WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        record.map(Portfolio::try_from).transpose()
    }

    /// Lists portfolios whose status admits automation cycles.
    ///
    /// # Errors
    /// Returns an error if the query fails or a stored status is unknown.
    pub async fn list_automated(&self) -> Result<Vec<Portfolio>> {
        let records = sqlx::query_as::<_, PortfolioRecord>(&format!(
            "SELECT {PORTFOLIO_COLUMNS} FROM portfolios \
             WHERE status IN ('active', 'danger') AND auto_rebalance \
             ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        records.into_iter().map(Portfolio::try_from).collect()
    }

    /// Sets the lifecycle status, the operator path back out of emergency.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn set_status(&self, id: i64, status: PortfolioStatus) -> Result<()> {
        sqlx::query("UPDATE portfolios SET status = $2, last_updated = NOW() WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Updates the target LTV band.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn update_band(&self, id: i64, ltv_min: Decimal, ltv_max: Decimal) -> Result<()> {
        sqlx::query(
            "UPDATE portfolios SET target_ltv_min = $2, target_ltv_max = $3, \
             last_updated = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(ltv_min)
        .bind(ltv_max)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
