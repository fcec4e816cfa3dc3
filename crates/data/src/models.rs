//! Database row types.
//!
//! All models use `rust_decimal::Decimal` for financial precision and derive
//! `sqlx::FromRow`. Status columns are text; conversion into the core enums
//! happens in `TryFrom`, so an unknown value surfaces as an error instead of
//! a silent default.

use anyhow::Result;
use chrono::{DateTime, Utc};
use ltv_guard_core::models::{
    EarnPosition, LoanPosition, Portfolio, SystemAlert, Transaction,
};
use rust_decimal::Decimal;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PortfolioRecord {
    pub id: i64,
    pub owner_id: i64,
    pub asset_a: String,
    pub asset_b: String,
    pub balance_a: Decimal,
    pub balance_b: Decimal,
    pub price_a: Decimal,
    pub price_b: Decimal,
    pub total_value: Decimal,
    pub current_ltv: Decimal,
    pub target_ltv_min: Decimal,
    pub target_ltv_max: Decimal,
    pub auto_rebalance: bool,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub last_rebalance: Option<DateTime<Utc>>,
}

impl TryFrom<PortfolioRecord> for Portfolio {
    type Error = anyhow::Error;

    fn try_from(record: PortfolioRecord) -> Result<Self> {
        Ok(Self {
            id: record.id,
            owner_id: record.owner_id,
            asset_a: record.asset_a,
            asset_b: record.asset_b,
            balance_a: record.balance_a,
            balance_b: record.balance_b,
            price_a: record.price_a,
            price_b: record.price_b,
            total_value: record.total_value,
            current_ltv: record.current_ltv,
            target_ltv_min: record.target_ltv_min,
            target_ltv_max: record.target_ltv_max,
            auto_rebalance: record.auto_rebalance,
            status: record.status.parse()?,
            created_at: record.created_at,
            last_updated: record.last_updated,
            last_rebalance: record.last_rebalance,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TransactionRecord {
    pub id: i64,
    pub portfolio_id: i64,
    pub kind: String,
    pub description: String,
    pub amount_a: Decimal,
    pub amount_b: Decimal,
    pub ltv_ratio: Decimal,
    pub total_value: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl TryFrom<TransactionRecord> for Transaction {
    type Error = anyhow::Error;

    fn try_from(record: TransactionRecord) -> Result<Self> {
        Ok(Self {
            portfolio_id: record.portfolio_id,
            kind: record.kind.parse()?,
            description: record.description,
            amount_a: record.amount_a,
            amount_b: record.amount_b,
            ltv_ratio: record.ltv_ratio,
            total_value: record.total_value,
            timestamp: record.timestamp,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LoanPositionRecord {
    pub id: i64,
    pub portfolio_id: i64,
    pub loan_asset: String,
    pub collateral_asset: String,
    pub principal: Decimal,
    pub outstanding: Decimal,
    pub interest_rate: Option<Decimal>,
    pub status: String,
    pub order_id: String,
    pub borrowed_at: DateTime<Utc>,
    pub repaid_at: Option<DateTime<Utc>>,
}

impl TryFrom<LoanPositionRecord> for LoanPosition {
    type Error = anyhow::Error;

    fn try_from(record: LoanPositionRecord) -> Result<Self> {
        Ok(Self {
            portfolio_id: record.portfolio_id,
            loan_asset: record.loan_asset,
            collateral_asset: record.collateral_asset,
            principal: record.principal,
            outstanding: record.outstanding,
            interest_rate: record.interest_rate,
            status: record.status.parse()?,
            order_id: record.order_id,
            borrowed_at: record.borrowed_at,
            repaid_at: record.repaid_at,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EarnPositionRecord {
    pub id: i64,
    pub portfolio_id: i64,
    pub asset: String,
    pub kind: String,
    pub product_id: String,
    pub principal: Decimal,
    pub current_amount: Decimal,
    pub rewards_earned: Decimal,
    pub apr: Option<Decimal>,
    pub status: String,
    pub subscribed_at: DateTime<Utc>,
    pub redeemed_at: Option<DateTime<Utc>>,
}

impl TryFrom<EarnPositionRecord> for EarnPosition {
    type Error = anyhow::Error;

    fn try_from(record: EarnPositionRecord) -> Result<Self> {
        Ok(Self {
            portfolio_id: record.portfolio_id,
            asset: record.asset,
            kind: record.kind.parse()?,
            product_id: record.product_id,
            principal: record.principal,
            current_amount: record.current_amount,
            rewards_earned: record.rewards_earned,
            apr: record.apr,
            status: record.status.parse()?,
            subscribed_at: record.subscribed_at,
            redeemed_at: record.redeemed_at,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AlertRecord {
    pub id: i64,
    pub owner_id: Option<i64>,
    pub kind: String,
    pub severity: String,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub is_resolved: bool,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl TryFrom<AlertRecord> for SystemAlert {
    type Error = anyhow::Error;

    fn try_from(record: AlertRecord) -> Result<Self> {
        Ok(Self {
            owner_id: record.owner_id,
            kind: record.kind,
            severity: record.severity.parse()?,
            title: record.title,
            message: record.message,
            created_at: record.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ltv_guard_core::models::{LoanStatus, PortfolioStatus, TransactionKind};
    use rust_decimal_macros::dec;

    #[test]
    fn portfolio_record_converts_with_valid_status() {
        let record = PortfolioRecord {
            id: 1,
            owner_id: 7,
            asset_a: "ETH".to_string(),
            asset_b: "SOL".to_string(),
            balance_a: dec!(2.5),
            balance_b: dec!(50),
            price_a: dec!(2000),
            price_b: dec!(100),
            total_value: dec!(10000),
            current_ltv: dec!(0.6),
            target_ltv_min: dec!(0.55),
            target_ltv_max: dec!(0.65),
            auto_rebalance: true,
            status: "danger".to_string(),
            created_at: Utc::now(),
            last_updated: Utc::now(),
            last_rebalance: None,
        };
        let portfolio = Portfolio::try_from(record).unwrap();
        assert_eq!(portfolio.status, PortfolioStatus::Danger);
        assert_eq!(portfolio.balance_of("SOL"), Some(dec!(50)));
    }

    #[test]
    fn unknown_status_text_is_rejected() {
        let record = LoanPositionRecord {
            id: 1,
            portfolio_id: 1,
            loan_asset: "ETH".to_string(),
            collateral_asset: "SOL".to_string(),
            principal: dec!(1),
            outstanding: dec!(1),
            interest_rate: None,
            status: "defaulted".to_string(),
            order_id: "loan-1".to_string(),
            borrowed_at: Utc::now(),
            repaid_at: None,
        };
        assert!(LoanPosition::try_from(record.clone()).is_err());

        let mut valid = record;
        valid.status = "borrowing".to_string();
        assert_eq!(
            LoanPosition::try_from(valid).unwrap().status,
            LoanStatus::Borrowing
        );
    }

    #[test]
    fn transaction_record_round_trips_kind() {
        let record = TransactionRecord {
            id: 1,
            portfolio_id: 1,
            kind: TransactionKind::DangerZone.as_str().to_string(),
            description: "aggressive deleverage".to_string(),
            amount_a: dec!(2),
            amount_b: dec!(60),
            ltv_ratio: dec!(0.72),
            total_value: dec!(10000),
            timestamp: Utc::now(),
        };
        let transaction = Transaction::try_from(record).unwrap();
        assert_eq!(transaction.kind, TransactionKind::DangerZone);
    }
}
