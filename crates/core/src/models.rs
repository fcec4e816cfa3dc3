//! Domain model for the leveraged yield loop.
//!
//! All monetary fields use `rust_decimal::Decimal`. Status enums carry
//! `as_str`/`FromStr` conversions for the text columns the data layer uses.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::traits::{EarnBalances, LoanBalance};

/// Lifecycle status of a portfolio.
///
/// Within one cycle, transitions only move toward higher severity
/// (active -> danger -> emergency); only an operator action moves a
/// portfolio back toward `Active` after `Emergency` or `Liquidated`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PortfolioStatus {
    Active,
    Paused,
    Danger,
    Emergency,
    Liquidated,
}

impl PortfolioStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Danger => "danger",
            Self::Emergency => "emergency",
            Self::Liquidated => "liquidated",
        }
    }

    /// Whether the automation loop admits cycles for this status.
    #[must_use]
    pub const fn is_automated(self) -> bool {
        matches!(self, Self::Active | Self::Danger)
    }
}

impl FromStr for PortfolioStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "danger" => Ok(Self::Danger),
            "emergency" => Ok(Self::Emergency),
            "liquidated" => Ok(Self::Liquidated),
            other => anyhow::bail!("unknown portfolio status: {other}"),
        }
    }
}

/// Leveraged two-asset collateral position owned by one principal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    pub id: i64,
    pub owner_id: i64,
    pub asset_a: String,
    pub asset_b: String,
    pub balance_a: Decimal,
    pub balance_b: Decimal,
    pub price_a: Decimal,
    pub price_b: Decimal,
    /// USD value of all held balances (spot + earn) in the two assets.
    pub total_value: Decimal,
    pub current_ltv: Decimal,
    pub target_ltv_min: Decimal,
    pub target_ltv_max: Decimal,
    pub auto_rebalance: bool,
    pub status: PortfolioStatus,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub last_rebalance: Option<DateTime<Utc>>,
}

impl Portfolio {
    /// Last observed total balance of one of the two strategy assets.
    #[must_use]
    pub fn balance_of(&self, asset: &str) -> Option<Decimal> {
        if asset == self.asset_a {
            Some(self.balance_a)
        } else if asset == self.asset_b {
            Some(self.balance_b)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Borrowing,
    Repaid,
    Liquidated,
}

impl LoanStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Borrowing => "borrowing",
            Self::Repaid => "repaid",
            Self::Liquidated => "liquidated",
        }
    }
}

impl FromStr for LoanStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "borrowing" => Ok(Self::Borrowing),
            "repaid" => Ok(Self::Repaid),
            "liquidated" => Ok(Self::Liquidated),
            other => anyhow::bail!("unknown loan status: {other}"),
        }
    }
}

/// One open borrow against collateral, keyed by the venue order id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanPosition {
    pub portfolio_id: i64,
    pub loan_asset: String,
    pub collateral_asset: String,
    pub principal: Decimal,
    pub outstanding: Decimal,
    pub interest_rate: Option<Decimal>,
    pub status: LoanStatus,
    pub order_id: String,
    pub borrowed_at: DateTime<Utc>,
    pub repaid_at: Option<DateTime<Utc>>,
}

impl LoanPosition {
    /// Applies a repayment, flipping the status to `Repaid` once the
    /// outstanding amount reaches zero.
    pub fn apply_repayment(&mut self, amount: Decimal, at: DateTime<Utc>) {
        self.outstanding = (self.outstanding - amount).max(Decimal::ZERO);
        if self.outstanding == Decimal::ZERO {
            self.status = LoanStatus::Repaid;
            self.repaid_at = Some(at);
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EarnProductKind {
    Flexible,
    Locked,
    Staking,
}

impl EarnProductKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Flexible => "flexible",
            Self::Locked => "locked",
            Self::Staking => "staking",
        }
    }
}

impl FromStr for EarnProductKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flexible" => Ok(Self::Flexible),
            "locked" => Ok(Self::Locked),
            "staking" => Ok(Self::Staking),
            other => anyhow::bail!("unknown earn product kind: {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EarnStatus {
    Active,
    Matured,
    Redeemed,
}

impl EarnStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Matured => "matured",
            Self::Redeemed => "redeemed",
        }
    }
}

impl FromStr for EarnStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "matured" => Ok(Self::Matured),
            "redeemed" => Ok(Self::Redeemed),
            other => anyhow::bail!("unknown earn status: {other}"),
        }
    }
}

/// A yield-bearing deposit of collateral, keyed by the venue product id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarnPosition {
    pub portfolio_id: i64,
    pub asset: String,
    pub kind: EarnProductKind,
    pub product_id: String,
    pub principal: Decimal,
    pub current_amount: Decimal,
    pub rewards_earned: Decimal,
    pub apr: Option<Decimal>,
    pub status: EarnStatus,
    pub subscribed_at: DateTime<Utc>,
    pub redeemed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    NormalOperation,
    DangerZone,
    EmergencyLiquidation,
    Initialization,
    Borrow,
    Repay,
    Harvest,
}

impl TransactionKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NormalOperation => "normal_operation",
            Self::DangerZone => "danger_zone",
            Self::EmergencyLiquidation => "emergency_liquidation",
            Self::Initialization => "initialization",
            Self::Borrow => "borrow",
            Self::Repay => "repay",
            Self::Harvest => "harvest",
        }
    }
}

impl FromStr for TransactionKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal_operation" => Ok(Self::NormalOperation),
            "danger_zone" => Ok(Self::DangerZone),
            "emergency_liquidation" => Ok(Self::EmergencyLiquidation),
            "initialization" => Ok(Self::Initialization),
            "borrow" => Ok(Self::Borrow),
            "repay" => Ok(Self::Repay),
            "harvest" => Ok(Self::Harvest),
            other => anyhow::bail!("unknown transaction kind: {other}"),
        }
    }
}

/// Immutable audit record of one action. Appended, never mutated;
/// corrections are new compensating entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub portfolio_id: i64,
    pub kind: TransactionKind,
    pub description: String,
    pub amount_a: Decimal,
    pub amount_b: Decimal,
    pub ltv_ratio: Decimal,
    pub total_value: Decimal,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl AlertSeverity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl FromStr for AlertSeverity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Self::Info),
            "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "critical" => Ok(Self::Critical),
            other => anyhow::bail!("unknown alert severity: {other}"),
        }
    }
}

/// Notification record. References an owner by id only; read/resolved flags
/// are mutated solely by explicit acknowledgment outside the core loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemAlert {
    pub owner_id: Option<i64>,
    pub kind: String,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Point-in-time valuation of one of the two strategy assets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetValuation {
    pub asset: String,
    pub spot_amount: Decimal,
    pub earn_amount: Decimal,
    pub price: Decimal,
}

impl AssetValuation {
    #[must_use]
    pub fn total_amount(&self) -> Decimal {
        self.spot_amount + self.earn_amount
    }

    #[must_use]
    pub fn value(&self) -> Decimal {
        self.total_amount() * self.price
    }
}

/// One consistent observation of balances, prices, and loan exposure.
///
/// The risk controller is a pure function of a snapshot plus strategy
/// parameters, so a cycle replayed against an unchanged snapshot makes the
/// same decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub portfolio_id: i64,
    pub taken_at: DateTime<Utc>,
    pub assets: Vec<AssetValuation>,
    pub loans: Vec<LoanBalance>,
    pub earn: EarnBalances,
    pub collateral_value: Decimal,
    pub borrowed_value: Decimal,
    pub ltv: Decimal,
}

impl PortfolioSnapshot {
    /// Total (spot + earn) balance of an asset at observation time.
    #[must_use]
    pub fn balance_of(&self, asset: &str) -> Decimal {
        self.assets
            .iter()
            .find(|valuation| valuation.asset == asset)
            .map_or(Decimal::ZERO, AssetValuation::total_amount)
    }

    #[must_use]
    pub fn price_of(&self, asset: &str) -> Option<Decimal> {
        self.assets
            .iter()
            .find(|valuation| valuation.asset == asset)
            .map(|valuation| valuation.price)
    }

    /// Loans still being borrowed against, the ones that count toward LTV.
    pub fn open_loans(&self) -> impl Iterator<Item = &LoanBalance> {
        self.loans
            .iter()
            .filter(|loan| loan.status == LoanStatus::Borrowing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            PortfolioStatus::Active,
            PortfolioStatus::Paused,
            PortfolioStatus::Danger,
            PortfolioStatus::Emergency,
            PortfolioStatus::Liquidated,
        ] {
            assert_eq!(status.as_str().parse::<PortfolioStatus>().unwrap(), status);
        }
        assert!("unknown".parse::<PortfolioStatus>().is_err());
    }

    #[test]
    fn automation_admits_active_and_danger_only() {
        assert!(PortfolioStatus::Active.is_automated());
        assert!(PortfolioStatus::Danger.is_automated());
        assert!(!PortfolioStatus::Paused.is_automated());
        assert!(!PortfolioStatus::Emergency.is_automated());
        assert!(!PortfolioStatus::Liquidated.is_automated());
    }

    #[test]
    fn repayment_flips_status_at_zero() {
        let mut loan = LoanPosition {
            portfolio_id: 1,
            loan_asset: "ETH".to_string(),
            collateral_asset: "SOL".to_string(),
            principal: dec!(2.0),
            outstanding: dec!(2.0),
            interest_rate: None,
            status: LoanStatus::Borrowing,
            order_id: "loan-1".to_string(),
            borrowed_at: Utc::now(),
            repaid_at: None,
        };

        loan.apply_repayment(dec!(0.5), Utc::now());
        assert_eq!(loan.outstanding, dec!(1.5));
        assert_eq!(loan.status, LoanStatus::Borrowing);

        loan.apply_repayment(dec!(1.5), Utc::now());
        assert_eq!(loan.outstanding, Decimal::ZERO);
        assert_eq!(loan.status, LoanStatus::Repaid);
        assert!(loan.repaid_at.is_some());
    }

    #[test]
    fn valuation_totals_spot_and_earn() {
        let valuation = AssetValuation {
            asset: "ETH".to_string(),
            spot_amount: dec!(1.5),
            earn_amount: dec!(2.5),
            price: dec!(2000),
        };
        assert_eq!(valuation.total_amount(), dec!(4.0));
        assert_eq!(valuation.value(), dec!(8000.0));
    }
}
