//! Capability traits the control loop consumes, plus the typed value objects
//! crossing those boundaries.
//!
//! Gateway payloads are validated into these row types at the exchange
//! boundary so the core never branches on raw JSON shapes.

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::models::{
    EarnPosition, LoanPosition, LoanStatus, Portfolio, SystemAlert, Transaction,
};

/// One spot wallet row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotBalance {
    pub asset: String,
    pub free: Decimal,
    pub locked: Decimal,
}

impl SpotBalance {
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.free + self.locked
    }
}

/// One yield product row, flexible or locked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarnBalance {
    pub asset: String,
    pub product_id: String,
    pub total_amount: Decimal,
    /// Amount redeemable right now; zero for still-locked positions.
    pub free_amount: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EarnBalances {
    pub flexible: Vec<EarnBalance>,
    pub locked: Vec<EarnBalance>,
}

impl EarnBalances {
    /// All rows regardless of lock state, in flexible-first order.
    pub fn all(&self) -> impl Iterator<Item = &EarnBalance> {
        self.flexible.iter().chain(self.locked.iter())
    }

    #[must_use]
    pub fn total_for(&self, asset: &str) -> Decimal {
        self.all()
            .filter(|row| row.asset == asset)
            .map(|row| row.total_amount)
            .sum()
    }
}

/// One open loan row as reported by the venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanBalance {
    pub order_id: String,
    pub loan_asset: String,
    pub outstanding: Decimal,
    pub status: LoanStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountInfo {
    pub can_trade: bool,
    pub balances: Vec<SpotBalance>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum WalletKind {
    Spot,
    Funding,
    Earn,
}

impl WalletKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Spot => "MAIN",
            Self::Funding => "FUNDING",
            Self::Earn => "EARN",
        }
    }
}

/// Read and act on venue state. All calls are blocking from the controller's
/// point of view and carry a timeout; failures map onto [`GatewayError`].
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    async fn account_info(&self) -> Result<AccountInfo, GatewayError>;

    async fn spot_balances(&self) -> Result<Vec<SpotBalance>, GatewayError>;

    async fn earn_balances(&self) -> Result<EarnBalances, GatewayError>;

    async fn loan_positions(&self) -> Result<Vec<LoanBalance>, GatewayError>;

    async fn price(&self, symbol: &str) -> Result<Decimal, GatewayError>;

    /// Places a market order sized by quote value; returns the venue order id.
    async fn place_spot_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quote_amount: Decimal,
    ) -> Result<String, GatewayError>;

    /// Borrows `amount` of `asset` against `collateral_asset`; returns the
    /// venue loan order id.
    async fn borrow(
        &self,
        asset: &str,
        amount: Decimal,
        collateral_asset: &str,
    ) -> Result<String, GatewayError>;

    async fn repay(&self, order_id: &str, amount: Decimal) -> Result<(), GatewayError>;

    async fn subscribe_earn(&self, product_id: &str, amount: Decimal)
        -> Result<(), GatewayError>;

    async fn redeem_earn(&self, product_id: &str, amount: Decimal) -> Result<(), GatewayError>;

    async fn transfer(
        &self,
        asset: &str,
        amount: Decimal,
        from: WalletKind,
        to: WalletKind,
    ) -> Result<(), GatewayError>;
}

/// Durable state for portfolios and their owned rows.
///
/// Read-your-writes consistency is assumed within one portfolio's cycle;
/// nothing is promised across portfolios.
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    async fn load_active_portfolios(&self) -> Result<Vec<Portfolio>>;

    async fn load_portfolio(&self, id: i64) -> Result<Option<Portfolio>>;

    async fn create_portfolio(&self, portfolio: &Portfolio) -> Result<i64>;

    async fn save_portfolio(&self, portfolio: &Portfolio) -> Result<()>;

    /// Appends one immutable ledger entry and returns its id. The ledger has
    /// no update or delete; corrections are compensating entries.
    async fn append_transaction(&self, transaction: &Transaction) -> Result<i64>;

    async fn append_alert(&self, alert: &SystemAlert) -> Result<i64>;

    async fn loan_positions(&self, portfolio_id: i64) -> Result<Vec<LoanPosition>>;

    async fn earn_positions(&self, portfolio_id: i64) -> Result<Vec<EarnPosition>>;

    async fn upsert_loan_position(&self, loan: &LoanPosition) -> Result<()>;

    async fn upsert_earn_position(&self, position: &EarnPosition) -> Result<()>;
}

/// Outbound notification channel. Fire-and-forget: a delivery failure is
/// logged by the caller and never fails the triggering cycle.
#[async_trait]
pub trait AlertDispatcher: Send + Sync {
    async fn notify(&self, alert: &SystemAlert) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn earn_balances_total_spans_lock_states() {
        let balances = EarnBalances {
            flexible: vec![EarnBalance {
                asset: "ETH".to_string(),
                product_id: "ETH001".to_string(),
                total_amount: dec!(1.0),
                free_amount: dec!(1.0),
            }],
            locked: vec![
                EarnBalance {
                    asset: "ETH".to_string(),
                    product_id: "ETH-L90".to_string(),
                    total_amount: dec!(0.5),
                    free_amount: Decimal::ZERO,
                },
                EarnBalance {
                    asset: "SOL".to_string(),
                    product_id: "SOL-L90".to_string(),
                    total_amount: dec!(10),
                    free_amount: Decimal::ZERO,
                },
            ],
        };

        assert_eq!(balances.total_for("ETH"), dec!(1.5));
        assert_eq!(balances.total_for("SOL"), dec!(10));
        assert_eq!(balances.total_for("BTC"), Decimal::ZERO);
        assert_eq!(balances.all().count(), 3);
    }

    #[test]
    fn wire_constants_match_venue_spelling() {
        assert_eq!(OrderSide::Buy.as_str(), "BUY");
        assert_eq!(WalletKind::Spot.as_str(), "MAIN");
        assert_eq!(WalletKind::Earn.as_str(), "EARN");
    }
}
