//! In-memory gateway/store/dispatcher fakes shared by the component tests.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use ltv_guard_core::config::{AssetPair, AutomationConfig, StrategyConfig, StrategyParams};
use ltv_guard_core::error::GatewayError;
use ltv_guard_core::models::{
    EarnPosition, LoanPosition, LoanStatus, Portfolio, PortfolioStatus, SystemAlert, Transaction,
};
use ltv_guard_core::traits::{
    AccountInfo, AlertDispatcher, EarnBalance, EarnBalances, ExchangeGateway, LoanBalance,
    OrderSide, PersistenceStore, SpotBalance, WalletKind,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;

pub(crate) fn pair() -> AssetPair {
    AssetPair {
        first: "ETH".to_string(),
        second: "SOL".to_string(),
        quote: "USDT".to_string(),
    }
}

/// Default thresholds with settlement waits zeroed so tests run instantly.
pub(crate) fn params() -> StrategyParams {
    let strategy = StrategyConfig {
        asset_a: "ETH".to_string(),
        asset_b: "SOL".to_string(),
        quote: "USDT".to_string(),
        target_ltv_min: 0.55,
        target_ltv_max: 0.65,
        danger_ltv: 0.70,
        emergency_ltv: 0.75,
        min_borrow_amount: 0.001,
        repay_fraction_normal: 0.20,
        repay_fraction_danger: 0.50,
        harvest_settle_wait_secs: 0,
        liquidation_settle_wait_secs: 0,
        flexible_products: HashMap::new(),
    };
    let automation = AutomationConfig {
        tick_interval_secs: 300,
        cycle_deadline_secs: 120,
    };
    StrategyParams::from_config(&strategy, &automation).unwrap()
}

pub(crate) fn portfolio(id: i64) -> Portfolio {
    let now = Utc::now();
    Portfolio {
        id,
        owner_id: 7,
        asset_a: "ETH".to_string(),
        asset_b: "SOL".to_string(),
        balance_a: Decimal::ZERO,
        balance_b: Decimal::ZERO,
        price_a: Decimal::ZERO,
        price_b: Decimal::ZERO,
        total_value: Decimal::ZERO,
        current_ltv: Decimal::ZERO,
        target_ltv_min: Decimal::new(55, 2),
        target_ltv_max: Decimal::new(65, 2),
        auto_rebalance: true,
        status: PortfolioStatus::Active,
        created_at: now,
        last_updated: now,
        last_rebalance: None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum GatewayCall {
    Borrow {
        asset: String,
        amount: Decimal,
        collateral: String,
    },
    Repay {
        order_id: String,
        amount: Decimal,
    },
    Redeem {
        product_id: String,
        amount: Decimal,
    },
    Subscribe {
        product_id: String,
        amount: Decimal,
    },
    Order {
        symbol: String,
        side: OrderSide,
        quote_amount: Decimal,
    },
    Transfer {
        asset: String,
        amount: Decimal,
        from: WalletKind,
        to: WalletKind,
    },
}

type FailureFactory = Box<dyn Fn() -> GatewayError + Send + Sync>;

#[derive(Default)]
struct GatewayState {
    spot: Vec<SpotBalance>,
    earn: EarnBalances,
    loans: Vec<LoanBalance>,
    prices: HashMap<String, Decimal>,
    calls: Vec<GatewayCall>,
    next_order_id: u64,
}

#[derive(Default)]
pub(crate) struct MockGateway {
    state: Mutex<GatewayState>,
    fail_prices: Option<FailureFactory>,
    borrow_failures: HashMap<String, FailureFactory>,
    repay_failures: HashMap<String, FailureFactory>,
    redeem_failures: HashMap<String, FailureFactory>,
}

impl MockGateway {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_spot(self, asset: &str, free: Decimal, locked: Decimal) -> Self {
        self.state.lock().unwrap().spot.push(SpotBalance {
            asset: asset.to_string(),
            free,
            locked,
        });
        self
    }

    pub(crate) fn with_flexible(
        self,
        asset: &str,
        product_id: &str,
        total: Decimal,
        free: Decimal,
    ) -> Self {
        self.state.lock().unwrap().earn.flexible.push(EarnBalance {
            asset: asset.to_string(),
            product_id: product_id.to_string(),
            total_amount: total,
            free_amount: free,
        });
        self
    }

    pub(crate) fn with_locked(self, asset: &str, product_id: &str, total: Decimal) -> Self {
        self.state.lock().unwrap().earn.locked.push(EarnBalance {
            asset: asset.to_string(),
            product_id: product_id.to_string(),
            total_amount: total,
            free_amount: Decimal::ZERO,
        });
        self
    }

    pub(crate) fn with_price(self, symbol: &str, price: Decimal) -> Self {
        self.state
            .lock()
            .unwrap()
            .prices
            .insert(symbol.to_string(), price);
        self
    }

    pub(crate) fn with_loan(self, order_id: &str, asset: &str, outstanding: Decimal) -> Self {
        self.state.lock().unwrap().loans.push(LoanBalance {
            order_id: order_id.to_string(),
            loan_asset: asset.to_string(),
            outstanding,
            status: LoanStatus::Borrowing,
        });
        self
    }

    pub(crate) fn fail_prices_with(
        mut self,
        factory: impl Fn() -> GatewayError + Send + Sync + 'static,
    ) -> Self {
        self.fail_prices = Some(Box::new(factory));
        self
    }

    pub(crate) fn fail_borrow(
        mut self,
        asset: &str,
        factory: impl Fn() -> GatewayError + Send + Sync + 'static,
    ) -> Self {
        self.borrow_failures
            .insert(asset.to_string(), Box::new(factory));
        self
    }

    pub(crate) fn fail_repay(
        mut self,
        order_id: &str,
        factory: impl Fn() -> GatewayError + Send + Sync + 'static,
    ) -> Self {
        self.repay_failures
            .insert(order_id.to_string(), Box::new(factory));
        self
    }

    pub(crate) fn fail_redeem(
        mut self,
        product_id: &str,
        factory: impl Fn() -> GatewayError + Send + Sync + 'static,
    ) -> Self {
        self.redeem_failures
            .insert(product_id.to_string(), Box::new(factory));
        self
    }

    pub(crate) fn calls(&self) -> Vec<GatewayCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub(crate) fn borrows(&self) -> Vec<GatewayCall> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, GatewayCall::Borrow { .. }))
            .collect()
    }

    pub(crate) fn repays(&self) -> Vec<GatewayCall> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, GatewayCall::Repay { .. }))
            .collect()
    }

    pub(crate) fn redeems(&self) -> Vec<GatewayCall> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, GatewayCall::Redeem { .. }))
            .collect()
    }

    pub(crate) fn subscribes(&self) -> Vec<GatewayCall> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, GatewayCall::Subscribe { .. }))
            .collect()
    }
}

#[async_trait]
impl ExchangeGateway for MockGateway {
    async fn account_info(&self) -> Result<AccountInfo, GatewayError> {
        Ok(AccountInfo {
            can_trade: true,
            balances: self.state.lock().unwrap().spot.clone(),
        })
    }

    async fn spot_balances(&self) -> Result<Vec<SpotBalance>, GatewayError> {
        Ok(self.state.lock().unwrap().spot.clone())
    }

    async fn earn_balances(&self) -> Result<EarnBalances, GatewayError> {
        Ok(self.state.lock().unwrap().earn.clone())
    }

    async fn loan_positions(&self) -> Result<Vec<LoanBalance>, GatewayError> {
        Ok(self.state.lock().unwrap().loans.clone())
    }

    async fn price(&self, symbol: &str) -> Result<Decimal, GatewayError> {
        if let Some(factory) = &self.fail_prices {
            return Err(factory());
        }
        self.state
            .lock()
            .unwrap()
            .prices
            .get(symbol)
            .copied()
            .ok_or_else(|| GatewayError::Rejected {
                code: -1121,
                message: format!("unknown symbol {symbol}"),
            })
    }

    async fn place_spot_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quote_amount: Decimal,
    ) -> Result<String, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(GatewayCall::Order {
            symbol: symbol.to_string(),
            side,
            quote_amount,
        });
        state.next_order_id += 1;
        Ok(format!("order-{}", state.next_order_id))
    }

    async fn borrow(
        &self,
        asset: &str,
        amount: Decimal,
        collateral_asset: &str,
    ) -> Result<String, GatewayError> {
        if let Some(factory) = self.borrow_failures.get(asset) {
            return Err(factory());
        }
        let mut state = self.state.lock().unwrap();
        state.calls.push(GatewayCall::Borrow {
            asset: asset.to_string(),
            amount,
            collateral: collateral_asset.to_string(),
        });
        state.next_order_id += 1;
        Ok(format!("loan-{}", state.next_order_id))
    }

    async fn repay(&self, order_id: &str, amount: Decimal) -> Result<(), GatewayError> {
        if let Some(factory) = self.repay_failures.get(order_id) {
            return Err(factory());
        }
        self.state.lock().unwrap().calls.push(GatewayCall::Repay {
            order_id: order_id.to_string(),
            amount,
        });
        Ok(())
    }

    async fn subscribe_earn(
        &self,
        product_id: &str,
        amount: Decimal,
    ) -> Result<(), GatewayError> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(GatewayCall::Subscribe {
                product_id: product_id.to_string(),
                amount,
            });
        Ok(())
    }

    async fn redeem_earn(&self, product_id: &str, amount: Decimal) -> Result<(), GatewayError> {
        if let Some(factory) = self.redeem_failures.get(product_id) {
            return Err(factory());
        }
        self.state.lock().unwrap().calls.push(GatewayCall::Redeem {
            product_id: product_id.to_string(),
            amount,
        });
        Ok(())
    }

    async fn transfer(
        &self,
        asset: &str,
        amount: Decimal,
        from: WalletKind,
        to: WalletKind,
    ) -> Result<(), GatewayError> {
        self.state.lock().unwrap().calls.push(GatewayCall::Transfer {
            asset: asset.to_string(),
            amount,
            from,
            to,
        });
        Ok(())
    }
}

#[derive(Default)]
struct StoreState {
    portfolios: HashMap<i64, Portfolio>,
    saves: usize,
    transactions: Vec<Transaction>,
    alerts: Vec<SystemAlert>,
    loans: HashMap<String, LoanPosition>,
    earn: HashMap<String, EarnPosition>,
}

#[derive(Default)]
pub(crate) struct MockStore {
    inner: Mutex<StoreState>,
}

impl MockStore {
    pub(crate) fn with_portfolio(self, portfolio: Portfolio) -> Self {
        self.inner
            .lock()
            .unwrap()
            .portfolios
            .insert(portfolio.id, portfolio);
        self
    }

    pub(crate) fn transactions(&self) -> Vec<Transaction> {
        self.inner.lock().unwrap().transactions.clone()
    }

    pub(crate) fn alerts(&self) -> Vec<SystemAlert> {
        self.inner.lock().unwrap().alerts.clone()
    }

    pub(crate) fn saved_portfolios(&self) -> usize {
        self.inner.lock().unwrap().saves
    }

    pub(crate) fn portfolio(&self, id: i64) -> Option<Portfolio> {
        self.inner.lock().unwrap().portfolios.get(&id).cloned()
    }

    pub(crate) fn loan(&self, order_id: &str) -> Option<LoanPosition> {
        self.inner.lock().unwrap().loans.get(order_id).cloned()
    }

    pub(crate) fn earn_position(&self, product_id: &str) -> Option<EarnPosition> {
        self.inner.lock().unwrap().earn.get(product_id).cloned()
    }
}

#[async_trait]
impl PersistenceStore for MockStore {
    async fn load_active_portfolios(&self) -> Result<Vec<Portfolio>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .portfolios
            .values()
            .filter(|portfolio| portfolio.status.is_automated())
            .cloned()
            .collect())
    }

    async fn load_portfolio(&self, id: i64) -> Result<Option<Portfolio>> {
        Ok(self.inner.lock().unwrap().portfolios.get(&id).cloned())
    }

    async fn create_portfolio(&self, portfolio: &Portfolio) -> Result<i64> {
        let mut state = self.inner.lock().unwrap();
        let id = state.portfolios.keys().max().copied().unwrap_or(0) + 1;
        let mut created = portfolio.clone();
        created.id = id;
        state.portfolios.insert(id, created);
        Ok(id)
    }

    async fn save_portfolio(&self, portfolio: &Portfolio) -> Result<()> {
        let mut state = self.inner.lock().unwrap();
        state.portfolios.insert(portfolio.id, portfolio.clone());
        state.saves += 1;
        Ok(())
    }

    async fn append_transaction(&self, transaction: &Transaction) -> Result<i64> {
        let mut state = self.inner.lock().unwrap();
        state.transactions.push(transaction.clone());
        Ok(state.transactions.len() as i64)
    }

    async fn append_alert(&self, alert: &SystemAlert) -> Result<i64> {
        let mut state = self.inner.lock().unwrap();
        state.alerts.push(alert.clone());
        Ok(state.alerts.len() as i64)
    }

    async fn loan_positions(&self, portfolio_id: i64) -> Result<Vec<LoanPosition>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .loans
            .values()
            .filter(|loan| loan.portfolio_id == portfolio_id)
            .cloned()
            .collect())
    }

    async fn earn_positions(&self, portfolio_id: i64) -> Result<Vec<EarnPosition>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .earn
            .values()
            .filter(|position| position.portfolio_id == portfolio_id)
            .cloned()
            .collect())
    }

    async fn upsert_loan_position(&self, loan: &LoanPosition) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .loans
            .insert(loan.order_id.clone(), loan.clone());
        Ok(())
    }

    async fn upsert_earn_position(&self, position: &EarnPosition) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .earn
            .insert(position.product_id.clone(), position.clone());
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct MockAlerts {
    sent: Mutex<Vec<SystemAlert>>,
    failing: bool,
}

impl MockAlerts {
    pub(crate) fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    pub(crate) fn sent(&self) -> Vec<SystemAlert> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertDispatcher for MockAlerts {
    async fn notify(&self, alert: &SystemAlert) -> Result<()> {
        if self.failing {
            anyhow::bail!("notification channel down");
        }
        self.sent.lock().unwrap().push(alert.clone());
        Ok(())
    }
}
