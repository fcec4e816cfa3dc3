use chrono::Utc;
use ltv_guard_core::config::{AssetPair, StrategyConfig, StrategyParams};
use ltv_guard_core::error::CycleError;
use ltv_guard_core::models::{
    EarnPosition, EarnProductKind, EarnStatus, Portfolio, PortfolioStatus, Transaction,
    TransactionKind,
};
use ltv_guard_core::traits::{ExchangeGateway, OrderSide, PersistenceStore, WalletKind};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

use crate::settlement::await_settlement;

#[derive(Debug, Clone)]
pub struct InitializationOutcome {
    pub portfolio_id: i64,
    /// (asset, amount bought) per strategy asset.
    pub amounts: Vec<(String, Decimal)>,
    pub total_value: Decimal,
}

/// Sets up a fresh portfolio: splits the initial capital 50/50 between the
/// two strategy assets, buys spot, moves the proceeds to the earn wallet,
/// and subscribes the configured flexible products.
pub struct PortfolioInitializer {
    gateway: Arc<dyn ExchangeGateway>,
    store: Arc<dyn PersistenceStore>,
    pair: AssetPair,
    flexible_products: HashMap<String, String>,
}

impl PortfolioInitializer {
    #[must_use]
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        store: Arc<dyn PersistenceStore>,
        config: &StrategyConfig,
    ) -> Self {
        Self {
            gateway,
            store,
            pair: AssetPair::from_config(config),
            flexible_products: config.flexible_products.clone(),
        }
    }

    /// Buys into the strategy and persists the new portfolio plus its
    /// `Initialization` ledger entry. The earn wallet transfer and product
    /// subscription are best-effort: capital that cannot be parked in earn
    /// stays in spot and still counts as collateral.
    ///
    /// # Errors
    /// Returns `Validation` for a non-positive capital or unusable price,
    /// `Gateway` if a spot buy fails, `Store` if persisting the portfolio
    /// fails.
    pub async fn initialize(
        &self,
        owner_id: i64,
        capital_usd: Decimal,
        params: &StrategyParams,
    ) -> Result<InitializationOutcome, CycleError> {
        if capital_usd <= Decimal::ZERO {
            return Err(CycleError::Validation(format!(
                "initial capital must be positive, got {capital_usd}"
            )));
        }

        let per_asset_usd = capital_usd / Decimal::TWO;
        let mut amounts = Vec::with_capacity(2);
        let mut prices = Vec::with_capacity(2);

        for asset in self.pair.assets() {
            let symbol = self.pair.symbol(asset);
            let price = self.gateway.price(&symbol).await?;
            if price <= Decimal::ZERO {
                return Err(CycleError::Validation(format!(
                    "no usable price for {asset}: {price}"
                )));
            }
            let order_id = self
                .gateway
                .place_spot_order(&symbol, OrderSide::Buy, per_asset_usd)
                .await?;
            let amount = per_asset_usd / price;
            tracing::info!(
                owner_id,
                asset,
                %amount,
                %per_asset_usd,
                %order_id,
                "initial spot buy placed"
            );
            amounts.push((asset.to_string(), amount));
            prices.push(price);
        }

        // Let the buys settle before moving the proceeds off the spot wallet.
        await_settlement(params.harvest_settle_wait).await;

        let now = Utc::now();
        let mut portfolio = Portfolio {
            id: 0,
            owner_id,
            asset_a: self.pair.first.clone(),
            asset_b: self.pair.second.clone(),
            balance_a: amounts[0].1,
            balance_b: amounts[1].1,
            price_a: prices[0],
            price_b: prices[1],
            total_value: capital_usd,
            current_ltv: Decimal::ZERO,
            target_ltv_min: params.ltv_min,
            target_ltv_max: params.ltv_max,
            auto_rebalance: true,
            status: PortfolioStatus::Active,
            created_at: now,
            last_updated: now,
            last_rebalance: None,
        };
        portfolio.id = self.store.create_portfolio(&portfolio).await?;

        for (asset, amount) in &amounts {
            if let Err(err) = self
                .gateway
                .transfer(asset, *amount, WalletKind::Spot, WalletKind::Earn)
                .await
            {
                tracing::warn!(
                    portfolio_id = portfolio.id,
                    asset,
                    error = %err,
                    "earn transfer failed, capital stays in spot"
                );
                continue;
            }
            let Some(product_id) = self.flexible_products.get(asset) else {
                tracing::warn!(
                    portfolio_id = portfolio.id,
                    asset,
                    "no flexible product configured, capital stays unsubscribed"
                );
                continue;
            };
            match self.gateway.subscribe_earn(product_id, *amount).await {
                Ok(()) => {
                    self.store
                        .upsert_earn_position(&EarnPosition {
                            portfolio_id: portfolio.id,
                            asset: asset.clone(),
                            kind: EarnProductKind::Flexible,
                            product_id: product_id.clone(),
                            principal: *amount,
                            current_amount: *amount,
                            rewards_earned: Decimal::ZERO,
                            apr: None,
                            status: EarnStatus::Active,
                            subscribed_at: Utc::now(),
                            redeemed_at: None,
                        })
                        .await?;
                }
                Err(err) => {
                    tracing::warn!(
                        portfolio_id = portfolio.id,
                        asset,
                        product_id,
                        error = %err,
                        "earn subscription failed, capital stays in earn wallet"
                    );
                }
            }
        }

        self.store
            .append_transaction(&Transaction {
                portfolio_id: portfolio.id,
                kind: TransactionKind::Initialization,
                description: format!("portfolio initialized with {capital_usd} USD"),
                amount_a: portfolio.balance_a,
                amount_b: portfolio.balance_b,
                ltv_ratio: Decimal::ZERO,
                total_value: capital_usd,
                timestamp: Utc::now(),
            })
            .await?;

        Ok(InitializationOutcome {
            portfolio_id: portfolio.id,
            amounts,
            total_value: capital_usd,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{params, GatewayCall, MockGateway, MockStore};
    use rust_decimal_macros::dec;

    fn config_with_products() -> StrategyConfig {
        StrategyConfig {
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
            flexible_products: HashMap::from([
                ("ETH".to_string(), "ETH001".to_string()),
                ("SOL".to_string(), "SOL001".to_string()),
            ]),
        }
    }

    #[tokio::test]
    async fn splits_capital_buys_and_subscribes() {
        let gateway = Arc::new(
            MockGateway::new()
                .with_price("ETHUSDT", dec!(2000))
                .with_price("SOLUSDT", dec!(100)),
        );
        let store = Arc::new(MockStore::default());
        let initializer =
            PortfolioInitializer::new(gateway.clone(), store.clone(), &config_with_products());

        let outcome = initializer
            .initialize(7, dec!(10000), &params())
            .await
            .unwrap();

        assert_eq!(outcome.total_value, dec!(10000));
        assert_eq!(outcome.amounts[0], ("ETH".to_string(), dec!(2.5)));
        assert_eq!(outcome.amounts[1], ("SOL".to_string(), dec!(50)));

        let calls = gateway.calls();
        assert!(calls.contains(&GatewayCall::Order {
            symbol: "ETHUSDT".to_string(),
            side: OrderSide::Buy,
            quote_amount: dec!(5000),
        }));
        assert!(calls.contains(&GatewayCall::Transfer {
            asset: "SOL".to_string(),
            amount: dec!(50),
            from: WalletKind::Spot,
            to: WalletKind::Earn,
        }));
        assert!(calls.contains(&GatewayCall::Subscribe {
            product_id: "SOL001".to_string(),
            amount: dec!(50),
        }));

        let created = store.portfolio(outcome.portfolio_id).unwrap();
        assert_eq!(created.status, PortfolioStatus::Active);
        assert_eq!(created.current_ltv, Decimal::ZERO);
        assert_eq!(created.balance_a, dec!(2.5));

        let transactions = store.transactions();
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].kind, TransactionKind::Initialization);
        assert!(store.earn_position("ETH001").is_some());
    }

    #[tokio::test]
    async fn rejects_non_positive_capital() {
        let gateway = Arc::new(MockGateway::new());
        let store = Arc::new(MockStore::default());
        let initializer =
            PortfolioInitializer::new(gateway.clone(), store, &config_with_products());

        let err = initializer
            .initialize(7, Decimal::ZERO, &params())
            .await
            .unwrap_err();
        assert!(matches!(err, CycleError::Validation(_)));
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_product_leaves_capital_in_earn_wallet() {
        let mut config = config_with_products();
        config.flexible_products.remove("SOL");
        let gateway = Arc::new(
            MockGateway::new()
                .with_price("ETHUSDT", dec!(2000))
                .with_price("SOLUSDT", dec!(100)),
        );
        let store = Arc::new(MockStore::default());
        let initializer = PortfolioInitializer::new(gateway.clone(), store.clone(), &config);

        initializer.initialize(7, dec!(10000), &params()).await.unwrap();

        assert_eq!(gateway.subscribes().len(), 1);
        assert!(store.earn_position("SOL001").is_none());
    }
}
