use chrono::Utc;
use ltv_guard_core::config::{AssetPair, StrategyParams};
use ltv_guard_core::error::CycleError;
use ltv_guard_core::models::{EarnPosition, EarnProductKind, EarnStatus, PortfolioSnapshot};
use ltv_guard_core::traits::{ExchangeGateway, PersistenceStore};
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::settlement::await_settlement;

#[derive(Debug, Clone, Default)]
pub struct HarvestReport {
    /// (asset, product id, amount) cycled through redeem + resubscribe.
    pub harvested: Vec<(String, String, Decimal)>,
    pub failed: usize,
}

/// Detects redeemable flexible yield balances and cycles them through a
/// redeem / settle / resubscribe round trip so accrued rewards start
/// compounding as principal.
pub struct YieldHarvester {
    gateway: Arc<dyn ExchangeGateway>,
    store: Arc<dyn PersistenceStore>,
    pair: AssetPair,
}

impl YieldHarvester {
    #[must_use]
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        store: Arc<dyn PersistenceStore>,
        pair: AssetPair,
    ) -> Self {
        Self {
            gateway,
            store,
            pair,
        }
    }

    /// Harvests every open flexible position in the strategy assets with a
    /// nonzero free amount. Positions are processed independently; one
    /// failure logs and continues to the next. The settlement wait between
    /// redeem and resubscribe protects against resubscribing a balance the
    /// venue has not settled yet.
    ///
    /// # Errors
    /// Returns `CycleError::Gateway` on a fatal gateway failure or `Store`
    /// if recording a harvested position fails.
    pub async fn harvest(
        &self,
        snapshot: &PortfolioSnapshot,
        params: &StrategyParams,
    ) -> Result<HarvestReport, CycleError> {
        let recorded = self.store.earn_positions(snapshot.portfolio_id).await?;
        let mut report = HarvestReport::default();

        for row in &snapshot.earn.flexible {
            if !self.pair.contains(&row.asset) || row.free_amount <= Decimal::ZERO {
                continue;
            }

            if let Err(err) = self
                .gateway
                .redeem_earn(&row.product_id, row.free_amount)
                .await
            {
                if err.is_fatal() {
                    return Err(err.into());
                }
                tracing::warn!(
                    portfolio_id = snapshot.portfolio_id,
                    product_id = %row.product_id,
                    error = %err,
                    "harvest redeem failed, next position continues"
                );
                report.failed += 1;
                continue;
            }

            await_settlement(params.harvest_settle_wait).await;

            if let Err(err) = self
                .gateway
                .subscribe_earn(&row.product_id, row.free_amount)
                .await
            {
                if err.is_fatal() {
                    return Err(err.into());
                }
                tracing::warn!(
                    portfolio_id = snapshot.portfolio_id,
                    product_id = %row.product_id,
                    error = %err,
                    "harvest resubscribe failed, funds stay in spot until next cycle"
                );
                report.failed += 1;
                continue;
            }

            let now = Utc::now();
            let position = recorded
                .iter()
                .find(|position| position.product_id == row.product_id)
                .map_or_else(
                    || EarnPosition {
                        portfolio_id: snapshot.portfolio_id,
                        asset: row.asset.clone(),
                        kind: EarnProductKind::Flexible,
                        product_id: row.product_id.clone(),
                        principal: row.total_amount,
                        current_amount: row.total_amount,
                        rewards_earned: Decimal::ZERO,
                        apr: None,
                        status: EarnStatus::Active,
                        subscribed_at: now,
                        redeemed_at: None,
                    },
                    |position| {
                        let mut refreshed = position.clone();
                        refreshed.rewards_earned +=
                            (row.total_amount - refreshed.current_amount).max(Decimal::ZERO);
                        refreshed.current_amount = row.total_amount;
                        refreshed.status = EarnStatus::Active;
                        refreshed.subscribed_at = now;
                        refreshed
                    },
                );
            self.store.upsert_earn_position(&position).await?;

            tracing::info!(
                portfolio_id = snapshot.portfolio_id,
                asset = %row.asset,
                product_id = %row.product_id,
                amount = %row.free_amount,
                "harvested and reinvested"
            );
            report
                .harvested
                .push((row.asset.clone(), row.product_id.clone(), row.free_amount));
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{pair, params, GatewayCall, MockGateway, MockStore};
    use ltv_guard_core::error::GatewayError;
    use ltv_guard_core::traits::EarnBalances;
    use rust_decimal_macros::dec;

    fn snapshot_with_earn(earn: EarnBalances) -> PortfolioSnapshot {
        PortfolioSnapshot {
            portfolio_id: 1,
            taken_at: Utc::now(),
            assets: Vec::new(),
            loans: Vec::new(),
            earn,
            collateral_value: dec!(10000),
            borrowed_value: dec!(6000),
            ltv: dec!(0.60),
        }
    }

    fn earn_row(asset: &str, product_id: &str, total: Decimal, free: Decimal) -> ltv_guard_core::traits::EarnBalance {
        ltv_guard_core::traits::EarnBalance {
            asset: asset.to_string(),
            product_id: product_id.to_string(),
            total_amount: total,
            free_amount: free,
        }
    }

    #[tokio::test]
    async fn redeems_then_resubscribes_each_free_position() {
        let gateway = Arc::new(MockGateway::new());
        let store = Arc::new(MockStore::default());
        let harvester = YieldHarvester::new(gateway.clone(), store.clone(), pair());

        let earn = EarnBalances {
            flexible: vec![
                earn_row("ETH", "ETH001", dec!(2.0), dec!(2.0)),
                earn_row("SOL", "SOL001", dec!(30), dec!(30)),
            ],
            locked: Vec::new(),
        };
        let report = harvester
            .harvest(&snapshot_with_earn(earn), &params())
            .await
            .unwrap();

        assert_eq!(report.harvested.len(), 2);
        assert_eq!(report.failed, 0);
        assert_eq!(
            gateway.calls(),
            vec![
                GatewayCall::Redeem {
                    product_id: "ETH001".to_string(),
                    amount: dec!(2.0),
                },
                GatewayCall::Subscribe {
                    product_id: "ETH001".to_string(),
                    amount: dec!(2.0),
                },
                GatewayCall::Redeem {
                    product_id: "SOL001".to_string(),
                    amount: dec!(30),
                },
                GatewayCall::Subscribe {
                    product_id: "SOL001".to_string(),
                    amount: dec!(30),
                },
            ]
        );
        assert!(store.earn_position("ETH001").is_some());
    }

    #[tokio::test]
    async fn skips_locked_foreign_and_empty_positions() {
        let gateway = Arc::new(MockGateway::new());
        let store = Arc::new(MockStore::default());
        let harvester = YieldHarvester::new(gateway.clone(), store, pair());

        let earn = EarnBalances {
            flexible: vec![
                earn_row("BTC", "BTC001", dec!(1.0), dec!(1.0)), // not a strategy asset
                earn_row("ETH", "ETH001", dec!(2.0), Decimal::ZERO), // nothing free
            ],
            locked: vec![earn_row("SOL", "SOL-L90", dec!(10), Decimal::ZERO)],
        };
        let report = harvester
            .harvest(&snapshot_with_earn(earn), &params())
            .await
            .unwrap();

        assert!(report.harvested.is_empty());
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn one_position_failure_continues_to_the_next() {
        let gateway = Arc::new(MockGateway::new().fail_redeem("ETH001", || {
            GatewayError::Transient("redeem timeout".to_string())
        }));
        let store = Arc::new(MockStore::default());
        let harvester = YieldHarvester::new(gateway.clone(), store, pair());

        let earn = EarnBalances {
            flexible: vec![
                earn_row("ETH", "ETH001", dec!(2.0), dec!(2.0)),
                earn_row("SOL", "SOL001", dec!(30), dec!(30)),
            ],
            locked: Vec::new(),
        };
        let report = harvester
            .harvest(&snapshot_with_earn(earn), &params())
            .await
            .unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.harvested.len(), 1);
        assert_eq!(report.harvested[0].1, "SOL001");
        // The failed position saw no resubscribe attempt.
        assert_eq!(gateway.subscribes().len(), 1);
    }
}
