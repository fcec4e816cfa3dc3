use chrono::Utc;
use ltv_guard_core::config::{AssetPair, StrategyParams};
use ltv_guard_core::error::CycleError;
use ltv_guard_core::ltv::{additional_borrow_needed, repay_amount, split_borrow_legs, BorrowLeg};
use ltv_guard_core::models::{LoanPosition, LoanStatus, PortfolioSnapshot};
use ltv_guard_core::traits::{ExchangeGateway, PersistenceStore};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Outcome of one leverage adjustment. Each leg is independently failable;
/// the report carries what actually went through.
#[derive(Debug, Clone, Default)]
pub struct AdjustmentReport {
    /// Borrow legs accepted by the venue, with their order ids.
    pub borrowed: Vec<(BorrowLeg, String)>,
    /// Repayments accepted by the venue: (order id, asset, amount).
    pub repaid: Vec<(String, String, Decimal)>,
    /// Loans skipped this cycle because the asset balance could not cover
    /// the repayment; retried next cycle once liquidity is available.
    pub skipped: usize,
    /// Legs the venue or network refused; retried next cycle.
    pub failed: usize,
}

impl AdjustmentReport {
    #[must_use]
    pub fn changed_anything(&self) -> bool {
        !self.borrowed.is_empty() || !self.repaid.is_empty()
    }
}

/// Computes and executes borrow/repay sizing when the risk tier calls for a
/// leverage change.
pub struct LeverageAdjuster {
    gateway: Arc<dyn ExchangeGateway>,
    store: Arc<dyn PersistenceStore>,
    pair: AssetPair,
}

impl LeverageAdjuster {
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

    /// Borrows toward the midpoint of the target band, split 50/50 in USD
    /// value across the two assets.
    ///
    /// A leg failure never blocks or rolls back the other leg. Only fatal
    /// (authentication) failures propagate, since every further venue call
    /// would fail the same way.
    ///
    /// # Errors
    /// Returns `CycleError::Gateway` on a fatal gateway failure or `Store`
    /// if recording an accepted borrow fails.
    pub async fn increase(
        &self,
        snapshot: &PortfolioSnapshot,
        params: &StrategyParams,
    ) -> Result<AdjustmentReport, CycleError> {
        let additional = additional_borrow_needed(
            snapshot.collateral_value,
            snapshot.borrowed_value,
            params.target_ltv(),
        );
        let legs = split_borrow_legs(
            additional,
            &snapshot.assets,
            &self.pair,
            params.min_borrow_amount,
        );

        let mut report = AdjustmentReport::default();
        if legs.is_empty() {
            tracing::debug!(
                portfolio_id = snapshot.portfolio_id,
                %additional,
                "no borrow needed"
            );
            return Ok(report);
        }

        for leg in legs {
            match self
                .gateway
                .borrow(&leg.asset, leg.amount, &leg.collateral_asset)
                .await
            {
                Ok(order_id) => {
                    tracing::info!(
                        portfolio_id = snapshot.portfolio_id,
                        asset = %leg.asset,
                        amount = %leg.amount,
                        collateral = %leg.collateral_asset,
                        %order_id,
                        "borrow leg accepted"
                    );
                    self.store
                        .upsert_loan_position(&LoanPosition {
                            portfolio_id: snapshot.portfolio_id,
                            loan_asset: leg.asset.clone(),
                            collateral_asset: leg.collateral_asset.clone(),
                            principal: leg.amount,
                            outstanding: leg.amount,
                            interest_rate: None,
                            status: LoanStatus::Borrowing,
                            order_id: order_id.clone(),
                            borrowed_at: Utc::now(),
                            repaid_at: None,
                        })
                        .await?;
                    report.borrowed.push((leg, order_id));
                }
                Err(err) if err.is_fatal() => return Err(err.into()),
                Err(err) => {
                    tracing::warn!(
                        portfolio_id = snapshot.portfolio_id,
                        asset = %leg.asset,
                        amount = %leg.amount,
                        error = %err,
                        "borrow leg failed, sibling legs continue"
                    );
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    /// Repays a fraction of every open loan: 20% in normal over-levered
    /// mode, 50% in danger mode.
    ///
    /// A repayment is only sent when the portfolio's observed spot+earn
    /// balance of that asset covers it; otherwise the loan is skipped this
    /// cycle and retried once liquidity is available.
    ///
    /// # Errors
    /// Returns `CycleError::Gateway` on a fatal gateway failure or `Store`
    /// if recording an accepted repayment fails.
    pub async fn decrease(
        &self,
        snapshot: &PortfolioSnapshot,
        params: &StrategyParams,
        aggressive: bool,
    ) -> Result<AdjustmentReport, CycleError> {
        let fraction = if aggressive {
            params.repay_fraction_danger
        } else {
            params.repay_fraction_normal
        };

        let recorded = self.store.loan_positions(snapshot.portfolio_id).await?;
        let mut report = AdjustmentReport::default();

        for loan in snapshot.open_loans() {
            if !self.pair.contains(&loan.loan_asset) {
                continue;
            }
            let amount = repay_amount(loan.outstanding, fraction);
            if amount <= Decimal::ZERO {
                continue;
            }

            let available = snapshot.balance_of(&loan.loan_asset);
            if available < amount {
                tracing::debug!(
                    portfolio_id = snapshot.portfolio_id,
                    order_id = %loan.order_id,
                    asset = %loan.loan_asset,
                    %amount,
                    %available,
                    "repay skipped, balance does not cover it"
                );
                report.skipped += 1;
                continue;
            }

            match self.gateway.repay(&loan.order_id, amount).await {
                Ok(()) => {
                    tracing::info!(
                        portfolio_id = snapshot.portfolio_id,
                        order_id = %loan.order_id,
                        asset = %loan.loan_asset,
                        %amount,
                        aggressive,
                        "loan repayment accepted"
                    );
                    let now = Utc::now();
                    let mut record = recorded
                        .iter()
                        .find(|record| record.order_id == loan.order_id)
                        .cloned()
                        .unwrap_or_else(|| LoanPosition {
                            portfolio_id: snapshot.portfolio_id,
                            loan_asset: loan.loan_asset.clone(),
                            collateral_asset: self.pair.other(&loan.loan_asset).to_string(),
                            principal: loan.outstanding,
                            outstanding: loan.outstanding,
                            interest_rate: None,
                            status: LoanStatus::Borrowing,
                            order_id: loan.order_id.clone(),
                            borrowed_at: now,
                            repaid_at: None,
                        });
                    record.apply_repayment(amount, now);
                    self.store.upsert_loan_position(&record).await?;
                    report
                        .repaid
                        .push((loan.order_id.clone(), loan.loan_asset.clone(), amount));
                }
                Err(err) if err.is_fatal() => return Err(err.into()),
                Err(err) => {
                    tracing::warn!(
                        portfolio_id = snapshot.portfolio_id,
                        order_id = %loan.order_id,
                        error = %err,
                        "repay failed, remaining loans continue"
                    );
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{pair, params, GatewayCall, MockGateway, MockStore};
    use chrono::Utc;
    use ltv_guard_core::error::GatewayError;
    use ltv_guard_core::models::AssetValuation;
    use ltv_guard_core::traits::EarnBalances;
    use rust_decimal_macros::dec;

    fn snapshot(
        collateral_value: Decimal,
        borrowed_value: Decimal,
        eth: (Decimal, Decimal),
        sol: (Decimal, Decimal),
        loans: Vec<(&str, &str, Decimal)>,
    ) -> PortfolioSnapshot {
        let loans = loans
            .into_iter()
            .map(|(order_id, asset, outstanding)| ltv_guard_core::traits::LoanBalance {
                order_id: order_id.to_string(),
                loan_asset: asset.to_string(),
                outstanding,
                status: LoanStatus::Borrowing,
            })
            .collect();
        PortfolioSnapshot {
            portfolio_id: 1,
            taken_at: Utc::now(),
            assets: vec![
                AssetValuation {
                    asset: "ETH".to_string(),
                    spot_amount: eth.0,
                    earn_amount: Decimal::ZERO,
                    price: eth.1,
                },
                AssetValuation {
                    asset: "SOL".to_string(),
                    spot_amount: sol.0,
                    earn_amount: Decimal::ZERO,
                    price: sol.1,
                },
            ],
            loans,
            earn: EarnBalances::default(),
            collateral_value,
            borrowed_value,
            ltv: if collateral_value > Decimal::ZERO {
                borrowed_value / collateral_value
            } else {
                Decimal::ZERO
            },
        }
    }

    #[tokio::test]
    async fn increase_borrows_both_legs_and_records_loans() {
        let gateway = Arc::new(MockGateway::new());
        let store = Arc::new(MockStore::default());
        let adjuster = LeverageAdjuster::new(gateway.clone(), store.clone(), pair());

        // $10k collateral, $3k borrowed, target 0.60 => borrow $3k, $1.5k/leg.
        let snapshot = snapshot(
            dec!(10000),
            dec!(3000),
            (dec!(3), dec!(2000)),
            (dec!(20), dec!(150)),
            vec![],
        );
        let report = adjuster.increase(&snapshot, &params()).await.unwrap();

        assert_eq!(report.borrowed.len(), 2);
        assert_eq!(report.failed, 0);
        let borrows = gateway.borrows();
        assert_eq!(
            borrows[0],
            GatewayCall::Borrow {
                asset: "ETH".to_string(),
                amount: dec!(0.75),
                collateral: "SOL".to_string(),
            }
        );
        assert_eq!(
            borrows[1],
            GatewayCall::Borrow {
                asset: "SOL".to_string(),
                amount: dec!(10),
                collateral: "ETH".to_string(),
            }
        );
        // Accepted borrows are mirrored into the store.
        let (_, order_id) = &report.borrowed[0];
        let recorded = store.loan(order_id).unwrap();
        assert_eq!(recorded.status, LoanStatus::Borrowing);
        assert_eq!(recorded.outstanding, dec!(0.75));
    }

    #[tokio::test]
    async fn increase_is_noop_at_or_above_target() {
        let gateway = Arc::new(MockGateway::new());
        let store = Arc::new(MockStore::default());
        let adjuster = LeverageAdjuster::new(gateway.clone(), store, pair());

        let snapshot = snapshot(
            dec!(10000),
            dec!(6000),
            (dec!(3), dec!(2000)),
            (dec!(20), dec!(150)),
            vec![],
        );
        let report = adjuster.increase(&snapshot, &params()).await.unwrap();

        assert!(!report.changed_anything());
        assert!(gateway.borrows().is_empty());
    }

    #[tokio::test]
    async fn one_failed_leg_does_not_block_the_other() {
        let gateway = Arc::new(
            MockGateway::new().fail_borrow("ETH", || GatewayError::Rejected {
                code: -3045,
                message: "borrow limit reached".to_string(),
            }),
        );
        let store = Arc::new(MockStore::default());
        let adjuster = LeverageAdjuster::new(gateway.clone(), store, pair());

        let snapshot = snapshot(
            dec!(10000),
            dec!(3000),
            (dec!(3), dec!(2000)),
            (dec!(20), dec!(150)),
            vec![],
        );
        let report = adjuster.increase(&snapshot, &params()).await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.borrowed.len(), 1);
        assert!(matches!(
            &report.borrowed[0].0,
            BorrowLeg { asset, .. } if asset == "SOL"
        ));
    }

    #[tokio::test]
    async fn auth_failure_aborts_the_adjustment() {
        let gateway = Arc::new(
            MockGateway::new()
                .fail_borrow("ETH", || GatewayError::Auth("key revoked".to_string())),
        );
        let store = Arc::new(MockStore::default());
        let adjuster = LeverageAdjuster::new(gateway, store, pair());

        let snapshot = snapshot(
            dec!(10000),
            dec!(3000),
            (dec!(3), dec!(2000)),
            (dec!(20), dec!(150)),
            vec![],
        );
        let err = adjuster.increase(&snapshot, &params()).await.unwrap_err();
        assert!(err.is_auth());
    }

    #[tokio::test]
    async fn decrease_repays_fraction_of_each_loan() {
        let gateway = Arc::new(MockGateway::new());
        let store = Arc::new(MockStore::default());
        let adjuster = LeverageAdjuster::new(gateway.clone(), store.clone(), pair());

        let snapshot = snapshot(
            dec!(10000),
            dec!(7200),
            (dec!(3), dec!(2000)),
            (dec!(20), dec!(150)),
            vec![("loan-eth", "ETH", dec!(2.0)), ("loan-sol", "SOL", dec!(8.0))],
        );

        // Danger mode: 50% of each outstanding amount.
        let report = adjuster.decrease(&snapshot, &params(), true).await.unwrap();
        assert_eq!(report.repaid.len(), 2);
        assert_eq!(report.skipped, 0);
        assert_eq!(
            gateway.repays(),
            vec![
                GatewayCall::Repay {
                    order_id: "loan-eth".to_string(),
                    amount: dec!(1.0),
                },
                GatewayCall::Repay {
                    order_id: "loan-sol".to_string(),
                    amount: dec!(4.0),
                },
            ]
        );
        let recorded = store.loan("loan-eth").unwrap();
        assert_eq!(recorded.outstanding, dec!(1.0));
        assert_eq!(recorded.status, LoanStatus::Borrowing);
    }

    #[tokio::test]
    async fn decrease_uses_normal_fraction_outside_danger() {
        let gateway = Arc::new(MockGateway::new());
        let store = Arc::new(MockStore::default());
        let adjuster = LeverageAdjuster::new(gateway.clone(), store, pair());

        let snapshot = snapshot(
            dec!(10000),
            dec!(6700),
            (dec!(3), dec!(2000)),
            (dec!(20), dec!(150)),
            vec![("loan-eth", "ETH", dec!(2.0))],
        );
        adjuster
            .decrease(&snapshot, &params(), false)
            .await
            .unwrap();
        assert_eq!(
            gateway.repays(),
            vec![GatewayCall::Repay {
                order_id: "loan-eth".to_string(),
                amount: dec!(0.4),
            }]
        );
    }

    #[tokio::test]
    async fn decrease_never_exceeds_known_balance() {
        let gateway = Arc::new(MockGateway::new());
        let store = Arc::new(MockStore::default());
        let adjuster = LeverageAdjuster::new(gateway.clone(), store, pair());

        // Only 0.3 ETH held, repayment of 1.0 ETH would be required.
        let snapshot = snapshot(
            dec!(10000),
            dec!(7200),
            (dec!(0.3), dec!(2000)),
            (dec!(20), dec!(150)),
            vec![("loan-eth", "ETH", dec!(2.0))],
        );
        let report = adjuster.decrease(&snapshot, &params(), true).await.unwrap();

        assert_eq!(report.skipped, 1);
        assert!(report.repaid.is_empty());
        assert!(gateway.repays().is_empty());
    }

    #[tokio::test]
    async fn one_failed_repay_does_not_block_the_rest() {
        let gateway = Arc::new(MockGateway::new().fail_repay("loan-eth", || {
            GatewayError::Transient("timeout".to_string())
        }));
        let store = Arc::new(MockStore::default());
        let adjuster = LeverageAdjuster::new(gateway.clone(), store, pair());

        let snapshot = snapshot(
            dec!(10000),
            dec!(7200),
            (dec!(3), dec!(2000)),
            (dec!(20), dec!(150)),
            vec![("loan-eth", "ETH", dec!(2.0)), ("loan-sol", "SOL", dec!(8.0))],
        );
        let report = adjuster.decrease(&snapshot, &params(), true).await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.repaid.len(), 1);
        assert_eq!(report.repaid[0].0, "loan-sol");
    }
}
