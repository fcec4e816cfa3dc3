use chrono::Utc;
use ltv_guard_core::config::{AssetPair, StrategyParams};
use ltv_guard_core::error::CycleError;
use ltv_guard_core::models::{
    AlertSeverity, EarnStatus, LoanStatus, Portfolio, PortfolioSnapshot, PortfolioStatus,
    SystemAlert, Transaction, TransactionKind,
};
use ltv_guard_core::traits::{AlertDispatcher, ExchangeGateway, LoanBalance, PersistenceStore};
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::settlement::await_settlement;

#[derive(Debug, Clone, Default)]
pub struct LiquidationReport {
    /// (product id, amount) redemptions accepted by the venue.
    pub redeemed: Vec<(String, Decimal)>,
    /// (order id, amount) full repayments accepted by the venue.
    pub repaid: Vec<(String, Decimal)>,
    /// Step-level failures, in execution order.
    pub errors: Vec<String>,
}

/// Emergency unwind: redeem every yield position, wait for settlement, repay
/// every open loan in full, freeze the portfolio.
///
/// Best-effort and without rollback. The portfolio is frozen (`Emergency`)
/// before the first venue call so no new automation cycle is admitted while
/// the unwind runs; the CycleDriver's per-portfolio guard keeps the repay
/// step from ever running twice concurrently.
pub struct LiquidationExecutor {
    gateway: Arc<dyn ExchangeGateway>,
    store: Arc<dyn PersistenceStore>,
    alerts: Arc<dyn AlertDispatcher>,
    pair: AssetPair,
}

impl LiquidationExecutor {
    #[must_use]
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        store: Arc<dyn PersistenceStore>,
        alerts: Arc<dyn AlertDispatcher>,
        pair: AssetPair,
    ) -> Self {
        Self {
            gateway,
            store,
            alerts,
            pair,
        }
    }

    /// Runs the unwind sequence and appends the critical transaction and
    /// alert afterwards, whether the sequence completed cleanly or not.
    ///
    /// # Errors
    /// Returns `CycleError::Liquidation` when any step failed; the portfolio
    /// stays in `Emergency` for manual operator intervention and is never
    /// retried silently.
    pub async fn execute(
        &self,
        portfolio: &mut Portfolio,
        snapshot: &PortfolioSnapshot,
        params: &StrategyParams,
    ) -> Result<LiquidationReport, CycleError> {
        tracing::error!(
            portfolio_id = portfolio.id,
            ltv = %snapshot.ltv,
            "emergency liquidation triggered"
        );

        // Freeze before touching the venue.
        portfolio.status = PortfolioStatus::Emergency;
        self.store.save_portfolio(portfolio).await?;

        let mut report = LiquidationReport::default();

        for row in snapshot.earn.all() {
            if !self.pair.contains(&row.asset) || row.total_amount <= Decimal::ZERO {
                continue;
            }
            match self
                .gateway
                .redeem_earn(&row.product_id, row.total_amount)
                .await
            {
                Ok(()) => {
                    report
                        .redeemed
                        .push((row.product_id.clone(), row.total_amount));
                    self.mark_earn_redeemed(portfolio.id, &row.product_id).await;
                }
                Err(err) => {
                    tracing::error!(
                        portfolio_id = portfolio.id,
                        product_id = %row.product_id,
                        error = %err,
                        "liquidation redeem failed"
                    );
                    report
                        .errors
                        .push(format!("redeem {}: {err}", row.product_id));
                }
            }
        }

        await_settlement(params.liquidation_settle_wait).await;

        // Re-read loan state so repayments use current outstanding amounts;
        // fall back to the snapshot if the venue read fails mid-unwind.
        let loans = match self.gateway.loan_positions().await {
            Ok(loans) => loans,
            Err(err) => {
                tracing::warn!(
                    portfolio_id = portfolio.id,
                    error = %err,
                    "loan re-read failed during liquidation, using snapshot state"
                );
                snapshot.loans.clone()
            }
        };

        for loan in loans
            .iter()
            .filter(|loan| loan.status == LoanStatus::Borrowing)
        {
            match self.gateway.repay(&loan.order_id, loan.outstanding).await {
                Ok(()) => {
                    report.repaid.push((loan.order_id.clone(), loan.outstanding));
                    self.mark_loan_liquidated(portfolio.id, loan).await;
                }
                Err(err) => {
                    tracing::error!(
                        portfolio_id = portfolio.id,
                        order_id = %loan.order_id,
                        error = %err,
                        "liquidation repay failed"
                    );
                    report.errors.push(format!("repay {}: {err}", loan.order_id));
                }
            }
        }

        let description = if report.errors.is_empty() {
            format!(
                "full liquidation at LTV {:.4}: {} redemptions, {} repayments",
                snapshot.ltv,
                report.redeemed.len(),
                report.repaid.len()
            )
        } else {
            format!(
                "liquidation at LTV {:.4} incomplete: {} redemptions, {} repayments, {} failures",
                snapshot.ltv,
                report.redeemed.len(),
                report.repaid.len(),
                report.errors.len()
            )
        };

        self.store
            .append_transaction(&Transaction {
                portfolio_id: portfolio.id,
                kind: TransactionKind::EmergencyLiquidation,
                description: description.clone(),
                amount_a: snapshot.balance_of(&portfolio.asset_a),
                amount_b: snapshot.balance_of(&portfolio.asset_b),
                ltv_ratio: snapshot.ltv,
                total_value: snapshot.collateral_value,
                timestamp: Utc::now(),
            })
            .await?;

        let alert = SystemAlert {
            owner_id: Some(portfolio.owner_id),
            kind: "liquidation".to_string(),
            severity: AlertSeverity::Critical,
            title: format!("EMERGENCY LIQUIDATION - LTV {:.2}%", snapshot.ltv * Decimal::ONE_HUNDRED),
            message: description,
            created_at: Utc::now(),
        };
        if let Err(err) = self.alerts.notify(&alert).await {
            tracing::warn!(
                portfolio_id = portfolio.id,
                error = %err,
                "liquidation alert delivery failed"
            );
        }

        if report.errors.is_empty() {
            Ok(report)
        } else {
            Err(CycleError::Liquidation(report.errors.join("; ")))
        }
    }

    async fn mark_earn_redeemed(&self, portfolio_id: i64, product_id: &str) {
        let positions = match self.store.earn_positions(portfolio_id).await {
            Ok(positions) => positions,
            Err(err) => {
                tracing::warn!(portfolio_id, error = %err, "earn rows unavailable");
                return;
            }
        };
        if let Some(position) = positions
            .iter()
            .find(|position| position.product_id == product_id)
        {
            let mut redeemed = position.clone();
            redeemed.status = EarnStatus::Redeemed;
            redeemed.redeemed_at = Some(Utc::now());
            if let Err(err) = self.store.upsert_earn_position(&redeemed).await {
                tracing::warn!(portfolio_id, error = %err, "earn row update failed");
            }
        }
    }

    async fn mark_loan_liquidated(&self, portfolio_id: i64, loan: &LoanBalance) {
        let recorded = match self.store.loan_positions(portfolio_id).await {
            Ok(loans) => loans,
            Err(err) => {
                tracing::warn!(portfolio_id, error = %err, "loan rows unavailable");
                return;
            }
        };
        let mut record = recorded
            .iter()
            .find(|record| record.order_id == loan.order_id)
            .cloned()
            .unwrap_or_else(|| ltv_guard_core::models::LoanPosition {
                portfolio_id,
                loan_asset: loan.loan_asset.clone(),
                collateral_asset: self.pair.other(&loan.loan_asset).to_string(),
                principal: loan.outstanding,
                outstanding: loan.outstanding,
                interest_rate: None,
                status: LoanStatus::Borrowing,
                order_id: loan.order_id.clone(),
                borrowed_at: Utc::now(),
                repaid_at: None,
            });
        record.outstanding = Decimal::ZERO;
        record.status = LoanStatus::Liquidated;
        record.repaid_at = Some(Utc::now());
        if let Err(err) = self.store.upsert_loan_position(&record).await {
            tracing::warn!(portfolio_id, error = %err, "loan row update failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{pair, params, portfolio, GatewayCall, MockAlerts, MockGateway, MockStore};
    use ltv_guard_core::error::GatewayError;
    use ltv_guard_core::models::AssetValuation;
    use ltv_guard_core::traits::{EarnBalance, EarnBalances};
    use rust_decimal_macros::dec;

    fn emergency_snapshot() -> PortfolioSnapshot {
        PortfolioSnapshot {
            portfolio_id: 1,
            taken_at: Utc::now(),
            assets: vec![
                AssetValuation {
                    asset: "ETH".to_string(),
                    spot_amount: dec!(1),
                    earn_amount: dec!(2),
                    price: dec!(2000),
                },
                AssetValuation {
                    asset: "SOL".to_string(),
                    spot_amount: dec!(5),
                    earn_amount: dec!(20),
                    price: dec!(160),
                },
            ],
            loans: vec![
                ltv_guard_core::traits::LoanBalance {
                    order_id: "loan-eth".to_string(),
                    loan_asset: "ETH".to_string(),
                    outstanding: dec!(3.0),
                    status: LoanStatus::Borrowing,
                },
                ltv_guard_core::traits::LoanBalance {
                    order_id: "loan-sol".to_string(),
                    loan_asset: "SOL".to_string(),
                    outstanding: dec!(9.75),
                    status: LoanStatus::Borrowing,
                },
            ],
            earn: EarnBalances {
                flexible: vec![EarnBalance {
                    asset: "ETH".to_string(),
                    product_id: "ETH001".to_string(),
                    total_amount: dec!(2),
                    free_amount: dec!(2),
                }],
                locked: vec![EarnBalance {
                    asset: "SOL".to_string(),
                    product_id: "SOL-L90".to_string(),
                    total_amount: dec!(20),
                    free_amount: Decimal::ZERO,
                }],
            },
            collateral_value: dec!(10000),
            borrowed_value: dec!(7800),
            ltv: dec!(0.78),
        }
    }

    #[tokio::test]
    async fn full_unwind_freezes_then_redeems_then_repays() {
        let gateway = Arc::new(
            MockGateway::new()
                .with_loan("loan-eth", "ETH", dec!(3.0))
                .with_loan("loan-sol", "SOL", dec!(9.75)),
        );
        let store = Arc::new(MockStore::default());
        let alerts = Arc::new(MockAlerts::default());
        let executor =
            LiquidationExecutor::new(gateway.clone(), store.clone(), alerts.clone(), pair());

        let mut target = portfolio(1);
        let report = executor
            .execute(&mut target, &emergency_snapshot(), &params())
            .await
            .unwrap();

        assert_eq!(target.status, PortfolioStatus::Emergency);
        // Locked positions are redeemed too, regardless of lock state.
        assert_eq!(report.redeemed.len(), 2);
        assert_eq!(report.repaid.len(), 2);
        assert!(report.errors.is_empty());

        let calls = gateway.calls();
        let first_repay = calls
            .iter()
            .position(|call| matches!(call, GatewayCall::Repay { .. }))
            .unwrap();
        let last_redeem = calls
            .iter()
            .rposition(|call| matches!(call, GatewayCall::Redeem { .. }))
            .unwrap();
        assert!(last_redeem < first_repay, "repay must follow all redemptions");

        // One critical transaction and one critical alert.
        let transactions = store.transactions();
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].kind, TransactionKind::EmergencyLiquidation);
        assert_eq!(transactions[0].ltv_ratio, dec!(0.78));
        let sent = alerts.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].severity, AlertSeverity::Critical);
    }

    #[tokio::test]
    async fn partial_failure_reports_liquidation_error_and_stays_frozen() {
        let gateway = Arc::new(
            MockGateway::new()
                .with_loan("loan-eth", "ETH", dec!(3.0))
                .with_loan("loan-sol", "SOL", dec!(9.75))
                .fail_repay("loan-eth", || {
                    GatewayError::Transient("repay timeout".to_string())
                }),
        );
        let store = Arc::new(MockStore::default());
        let alerts = Arc::new(MockAlerts::default());
        let executor =
            LiquidationExecutor::new(gateway.clone(), store.clone(), alerts, pair());

        let mut target = portfolio(1);
        let err = executor
            .execute(&mut target, &emergency_snapshot(), &params())
            .await
            .unwrap_err();

        assert!(matches!(err, CycleError::Liquidation(_)));
        assert_eq!(target.status, PortfolioStatus::Emergency);
        // The other loan was still repaid and the audit trail still written.
        assert_eq!(gateway.repays().len(), 1);
        assert_eq!(store.transactions().len(), 1);
    }

    #[tokio::test]
    async fn alert_delivery_failure_does_not_fail_the_unwind() {
        let gateway = Arc::new(MockGateway::new().with_loan("loan-eth", "ETH", dec!(3.0)));
        let store = Arc::new(MockStore::default());
        let alerts = Arc::new(MockAlerts::failing());
        let executor = LiquidationExecutor::new(gateway, store.clone(), alerts, pair());

        let mut target = portfolio(1);
        let report = executor
            .execute(&mut target, &emergency_snapshot(), &params())
            .await
            .unwrap();
        assert!(report.errors.is_empty());
        assert_eq!(store.transactions().len(), 1);
    }
}
