use chrono::Utc;
use ltv_guard_core::config::{AssetPair, StrategyParams};
use ltv_guard_core::error::CycleError;
use ltv_guard_core::ltv::RiskTier;
use ltv_guard_core::models::{
    AlertSeverity, Portfolio, PortfolioSnapshot, PortfolioStatus, SystemAlert, Transaction,
    TransactionKind,
};
use ltv_guard_core::traits::{AlertDispatcher, ExchangeGateway, PersistenceStore};
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::harvester::YieldHarvester;
use crate::leverage::LeverageAdjuster;
use crate::liquidation::{LiquidationExecutor, LiquidationReport};
use crate::snapshot::SnapshotBuilder;

/// What one cycle ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleAction {
    Liquidated,
    Delevered {
        aggressive: bool,
        repaid: usize,
        skipped: usize,
    },
    Harvested {
        positions: usize,
    },
    LeveredUp {
        legs: usize,
    },
}

#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub portfolio_id: i64,
    pub tier: RiskTier,
    pub ltv: Decimal,
    pub total_value: Decimal,
    pub action: CycleAction,
}

/// The decision half of the control loop: classifies a snapshot into a risk
/// tier and drives the matching corrective action.
///
/// Classification is a pure function of (snapshot, parameters), so replaying
/// a cycle against unchanged external state makes the same decision. Every
/// branch terminates in exactly one ledger append carrying the LTV and value
/// at decision time.
pub struct RiskController {
    store: Arc<dyn PersistenceStore>,
    alerts: Arc<dyn AlertDispatcher>,
    snapshots: SnapshotBuilder,
    leverage: LeverageAdjuster,
    harvester: YieldHarvester,
    liquidator: LiquidationExecutor,
}

impl RiskController {
    #[must_use]
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        store: Arc<dyn PersistenceStore>,
        alerts: Arc<dyn AlertDispatcher>,
        pair: AssetPair,
    ) -> Self {
        Self {
            snapshots: SnapshotBuilder::new(gateway.clone(), store.clone(), pair.clone()),
            leverage: LeverageAdjuster::new(gateway.clone(), store.clone(), pair.clone()),
            harvester: YieldHarvester::new(gateway.clone(), store.clone(), pair.clone()),
            liquidator: LiquidationExecutor::new(gateway, store.clone(), alerts.clone(), pair),
            store,
            alerts,
        }
    }

    /// Runs one snapshot -> decision -> action -> ledger cycle.
    ///
    /// # Errors
    /// Propagates snapshot, gateway, persistence, and liquidation failures
    /// as [`CycleError`]; snapshot failures abort before any mutation.
    pub async fn run_cycle(
        &self,
        portfolio: &mut Portfolio,
        base_params: &StrategyParams,
    ) -> Result<CycleOutcome, CycleError> {
        let params = base_params.with_band(portfolio.target_ltv_min, portfolio.target_ltv_max)?;
        let snapshot = self.snapshots.refresh(portfolio).await?;
        let tier = RiskTier::classify(snapshot.ltv, &params);

        tracing::info!(
            portfolio_id = portfolio.id,
            ltv = %snapshot.ltv,
            tier = tier.as_str(),
            total_value = %snapshot.collateral_value,
            "cycle decision"
        );
        let metrics = ltv_guard_core::metrics::portfolio_metrics(&snapshot, &params);
        tracing::debug!(
            portfolio_id = portfolio.id,
            risk_level = metrics.risk_level.as_str(),
            safety_buffer = %metrics.safety_buffer,
            utilization_pct = %metrics.ltv_utilization_pct,
            "portfolio metrics"
        );

        let action = match tier {
            RiskTier::Emergency => {
                // The liquidator freezes the portfolio, appends the critical
                // transaction, and raises the critical alert itself.
                self.liquidator
                    .execute(portfolio, &snapshot, &params)
                    .await?;
                return Ok(CycleOutcome {
                    portfolio_id: portfolio.id,
                    tier,
                    ltv: snapshot.ltv,
                    total_value: snapshot.collateral_value,
                    action: CycleAction::Liquidated,
                });
            }
            RiskTier::Danger => {
                let report = self.leverage.decrease(&snapshot, &params, true).await?;
                portfolio.status = PortfolioStatus::Danger;
                if report.changed_anything() {
                    portfolio.last_rebalance = Some(Utc::now());
                }
                self.send_danger_warning(portfolio, &snapshot).await;
                self.append_entry(
                    portfolio,
                    &snapshot,
                    TransactionKind::DangerZone,
                    format!(
                        "aggressive deleverage at LTV {:.4}: {} repayments, {} skipped, {} failed",
                        snapshot.ltv,
                        report.repaid.len(),
                        report.skipped,
                        report.failed
                    ),
                )
                .await?;
                CycleAction::Delevered {
                    aggressive: true,
                    repaid: report.repaid.len(),
                    skipped: report.skipped,
                }
            }
            RiskTier::OverLevered => {
                let report = self.leverage.decrease(&snapshot, &params, false).await?;
                self.recover_from_danger(portfolio);
                if report.changed_anything() {
                    portfolio.last_rebalance = Some(Utc::now());
                }
                self.append_entry(
                    portfolio,
                    &snapshot,
                    TransactionKind::NormalOperation,
                    format!(
                        "deleverage at LTV {:.4}: {} repayments, {} skipped",
                        snapshot.ltv,
                        report.repaid.len(),
                        report.skipped
                    ),
                )
                .await?;
                CycleAction::Delevered {
                    aggressive: false,
                    repaid: report.repaid.len(),
                    skipped: report.skipped,
                }
            }
            RiskTier::Safe => {
                let report = self.harvester.harvest(&snapshot, &params).await?;
                self.recover_from_danger(portfolio);
                self.append_entry(
                    portfolio,
                    &snapshot,
                    TransactionKind::NormalOperation,
                    format!(
                        "LTV maintained at {:.4}, {} positions harvested",
                        snapshot.ltv,
                        report.harvested.len()
                    ),
                )
                .await?;
                CycleAction::Harvested {
                    positions: report.harvested.len(),
                }
            }
            RiskTier::UnderLevered => {
                let report = self.leverage.increase(&snapshot, &params).await?;
                self.recover_from_danger(portfolio);
                if report.changed_anything() {
                    portfolio.last_rebalance = Some(Utc::now());
                }
                self.append_entry(
                    portfolio,
                    &snapshot,
                    TransactionKind::NormalOperation,
                    format!(
                        "leverage increase at LTV {:.4} toward {:.4}: {} borrow legs",
                        snapshot.ltv,
                        params.target_ltv(),
                        report.borrowed.len()
                    ),
                )
                .await?;
                CycleAction::LeveredUp {
                    legs: report.borrowed.len(),
                }
            }
        };

        self.store.save_portfolio(portfolio).await?;

        Ok(CycleOutcome {
            portfolio_id: portfolio.id,
            tier,
            ltv: snapshot.ltv,
            total_value: snapshot.collateral_value,
            action,
        })
    }

    /// Operator-triggered emergency unwind, bypassing the tier decision.
    ///
    /// Runs against a fresh snapshot so repayment amounts reflect current
    /// loan state. The caller must hold the portfolio's cycle guard; the
    /// unwind is intentionally non-reentrant.
    ///
    /// # Errors
    /// Propagates snapshot failures and reports an incomplete unwind as
    /// `CycleError::Liquidation`.
    pub async fn force_liquidation(
        &self,
        portfolio: &mut Portfolio,
        base_params: &StrategyParams,
    ) -> Result<LiquidationReport, CycleError> {
        let params = base_params.with_band(portfolio.target_ltv_min, portfolio.target_ltv_max)?;
        let snapshot = self.snapshots.refresh(portfolio).await?;
        self.liquidator
            .execute(portfolio, &snapshot, &params)
            .await
    }

    /// Danger is the one severity a later cycle may walk back on its own;
    /// emergency and liquidated stay put until an operator intervenes.
    fn recover_from_danger(&self, portfolio: &mut Portfolio) {
        if portfolio.status == PortfolioStatus::Danger {
            tracing::info!(portfolio_id = portfolio.id, "left danger zone");
            portfolio.status = PortfolioStatus::Active;
        }
    }

    async fn send_danger_warning(&self, portfolio: &Portfolio, snapshot: &PortfolioSnapshot) {
        let alert = SystemAlert {
            owner_id: Some(portfolio.owner_id),
            kind: "ltv_warning".to_string(),
            severity: AlertSeverity::Warning,
            title: format!(
                "LTV warning: {:.2}%",
                snapshot.ltv * Decimal::ONE_HUNDRED
            ),
            message: format!(
                "portfolio {} LTV at {:.4}, reducing leverage aggressively",
                portfolio.id, snapshot.ltv
            ),
            created_at: Utc::now(),
        };
        if let Err(err) = self.alerts.notify(&alert).await {
            tracing::warn!(
                portfolio_id = portfolio.id,
                error = %err,
                "danger alert delivery failed"
            );
        }
    }

    async fn append_entry(
        &self,
        portfolio: &Portfolio,
        snapshot: &PortfolioSnapshot,
        kind: TransactionKind,
        description: String,
    ) -> Result<(), CycleError> {
        self.store
            .append_transaction(&Transaction {
                portfolio_id: portfolio.id,
                kind,
                description,
                amount_a: snapshot.balance_of(&portfolio.asset_a),
                amount_b: snapshot.balance_of(&portfolio.asset_b),
                ltv_ratio: snapshot.ltv,
                total_value: snapshot.collateral_value,
                timestamp: Utc::now(),
            })
            .await?;
        Ok(())
    }
}
