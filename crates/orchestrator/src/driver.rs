use anyhow::Result;
use chrono::Utc;
use ltv_guard_core::config::{AssetPair, StrategyParams};
use ltv_guard_core::error::CycleError;
use ltv_guard_core::models::{
    AlertSeverity, Portfolio, PortfolioStatus, SystemAlert,
};
use ltv_guard_core::traits::{AlertDispatcher, ExchangeGateway, PersistenceStore};
use ltv_guard_strategy::controller::{CycleOutcome, RiskController};
use ltv_guard_strategy::liquidation::LiquidationReport;
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::guard::CycleGuards;

/// Result of one control-loop pass over all automated portfolios.
#[derive(Debug, Default)]
pub struct PassSummary {
    pub completed: Vec<CycleOutcome>,
    /// Portfolios whose guard was already held this tick.
    pub skipped: Vec<i64>,
    pub failed: Vec<(i64, String)>,
}

/// Sequences snapshot -> decision -> action -> ledger per portfolio, with
/// single-flight admission and a hard per-cycle deadline. Also carries the
/// operator controls the host API layer calls.
pub struct CycleDriver {
    controller: RiskController,
    store: Arc<dyn PersistenceStore>,
    alerts: Arc<dyn AlertDispatcher>,
    guards: CycleGuards,
    params: StrategyParams,
}

impl CycleDriver {
    #[must_use]
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        store: Arc<dyn PersistenceStore>,
        alerts: Arc<dyn AlertDispatcher>,
        pair: AssetPair,
        params: StrategyParams,
    ) -> Self {
        Self {
            controller: RiskController::new(gateway, store.clone(), alerts.clone(), pair),
            store,
            alerts,
            guards: CycleGuards::new(),
            params,
        }
    }

    /// Runs one cycle for every automated portfolio. Ordering between
    /// portfolios is unspecified and failures are isolated per portfolio.
    ///
    /// # Errors
    /// Returns an error only if the active-portfolio listing itself fails.
    pub async fn run_pass(&self) -> Result<PassSummary> {
        let portfolios = self.store.load_active_portfolios().await?;
        tracing::info!(count = portfolios.len(), "automation pass started");

        let mut summary = PassSummary::default();
        for portfolio in portfolios {
            let portfolio_id = portfolio.id;
            match self.run_guarded(portfolio).await {
                Ok(Some(outcome)) => summary.completed.push(outcome),
                Ok(None) => {
                    tracing::info!(portfolio_id, "cycle already in flight, skipping this tick");
                    summary.skipped.push(portfolio_id);
                }
                Err(err) => {
                    self.handle_cycle_error(portfolio_id, &err).await;
                    summary.failed.push((portfolio_id, err.to_string()));
                }
            }
        }

        tracing::info!(
            completed = summary.completed.len(),
            skipped = summary.skipped.len(),
            failed = summary.failed.len(),
            "automation pass finished"
        );
        Ok(summary)
    }

    /// Runs a single manual cycle for one portfolio, through the same guard
    /// and deadline as the scheduled pass.
    ///
    /// # Errors
    /// Returns `Validation` if the portfolio is missing or its status does
    /// not admit automation, otherwise whatever the cycle itself returns.
    pub async fn run_cycle_now(&self, portfolio_id: i64) -> Result<Option<CycleOutcome>, CycleError> {
        let portfolio = self.load(portfolio_id).await?;
        if !portfolio.status.is_automated() {
            return Err(CycleError::Validation(format!(
                "portfolio {portfolio_id} status {} does not admit cycles",
                portfolio.status.as_str()
            )));
        }
        let result = self.run_guarded(portfolio).await;
        if let Err(err) = &result {
            self.handle_cycle_error(portfolio_id, err).await;
        }
        result
    }

    /// Operator-triggered emergency unwind, guarded like any cycle so the
    /// repay step can never run twice concurrently for one portfolio.
    ///
    /// # Errors
    /// Returns `Validation` when the portfolio is missing or its guard is
    /// held, `Liquidation` when the unwind is incomplete.
    pub async fn emergency_stop(
        &self,
        portfolio_id: i64,
    ) -> Result<LiquidationReport, CycleError> {
        let mut portfolio = self.load(portfolio_id).await?;
        let Some(_permit) = self.guards.try_acquire(portfolio_id) else {
            return Err(CycleError::Validation(format!(
                "portfolio {portfolio_id} has a cycle in flight, retry shortly"
            )));
        };
        self.controller
            .force_liquidation(&mut portfolio, &self.params)
            .await
    }

    /// Re-admits a portfolio to automation. This is the only path back
    /// toward `Active` after an emergency.
    ///
    /// # Errors
    /// Returns an error if the portfolio is missing or the write fails.
    pub async fn start_automation(&self, portfolio_id: i64) -> Result<(), CycleError> {
        let mut portfolio = self.load(portfolio_id).await?;
        portfolio.status = PortfolioStatus::Active;
        portfolio.auto_rebalance = true;
        portfolio.last_updated = Utc::now();
        self.store.save_portfolio(&portfolio).await?;
        tracing::info!(portfolio_id, "automation started");
        Ok(())
    }

    /// Pauses automation. Only prevents the next tick from admitting a
    /// cycle; an in-flight cycle is never interrupted.
    ///
    /// # Errors
    /// Returns an error if the portfolio is missing or the write fails.
    pub async fn stop_automation(&self, portfolio_id: i64) -> Result<(), CycleError> {
        let mut portfolio = self.load(portfolio_id).await?;
        portfolio.status = PortfolioStatus::Paused;
        portfolio.auto_rebalance = false;
        portfolio.last_updated = Utc::now();
        self.store.save_portfolio(&portfolio).await?;
        tracing::info!(portfolio_id, "automation paused");
        Ok(())
    }

    /// Updates the portfolio's target LTV band after validating it against
    /// the configured danger/emergency thresholds.
    ///
    /// # Errors
    /// Returns `Validation` for a band that breaks threshold ordering.
    pub async fn update_ltv_band(
        &self,
        portfolio_id: i64,
        ltv_min: Decimal,
        ltv_max: Decimal,
    ) -> Result<(), CycleError> {
        self.params.with_band(ltv_min, ltv_max)?;
        let mut portfolio = self.load(portfolio_id).await?;
        portfolio.target_ltv_min = ltv_min;
        portfolio.target_ltv_max = ltv_max;
        portfolio.last_updated = Utc::now();
        self.store.save_portfolio(&portfolio).await?;
        tracing::info!(portfolio_id, %ltv_min, %ltv_max, "target band updated");
        Ok(())
    }

    async fn run_guarded(&self, mut portfolio: Portfolio) -> Result<Option<CycleOutcome>, CycleError> {
        let portfolio_id = portfolio.id;
        let Some(_permit) = self.guards.try_acquire(portfolio_id) else {
            return Ok(None);
        };

        // The deadline abandons local bookkeeping only; a venue call already
        // issued cannot be cancelled from here.
        match tokio::time::timeout(
            self.params.cycle_deadline,
            self.controller.run_cycle(&mut portfolio, &self.params),
        )
        .await
        {
            Ok(result) => result.map(Some),
            Err(_elapsed) => Err(CycleError::Deadline(self.params.cycle_deadline)),
        }
    }

    async fn load(&self, portfolio_id: i64) -> Result<Portfolio, CycleError> {
        self.store
            .load_portfolio(portfolio_id)
            .await?
            .ok_or_else(|| CycleError::Validation(format!("portfolio {portfolio_id} not found")))
    }

    async fn handle_cycle_error(&self, portfolio_id: i64, err: &CycleError) {
        tracing::error!(portfolio_id, error = %err, "cycle failed");
        if !err.is_auth() {
            return;
        }
        // Dead credentials: stop this portfolio's automation until they are
        // refreshed externally, and escalate.
        match self.store.load_portfolio(portfolio_id).await {
            Ok(Some(mut portfolio)) => {
                portfolio.status = PortfolioStatus::Paused;
                portfolio.auto_rebalance = false;
                portfolio.last_updated = Utc::now();
                if let Err(save_err) = self.store.save_portfolio(&portfolio).await {
                    tracing::error!(portfolio_id, error = %save_err, "failed to pause portfolio");
                }
                let alert = SystemAlert {
                    owner_id: Some(portfolio.owner_id),
                    kind: "auth_failure".to_string(),
                    severity: AlertSeverity::Critical,
                    title: "Exchange authentication failed".to_string(),
                    message: format!(
                        "automation paused for portfolio {portfolio_id}: {err}; refresh API credentials to resume"
                    ),
                    created_at: Utc::now(),
                };
                if let Err(alert_err) = self.alerts.notify(&alert).await {
                    tracing::warn!(portfolio_id, error = %alert_err, "auth alert delivery failed");
                }
            }
            Ok(None) => tracing::error!(portfolio_id, "portfolio vanished during auth handling"),
            Err(load_err) => {
                tracing::error!(portfolio_id, error = %load_err, "failed to load portfolio for pause");
            }
        }
    }
}
