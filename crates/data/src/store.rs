//! The `PersistenceStore` and `AlertDispatcher` implementations the control
//! loop is wired to in production.

use anyhow::Result;
use async_trait::async_trait;
use ltv_guard_core::models::{
    AlertSeverity, EarnPosition, LoanPosition, Portfolio, SystemAlert, Transaction,
};
use ltv_guard_core::traits::{AlertDispatcher, PersistenceStore};
use sqlx::PgPool;

use crate::repositories::{
    AlertRepository, EarnPositionRepository, LoanPositionRepository, PortfolioRepository,
    TransactionRepository,
};

/// `PersistenceStore` over the `PostgreSQL` repositories.
///
/// Writes for a single portfolio are read-your-writes within one cycle; no
/// cross-portfolio transactional guarantee is made or needed.
#[derive(Debug, Clone)]
pub struct PgStore {
    portfolios: PortfolioRepository,
    transactions: TransactionRepository,
    alerts: AlertRepository,
    loans: LoanPositionRepository,
    earn: EarnPositionRepository,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            portfolios: PortfolioRepository::new(pool.clone()),
            transactions: TransactionRepository::new(pool.clone()),
            alerts: AlertRepository::new(pool.clone()),
            loans: LoanPositionRepository::new(pool.clone()),
            earn: EarnPositionRepository::new(pool),
        }
    }

    #[must_use]
    pub fn portfolios(&self) -> &PortfolioRepository {
        &self.portfolios
    }

    #[must_use]
    pub fn transactions(&self) -> &TransactionRepository {
        &self.transactions
    }

    #[must_use]
    pub fn alerts(&self) -> &AlertRepository {
        &self.alerts
    }
}

#[async_trait]
impl PersistenceStore for PgStore {
    async fn load_active_portfolios(&self) -> Result<Vec<Portfolio>> {
        self.portfolios.list_automated().await
    }

    async fn load_portfolio(&self, id: i64) -> Result<Option<Portfolio>> {
        self.portfolios.get(id).await
    }

    async fn create_portfolio(&self, portfolio: &Portfolio) -> Result<i64> {
        self.portfolios.insert(portfolio).await
    }

    async fn save_portfolio(&self, portfolio: &Portfolio) -> Result<()> {
        self.portfolios.update(portfolio).await
    }

    async fn append_transaction(&self, transaction: &Transaction) -> Result<i64> {
        self.transactions.append(transaction).await
    }

    async fn append_alert(&self, alert: &SystemAlert) -> Result<i64> {
        self.alerts.append(alert).await
    }

    async fn loan_positions(&self, portfolio_id: i64) -> Result<Vec<LoanPosition>> {
        self.loans.list(portfolio_id).await
    }

    async fn earn_positions(&self, portfolio_id: i64) -> Result<Vec<EarnPosition>> {
        self.earn.list(portfolio_id).await
    }

    async fn upsert_loan_position(&self, loan: &LoanPosition) -> Result<()> {
        self.loans.upsert(loan).await
    }

    async fn upsert_earn_position(&self, position: &EarnPosition) -> Result<()> {
        self.earn.upsert(position).await
    }
}

/// Records alerts in the store and the log.
///
/// The actual outbound transport (mail, push, webhooks) belongs to the host
/// process; from the control loop's perspective notification is
/// fire-and-forget, and the caller is expected to log, not propagate, a
/// failure here.
#[derive(Debug, Clone)]
pub struct StoredAlertDispatcher {
    alerts: AlertRepository,
}

impl StoredAlertDispatcher {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            alerts: AlertRepository::new(pool),
        }
    }
}

#[async_trait]
impl AlertDispatcher for StoredAlertDispatcher {
    async fn notify(&self, alert: &SystemAlert) -> Result<()> {
        match alert.severity {
            AlertSeverity::Critical | AlertSeverity::Error => {
                tracing::error!(title = %alert.title, severity = alert.severity.as_str(), "{}", alert.message);
            }
            AlertSeverity::Warning => {
                tracing::warn!(title = %alert.title, "{}", alert.message);
            }
            AlertSeverity::Info => {
                tracing::info!(title = %alert.title, "{}", alert.message);
            }
        }
        self.alerts.append(alert).await?;
        Ok(())
    }
}
