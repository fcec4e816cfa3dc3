use chrono::Utc;
use ltv_guard_core::config::AssetPair;
use ltv_guard_core::error::CycleError;
use ltv_guard_core::ltv::loan_to_value;
use ltv_guard_core::models::{AssetValuation, Portfolio, PortfolioSnapshot};
use ltv_guard_core::traits::{ExchangeGateway, PersistenceStore, SpotBalance};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Aggregates spot balances, yield balances, prices, and loan exposure into
/// one consistent valuation, then persists the refreshed portfolio fields.
pub struct SnapshotBuilder {
    gateway: Arc<dyn ExchangeGateway>,
    store: Arc<dyn PersistenceStore>,
    pair: AssetPair,
}

impl SnapshotBuilder {
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

    /// Builds a fresh snapshot and writes the refreshed portfolio row.
    ///
    /// All gateway reads complete before any field is updated; a failed read
    /// aborts the cycle without a half-updated snapshot. Borrowed value is
    /// always computed from live loan state, never assumed.
    ///
    /// # Errors
    /// Returns `CycleError::Gateway` for failed reads, `Validation` for
    /// unusable prices, `Store` if the persisted write fails.
    pub async fn refresh(
        &self,
        portfolio: &mut Portfolio,
    ) -> Result<PortfolioSnapshot, CycleError> {
        let spot = self.gateway.spot_balances().await?;
        let earn = self.gateway.earn_balances().await?;
        let loans = self.gateway.loan_positions().await?;

        let mut assets = Vec::with_capacity(2);
        for asset in self.pair.assets() {
            let price = self.gateway.price(&self.pair.symbol(asset)).await?;
            if price <= Decimal::ZERO {
                return Err(CycleError::Validation(format!(
                    "no usable price for {asset}: {price}"
                )));
            }
            let spot_amount: Decimal = spot
                .iter()
                .filter(|row| row.asset == asset)
                .map(SpotBalance::total)
                .sum();
            assets.push(AssetValuation {
                asset: asset.to_string(),
                spot_amount,
                earn_amount: earn.total_for(asset),
                price,
            });
        }

        let collateral_value: Decimal = assets.iter().map(AssetValuation::value).sum();

        let mut borrowed_value = Decimal::ZERO;
        for loan in loans
            .iter()
            .filter(|loan| loan.status == ltv_guard_core::models::LoanStatus::Borrowing)
        {
            // Loans outside the strategy pair carry no price here; they are
            // not part of this portfolio's exposure.
            let Some(valuation) = assets.iter().find(|v| v.asset == loan.loan_asset) else {
                continue;
            };
            borrowed_value += loan.outstanding * valuation.price;
        }

        let ltv = loan_to_value(collateral_value, borrowed_value);
        let taken_at = Utc::now();

        let snapshot = PortfolioSnapshot {
            portfolio_id: portfolio.id,
            taken_at,
            assets,
            loans,
            earn,
            collateral_value,
            borrowed_value,
            ltv,
        };

        portfolio.balance_a = snapshot.balance_of(&portfolio.asset_a);
        portfolio.balance_b = snapshot.balance_of(&portfolio.asset_b);
        portfolio.price_a = snapshot
            .price_of(&portfolio.asset_a)
            .unwrap_or(portfolio.price_a);
        portfolio.price_b = snapshot
            .price_of(&portfolio.asset_b)
            .unwrap_or(portfolio.price_b);
        portfolio.total_value = collateral_value;
        portfolio.current_ltv = ltv;
        portfolio.last_updated = taken_at;
        self.store.save_portfolio(portfolio).await?;

        tracing::debug!(
            portfolio_id = portfolio.id,
            %ltv,
            %collateral_value,
            %borrowed_value,
            "snapshot refreshed"
        );

        Ok(snapshot)
    }
}
