//! Reporting helpers derived from a snapshot: allocation, band utilization,
//! safety buffer, and yield projection. Read-only; nothing here feeds back
//! into cycle decisions.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::StrategyParams;
use crate::models::PortfolioSnapshot;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    #[must_use]
    pub fn from_ltv(ltv: Decimal) -> Self {
        if ltv < Decimal::new(45, 2) {
            Self::Low
        } else if ltv < Decimal::new(60, 2) {
            Self::Medium
        } else if ltv < Decimal::new(70, 2) {
            Self::High
        } else {
            Self::Critical
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioMetrics {
    pub total_value: Decimal,
    /// USD value per strategy asset, snapshot order.
    pub asset_values: Vec<(String, Decimal)>,
    /// Allocation percentage per strategy asset, snapshot order.
    pub allocations_pct: Vec<(String, Decimal)>,
    /// Current LTV as a percentage of the band maximum.
    pub ltv_utilization_pct: Decimal,
    /// USD headroom before the band maximum is hit.
    pub safety_buffer: Decimal,
    pub risk_level: RiskLevel,
}

/// Summarizes a snapshot for dashboards and operator logs.
#[must_use]
pub fn portfolio_metrics(snapshot: &PortfolioSnapshot, params: &StrategyParams) -> PortfolioMetrics {
    let total_value = snapshot.collateral_value;
    let hundred = Decimal::ONE_HUNDRED;

    let asset_values: Vec<(String, Decimal)> = snapshot
        .assets
        .iter()
        .map(|valuation| (valuation.asset.clone(), valuation.value()))
        .collect();

    let allocations_pct = asset_values
        .iter()
        .map(|(asset, value)| {
            let pct = if total_value > Decimal::ZERO {
                value / total_value * hundred
            } else {
                Decimal::ZERO
            };
            (asset.clone(), pct)
        })
        .collect();

    let ltv_utilization_pct = if params.ltv_max > Decimal::ZERO {
        snapshot.ltv / params.ltv_max * hundred
    } else {
        Decimal::ZERO
    };

    let safety_buffer = ((params.ltv_max - snapshot.ltv) * total_value).max(Decimal::ZERO);

    PortfolioMetrics {
        total_value,
        asset_values,
        allocations_pct,
        ltv_utilization_pct,
        safety_buffer,
        risk_level: RiskLevel::from_ltv(snapshot.ltv),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YieldProjection {
    pub simple_yield: Decimal,
    pub compound_yield: Decimal,
    pub final_balance: Decimal,
}

/// Projects earn yield over `days` at the quoted APR, both simple and
/// daily-compounded.
#[must_use]
pub fn project_yield(balance: Decimal, apr: Decimal, days: u32) -> YieldProjection {
    let daily_rate = apr / Decimal::from(365);
    let simple_yield = balance * daily_rate * Decimal::from(days);

    let mut compounded = balance;
    for _ in 0..days {
        compounded += compounded * daily_rate;
    }
    let compound_yield = compounded - balance;

    YieldProjection {
        simple_yield,
        compound_yield,
        final_balance: balance + compound_yield,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssetValuation, PortfolioSnapshot};
    use crate::traits::EarnBalances;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn snapshot(ltv: Decimal) -> PortfolioSnapshot {
        let collateral_value = dec!(10000);
        PortfolioSnapshot {
            portfolio_id: 1,
            taken_at: Utc::now(),
            assets: vec![
                AssetValuation {
                    asset: "ETH".to_string(),
                    spot_amount: dec!(3),
                    earn_amount: Decimal::ZERO,
                    price: dec!(2000),
                },
                AssetValuation {
                    asset: "SOL".to_string(),
                    spot_amount: Decimal::ZERO,
                    earn_amount: dec!(26.666666),
                    price: dec!(150),
                },
            ],
            loans: Vec::new(),
            earn: EarnBalances::default(),
            collateral_value,
            borrowed_value: collateral_value * ltv,
            ltv,
        }
    }

    fn params() -> StrategyParams {
        use crate::config::{AutomationConfig, StrategyConfig};
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
            flexible_products: std::collections::HashMap::new(),
        };
        let automation = AutomationConfig {
            tick_interval_secs: 300,
            cycle_deadline_secs: 120,
        };
        StrategyParams::from_config(&strategy, &automation).unwrap()
    }

    #[test]
    fn risk_level_bands() {
        assert_eq!(RiskLevel::from_ltv(dec!(0.30)), RiskLevel::Low);
        assert_eq!(RiskLevel::from_ltv(dec!(0.50)), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_ltv(dec!(0.65)), RiskLevel::High);
        assert_eq!(RiskLevel::from_ltv(dec!(0.72)), RiskLevel::Critical);
    }

    #[test]
    fn utilization_and_buffer_against_band_max() {
        let metrics = portfolio_metrics(&snapshot(dec!(0.52)), &params());
        assert_eq!(metrics.ltv_utilization_pct, dec!(80));
        assert_eq!(metrics.safety_buffer, dec!(1300)); // (0.65 - 0.52) * 10000
        assert_eq!(metrics.risk_level, RiskLevel::Medium);
    }

    #[test]
    fn buffer_never_negative_above_band() {
        let metrics = portfolio_metrics(&snapshot(dec!(0.72)), &params());
        assert_eq!(metrics.safety_buffer, Decimal::ZERO);
        assert_eq!(metrics.risk_level, RiskLevel::Critical);
    }

    #[test]
    fn simple_yield_projection() {
        let projection = project_yield(dec!(365), dec!(0.365), 10);
        // daily rate 0.001 on 365 => 0.365/day simple
        assert_eq!(projection.simple_yield, dec!(3.650));
        assert!(projection.compound_yield > projection.simple_yield);
        assert_eq!(
            projection.final_balance,
            dec!(365) + projection.compound_yield
        );
    }
}
