use anyhow::Result;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::CycleError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub binance: BinanceConfig,
    pub automation: AutomationConfig,
    pub strategy: StrategyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinanceConfig {
    pub api_url: String,
    /// Per-request timeout. Every gateway call must carry one so a stalled
    /// venue call cannot hold a portfolio guard past the cycle deadline.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_recv_window")]
    pub recv_window_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationConfig {
    /// Interval between control-loop passes over all active portfolios.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    /// Hard deadline for one portfolio cycle. Past it the cycle is abandoned
    /// and logged as a timeout failure; in-flight venue calls are not
    /// cancellable, only their local bookkeeping is dropped.
    #[serde(default = "default_cycle_deadline")]
    pub cycle_deadline_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub asset_a: String,
    pub asset_b: String,
    #[serde(default = "default_quote")]
    pub quote: String,
    #[serde(default = "default_ltv_min")]
    pub target_ltv_min: f64,
    #[serde(default = "default_ltv_max")]
    pub target_ltv_max: f64,
    #[serde(default = "default_ltv_danger")]
    pub danger_ltv: f64,
    #[serde(default = "default_ltv_emergency")]
    pub emergency_ltv: f64,
    #[serde(default = "default_min_borrow")]
    pub min_borrow_amount: f64,
    #[serde(default = "default_repay_normal")]
    pub repay_fraction_normal: f64,
    #[serde(default = "default_repay_danger")]
    pub repay_fraction_danger: f64,
    #[serde(default = "default_harvest_settle_wait")]
    pub harvest_settle_wait_secs: u64,
    #[serde(default = "default_liquidation_settle_wait")]
    pub liquidation_settle_wait_secs: u64,
    /// Simple Earn flexible product ids per asset, used when subscribing
    /// fresh capital. Assets without an entry are left in the earn wallet.
    #[serde(default)]
    pub flexible_products: HashMap<String, String>,
}

const fn default_request_timeout() -> u64 {
    30
}

const fn default_recv_window() -> u64 {
    5000
}

const fn default_tick_interval() -> u64 {
    300 // 5 minutes
}

const fn default_cycle_deadline() -> u64 {
    120
}

fn default_quote() -> String {
    "USDT".to_string()
}

const fn default_ltv_min() -> f64 {
    0.55
}

const fn default_ltv_max() -> f64 {
    0.65
}

const fn default_ltv_danger() -> f64 {
    0.70
}

const fn default_ltv_emergency() -> f64 {
    0.75
}

const fn default_min_borrow() -> f64 {
    0.001
}

const fn default_repay_normal() -> f64 {
    0.20
}

const fn default_repay_danger() -> f64 {
    0.50
}

const fn default_harvest_settle_wait() -> u64 {
    1
}

const fn default_liquidation_settle_wait() -> u64 {
    10
}

/// The two collateral assets of the strategy plus the quote currency their
/// prices are read in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssetPair {
    pub first: String,
    pub second: String,
    pub quote: String,
}

impl AssetPair {
    #[must_use]
    pub fn from_config(config: &StrategyConfig) -> Self {
        Self {
            first: config.asset_a.clone(),
            second: config.asset_b.clone(),
            quote: config.quote.clone(),
        }
    }

    #[must_use]
    pub fn assets(&self) -> [&str; 2] {
        [&self.first, &self.second]
    }

    #[must_use]
    pub fn contains(&self, asset: &str) -> bool {
        asset == self.first || asset == self.second
    }

    /// The opposite leg of the pair, used as collateral for a borrow of
    /// `asset`.
    #[must_use]
    pub fn other(&self, asset: &str) -> &str {
        if asset == self.first {
            &self.second
        } else {
            &self.first
        }
    }

    /// Venue ticker symbol for an asset, e.g. "ETH" -> "ETHUSDT".
    #[must_use]
    pub fn symbol(&self, asset: &str) -> String {
        format!("{}{}", asset, self.quote)
    }
}

/// Decimal-typed strategy parameters consumed by the risk controller.
///
/// Built once from the raw config and validated; the per-portfolio LTV band
/// can override `ltv_min`/`ltv_max` via [`StrategyParams::with_band`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyParams {
    pub ltv_min: Decimal,
    pub ltv_max: Decimal,
    pub ltv_danger: Decimal,
    pub ltv_emergency: Decimal,
    pub min_borrow_amount: Decimal,
    pub repay_fraction_normal: Decimal,
    pub repay_fraction_danger: Decimal,
    pub harvest_settle_wait: Duration,
    pub liquidation_settle_wait: Duration,
    pub cycle_deadline: Duration,
}

impl StrategyParams {
    /// Converts the raw f64 config into decimal parameters.
    ///
    /// # Errors
    /// Returns an error if any threshold cannot be represented as a decimal
    /// or the resulting parameters fail validation.
    pub fn from_config(strategy: &StrategyConfig, automation: &AutomationConfig) -> Result<Self> {
        let params = Self {
            ltv_min: Decimal::try_from(strategy.target_ltv_min)?,
            ltv_max: Decimal::try_from(strategy.target_ltv_max)?,
            ltv_danger: Decimal::try_from(strategy.danger_ltv)?,
            ltv_emergency: Decimal::try_from(strategy.emergency_ltv)?,
            min_borrow_amount: Decimal::try_from(strategy.min_borrow_amount)?,
            repay_fraction_normal: Decimal::try_from(strategy.repay_fraction_normal)?,
            repay_fraction_danger: Decimal::try_from(strategy.repay_fraction_danger)?,
            harvest_settle_wait: Duration::from_secs(strategy.harvest_settle_wait_secs),
            liquidation_settle_wait: Duration::from_secs(strategy.liquidation_settle_wait_secs),
            cycle_deadline: Duration::from_secs(automation.cycle_deadline_secs),
        };
        params.validate()?;
        Ok(params)
    }

    /// Checks the threshold ordering `0 <= min < max < danger < emergency`
    /// and the sizing fractions.
    ///
    /// # Errors
    /// Returns `CycleError::Validation` describing the first violated rule.
    pub fn validate(&self) -> Result<(), CycleError> {
        if self.ltv_min < Decimal::ZERO {
            return Err(CycleError::Validation(format!(
                "target_ltv_min must be non-negative, got {}",
                self.ltv_min
            )));
        }
        if self.ltv_min >= self.ltv_max
            || self.ltv_max >= self.ltv_danger
            || self.ltv_danger >= self.ltv_emergency
        {
            return Err(CycleError::Validation(format!(
                "LTV thresholds must be strictly ordered min < max < danger < emergency, \
                 got {} / {} / {} / {}",
                self.ltv_min, self.ltv_max, self.ltv_danger, self.ltv_emergency
            )));
        }
        for (name, fraction) in [
            ("repay_fraction_normal", self.repay_fraction_normal),
            ("repay_fraction_danger", self.repay_fraction_danger),
        ] {
            if fraction <= Decimal::ZERO || fraction > Decimal::ONE {
                return Err(CycleError::Validation(format!(
                    "{name} must be in (0, 1], got {fraction}"
                )));
            }
        }
        if self.min_borrow_amount < Decimal::ZERO {
            return Err(CycleError::Validation(format!(
                "min_borrow_amount must be non-negative, got {}",
                self.min_borrow_amount
            )));
        }
        Ok(())
    }

    /// Returns a copy with the portfolio's own LTV band in place of the
    /// configured defaults.
    ///
    /// # Errors
    /// Returns `CycleError::Validation` if the band breaks threshold ordering.
    pub fn with_band(&self, ltv_min: Decimal, ltv_max: Decimal) -> Result<Self, CycleError> {
        let params = Self {
            ltv_min,
            ltv_max,
            ..self.clone()
        };
        params.validate()?;
        Ok(params)
    }

    /// Midpoint of the target band, the leverage-increase target.
    #[must_use]
    pub fn target_ltv(&self) -> Decimal {
        (self.ltv_min + self.ltv_max) / Decimal::TWO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn strategy_config() -> StrategyConfig {
        StrategyConfig {
            asset_a: "ETH".to_string(),
            asset_b: "SOL".to_string(),
            quote: default_quote(),
            target_ltv_min: 0.55,
            target_ltv_max: 0.65,
            danger_ltv: 0.70,
            emergency_ltv: 0.75,
            min_borrow_amount: 0.001,
            repay_fraction_normal: 0.20,
            repay_fraction_danger: 0.50,
            harvest_settle_wait_secs: 1,
            liquidation_settle_wait_secs: 10,
            flexible_products: HashMap::new(),
        }
    }

    fn automation_config() -> AutomationConfig {
        AutomationConfig {
            tick_interval_secs: 300,
            cycle_deadline_secs: 120,
        }
    }

    #[test]
    fn params_from_default_config() {
        let params = StrategyParams::from_config(&strategy_config(), &automation_config()).unwrap();
        assert_eq!(params.ltv_min, dec!(0.55));
        assert_eq!(params.ltv_emergency, dec!(0.75));
        assert_eq!(params.target_ltv(), dec!(0.60));
        assert_eq!(params.cycle_deadline, Duration::from_secs(120));
    }

    #[test]
    fn unordered_thresholds_rejected() {
        let mut config = strategy_config();
        config.danger_ltv = 0.60; // below target_ltv_max
        let result = StrategyParams::from_config(&config, &automation_config());
        assert!(result.is_err());
    }

    #[test]
    fn band_override_revalidates() {
        let params = StrategyParams::from_config(&strategy_config(), &automation_config()).unwrap();

        let narrowed = params.with_band(dec!(0.40), dec!(0.50)).unwrap();
        assert_eq!(narrowed.target_ltv(), dec!(0.45));
        // Danger/emergency thresholds are untouched by a band override.
        assert_eq!(narrowed.ltv_danger, params.ltv_danger);

        assert!(params.with_band(dec!(0.60), dec!(0.58)).is_err());
        assert!(params.with_band(dec!(0.60), dec!(0.72)).is_err());
    }

    #[test]
    fn asset_pair_helpers() {
        let pair = AssetPair::from_config(&strategy_config());
        assert_eq!(pair.symbol("ETH"), "ETHUSDT");
        assert_eq!(pair.other("ETH"), "SOL");
        assert_eq!(pair.other("SOL"), "ETH");
        assert!(pair.contains("SOL"));
        assert!(!pair.contains("BTC"));
    }
}
