//! Pure LTV risk math: ratio calculation, tier classification, and
//! borrow/repay sizing. No I/O and no hidden state, so cycle decisions are
//! deterministic given a snapshot.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::{AssetPair, StrategyParams};
use crate::models::AssetValuation;

/// Loan-to-value ratio. Zero whenever there is no collateral, regardless of
/// the borrowed value.
#[must_use]
pub fn loan_to_value(collateral_value: Decimal, borrowed_value: Decimal) -> Decimal {
    if collateral_value <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    borrowed_value / collateral_value
}

/// Risk classification of a portfolio's current LTV against the four ordered
/// thresholds `min < max < danger < emergency`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RiskTier {
    /// LTV below the target band; leverage may be increased.
    UnderLevered,
    /// LTV inside the target band; harvest yield, leave leverage alone.
    Safe,
    /// LTV above the band but below danger; deleverage gently.
    OverLevered,
    /// LTV at or above the danger threshold; deleverage aggressively.
    Danger,
    /// LTV at or above the emergency threshold; unwind everything.
    Emergency,
}

impl RiskTier {
    /// Maps an LTV to its tier. Total over every non-negative ratio and
    /// memoryless: evaluated fresh each cycle, not edge-triggered.
    #[must_use]
    pub fn classify(ltv: Decimal, params: &StrategyParams) -> Self {
        if ltv >= params.ltv_emergency {
            Self::Emergency
        } else if ltv >= params.ltv_danger {
            Self::Danger
        } else if ltv > params.ltv_max {
            Self::OverLevered
        } else if ltv >= params.ltv_min {
            Self::Safe
        } else {
            Self::UnderLevered
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnderLevered => "under_levered",
            Self::Safe => "safe",
            Self::OverLevered => "over_levered",
            Self::Danger => "danger",
            Self::Emergency => "emergency",
        }
    }
}

/// One side of a two-asset borrow, independently failable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BorrowLeg {
    pub asset: String,
    pub collateral_asset: String,
    pub amount: Decimal,
    pub usd_value: Decimal,
}

/// USD value of additional borrowing needed to lift the portfolio to
/// `target_ltv`. Non-positive results mean no borrow is needed.
#[must_use]
pub fn additional_borrow_needed(
    collateral_value: Decimal,
    borrowed_value: Decimal,
    target_ltv: Decimal,
) -> Decimal {
    collateral_value * target_ltv - borrowed_value
}

/// Splits an additional borrow 50/50 by USD value across the two strategy
/// assets and converts each half into an asset amount at current prices.
///
/// Legs that would fall at or below `min_borrow_amount` are dropped rather
/// than sent to the venue, as are legs with no usable price. Never yields a
/// negative amount: a non-positive `additional_usd` produces no legs.
#[must_use]
pub fn split_borrow_legs(
    additional_usd: Decimal,
    valuations: &[AssetValuation],
    pair: &AssetPair,
    min_borrow_amount: Decimal,
) -> Vec<BorrowLeg> {
    if additional_usd <= Decimal::ZERO {
        return Vec::new();
    }

    let per_leg_usd = additional_usd / Decimal::TWO;
    let mut legs = Vec::with_capacity(2);
    for valuation in valuations {
        if valuation.price <= Decimal::ZERO {
            continue;
        }
        let amount = per_leg_usd / valuation.price;
        if amount <= min_borrow_amount {
            continue;
        }
        legs.push(BorrowLeg {
            asset: valuation.asset.clone(),
            collateral_asset: pair.other(&valuation.asset).to_string(),
            amount,
            usd_value: per_leg_usd,
        });
    }
    legs
}

/// Sizes one loan repayment as a fraction of its outstanding amount.
#[must_use]
pub fn repay_amount(outstanding: Decimal, fraction: Decimal) -> Decimal {
    outstanding * fraction
}
