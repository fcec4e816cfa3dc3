//! Typed response payloads for the endpoints the gateway consumes.
//!
//! Binance serializes numbers as strings; `rust_decimal`'s deserializer
//! accepts both. Conversions into the core value objects live here so the
//! rest of the system never sees raw JSON.

use ltv_guard_core::models::LoanStatus;
use ltv_guard_core::traits::{EarnBalance, LoanBalance, SpotBalance};
use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AccountResponse {
    #[serde(default, rename = "canTrade")]
    pub can_trade: bool,
    #[serde(default)]
    pub balances: Vec<BalanceRow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BalanceRow {
    pub asset: String,
    pub free: Decimal,
    pub locked: Decimal,
}

impl From<BalanceRow> for SpotBalance {
    fn from(row: BalanceRow) -> Self {
        Self {
            asset: row.asset,
            free: row.free,
            locked: row.locked,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceTicker {
    pub symbol: String,
    pub price: Decimal,
}

/// Paged `{"rows": [...], "total": n}` envelope used by the sapi endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct Paged<T> {
    #[serde(default)]
    pub rows: Vec<T>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EarnPositionRow {
    pub asset: String,
    pub product_id: String,
    pub total_amount: Decimal,
    #[serde(default)]
    pub free_amount: Decimal,
}

impl From<EarnPositionRow> for EarnBalance {
    fn from(row: EarnPositionRow) -> Self {
        Self {
            asset: row.asset,
            product_id: row.product_id,
            total_amount: row.total_amount,
            free_amount: row.free_amount,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanRow {
    pub order_id: serde_json::Value,
    pub loan_coin: String,
    pub status: String,
    pub total_amount: Decimal,
}

impl LoanRow {
    /// Validates the row into the core loan value object. Unknown statuses
    /// are rejected at the boundary instead of leaking inward.
    pub fn into_balance(self) -> anyhow::Result<LoanBalance> {
        let status = match self.status.as_str() {
            "BORROWING" => LoanStatus::Borrowing,
            "REPAID" => LoanStatus::Repaid,
            "LIQUIDATED" => LoanStatus::Liquidated,
            other => anyhow::bail!("unknown loan status from venue: {other}"),
        };
        // The venue spells order ids both as numbers and strings.
        let order_id = match self.order_id {
            serde_json::Value::String(id) => id,
            serde_json::Value::Number(id) => id.to_string(),
            other => anyhow::bail!("unexpected orderId shape: {other}"),
        };
        Ok(LoanBalance {
            order_id,
            loan_asset: self.loan_coin,
            outstanding: self.total_amount,
            status,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAck {
    pub order_id: serde_json::Value,
}

impl OrderAck {
    #[must_use]
    pub fn order_id_string(&self) -> String {
        match &self.order_id {
            serde_json::Value::String(id) => id.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn balances_parse_string_numbers() {
        let account: AccountResponse = serde_json::from_value(json!({
            "canTrade": true,
            "balances": [
                {"asset": "ETH", "free": "1.20000000", "locked": "0.00000000"},
                {"asset": "SOL", "free": "15.5", "locked": "0.5"}
            ]
        }))
        .unwrap();
        assert!(account.can_trade);
        assert_eq!(account.balances.len(), 2);
        assert_eq!(account.balances[0].free, dec!(1.2));
        assert_eq!(account.balances[1].locked, dec!(0.5));
    }

    #[test]
    fn earn_rows_default_missing_free_amount() {
        let paged: Paged<EarnPositionRow> = serde_json::from_value(json!({
            "rows": [
                {"asset": "ETH", "productId": "ETH001", "totalAmount": "2.5", "freeAmount": "2.5"},
                {"asset": "SOL", "productId": "SOL-L90", "totalAmount": "10"}
            ],
            "total": 2
        }))
        .unwrap();
        assert_eq!(paged.rows[0].free_amount, dec!(2.5));
        assert_eq!(paged.rows[1].free_amount, Decimal::ZERO);
    }

    #[test]
    fn loan_rows_validate_status_and_order_id() {
        let row: LoanRow = serde_json::from_value(json!({
            "orderId": 100000001,
            "loanCoin": "ETH",
            "status": "BORROWING",
            "totalAmount": "1.5"
        }))
        .unwrap();
        let balance = row.into_balance().unwrap();
        assert_eq!(balance.order_id, "100000001");
        assert_eq!(balance.status, LoanStatus::Borrowing);
        assert_eq!(balance.outstanding, dec!(1.5));

        let bad: LoanRow = serde_json::from_value(json!({
            "orderId": "x",
            "loanCoin": "ETH",
            "status": "DEFAULTED",
            "totalAmount": "1.5"
        }))
        .unwrap();
        assert!(bad.into_balance().is_err());
    }

    #[test]
    fn price_ticker_parses() {
        let ticker: PriceTicker =
            serde_json::from_value(json!({"symbol": "ETHUSDT", "price": "2001.23"})).unwrap();
        assert_eq!(ticker.symbol, "ETHUSDT");
        assert_eq!(ticker.price, dec!(2001.23));
    }
}
