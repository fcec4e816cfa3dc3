use async_trait::async_trait;
use ltv_guard_core::error::GatewayError;
use ltv_guard_core::traits::{
    AccountInfo, EarnBalances, ExchangeGateway, LoanBalance, OrderSide, SpotBalance, WalletKind,
};
use rust_decimal::Decimal;

use crate::client::BinanceClient;
use crate::models::{AccountResponse, EarnPositionRow, LoanRow, OrderAck, Paged, PriceTicker};

/// [`ExchangeGateway`] over the signed Binance REST API: spot account,
/// Simple Earn, and crypto loans.
pub struct BinanceGateway {
    client: BinanceClient,
}

impl BinanceGateway {
    #[must_use]
    pub const fn new(client: BinanceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ExchangeGateway for BinanceGateway {
    async fn account_info(&self) -> Result<AccountInfo, GatewayError> {
        let body = self.client.get_signed("/api/v3/account", &[]).await?;
        let account: AccountResponse = BinanceClient::decode(body)?;
        Ok(AccountInfo {
            can_trade: account.can_trade,
            balances: account.balances.into_iter().map(Into::into).collect(),
        })
    }

    async fn spot_balances(&self) -> Result<Vec<SpotBalance>, GatewayError> {
        let account = self.account_info().await?;
        Ok(account
            .balances
            .into_iter()
            .filter(|balance| balance.total() > Decimal::ZERO)
            .collect())
    }

    async fn earn_balances(&self) -> Result<EarnBalances, GatewayError> {
        let flexible = self
            .client
            .get_signed("/sapi/v1/simple-earn/flexible/position", &[])
            .await?;
        let flexible: Paged<EarnPositionRow> = BinanceClient::decode(flexible)?;

        let locked = self
            .client
            .get_signed("/sapi/v1/simple-earn/locked/position", &[])
            .await?;
        let locked: Paged<EarnPositionRow> = BinanceClient::decode(locked)?;

        Ok(EarnBalances {
            flexible: flexible.rows.into_iter().map(Into::into).collect(),
            locked: locked.rows.into_iter().map(Into::into).collect(),
        })
    }

    async fn loan_positions(&self) -> Result<Vec<LoanBalance>, GatewayError> {
        let body = self
            .client
            .get_signed("/sapi/v1/loan/ongoing/orders", &[])
            .await?;
        let paged: Paged<LoanRow> = BinanceClient::decode(body)?;
        paged
            .rows
            .into_iter()
            .map(|row| {
                row.into_balance()
                    .map_err(|err| GatewayError::Transient(err.to_string()))
            })
            .collect()
    }

    async fn price(&self, symbol: &str) -> Result<Decimal, GatewayError> {
        let body = self
            .client
            .get_public("/api/v3/ticker/price", &[("symbol", symbol.to_string())])
            .await?;
        let ticker: PriceTicker = BinanceClient::decode(body)?;
        Ok(ticker.price)
    }

    async fn place_spot_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quote_amount: Decimal,
    ) -> Result<String, GatewayError> {
        let body = self
            .client
            .post_signed(
                "/api/v3/order",
                &[
                    ("symbol", symbol.to_string()),
                    ("side", side.as_str().to_string()),
                    ("type", "MARKET".to_string()),
                    ("quoteOrderQty", quote_amount.to_string()),
                ],
            )
            .await?;
        let ack: OrderAck = BinanceClient::decode(body)?;
        Ok(ack.order_id_string())
    }

    async fn borrow(
        &self,
        asset: &str,
        amount: Decimal,
        collateral_asset: &str,
    ) -> Result<String, GatewayError> {
        let body = self
            .client
            .post_signed(
                "/sapi/v1/loan/borrow",
                &[
                    ("loanCoin", asset.to_string()),
                    ("loanAmount", amount.to_string()),
                    ("collateralCoin", collateral_asset.to_string()),
                ],
            )
            .await?;
        let ack: OrderAck = BinanceClient::decode(body)?;
        Ok(ack.order_id_string())
    }

    async fn repay(&self, order_id: &str, amount: Decimal) -> Result<(), GatewayError> {
        self.client
            .post_signed(
                "/sapi/v1/loan/repay",
                &[
                    ("orderId", order_id.to_string()),
                    ("amount", amount.to_string()),
                ],
            )
            .await?;
        Ok(())
    }

    async fn subscribe_earn(
        &self,
        product_id: &str,
        amount: Decimal,
    ) -> Result<(), GatewayError> {
        self.client
            .post_signed(
                "/sapi/v1/simple-earn/flexible/subscribe",
                &[
                    ("productId", product_id.to_string()),
                    ("amount", amount.to_string()),
                ],
            )
            .await?;
        Ok(())
    }

    async fn redeem_earn(&self, product_id: &str, amount: Decimal) -> Result<(), GatewayError> {
        self.client
            .post_signed(
                "/sapi/v1/simple-earn/flexible/redeem",
                &[
                    ("productId", product_id.to_string()),
                    ("amount", amount.to_string()),
                    ("type", "FAST".to_string()),
                ],
            )
            .await?;
        Ok(())
    }

    async fn transfer(
        &self,
        asset: &str,
        amount: Decimal,
        from: WalletKind,
        to: WalletKind,
    ) -> Result<(), GatewayError> {
        self.client
            .post_signed(
                "/sapi/v1/asset/transfer",
                &[
                    ("asset", asset.to_string()),
                    ("amount", amount.to_string()),
                    ("fromWallet", from.as_str().to_string()),
                    ("toWallet", to.as_str().to_string()),
                ],
            )
            .await?;
        Ok(())
    }
}
