//! HTTP client for a local broker gateway.
//!
//! The gateway owns the real broker connection (login, 2FA, websocket feed)
//! and exposes it as a small JSON API. This client only maps that API onto
//! [`BrokerClient`].

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::debug;

use crate::models::{Candle, TradeAction};

use super::broker::BrokerClient;
use super::types::*;

pub const DEFAULT_GATEWAY_URL: &str = "http://127.0.0.1:8710";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Settlement can take the whole option duration
const SETTLEMENT_TIMEOUT: Duration = Duration::from_secs(3600);

/// Broker client backed by the gateway's JSON API.
pub struct GatewayClient {
    client: Client,
    base_url: String,
    email: String,
    password: String,
    last_profit: Mutex<Option<Decimal>>,
}

impl GatewayClient {
    pub fn new(base_url: String, email: String, password: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            email,
            password,
            last_profit: Mutex::new(None),
        })
    }

    /// Build from `BROKER_GATEWAY_URL`, `BROKER_EMAIL` and `BROKER_PASSWORD`.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("BROKER_GATEWAY_URL")
            .unwrap_or_else(|_| DEFAULT_GATEWAY_URL.to_string());
        let email = std::env::var("BROKER_EMAIL").context("BROKER_EMAIL not set")?;
        let password = std::env::var("BROKER_PASSWORD").context("BROKER_PASSWORD not set")?;

        Self::new(base_url, email, password)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn read_json<T: DeserializeOwned>(response: Response, what: &str) -> Result<T, BrokerError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::SERVICE_UNAVAILABLE => {
                    BrokerError::Disconnected(format!("{} - {}", status, body))
                }
                _ => BrokerError::Request(format!("{} request failed: {} - {}", what, status, body)),
            });
        }

        response
            .json()
            .await
            .map_err(|e| BrokerError::InvalidResponse(format!("{}: {}", what, e)))
    }
}

fn transport_error(e: reqwest::Error) -> BrokerError {
    if e.is_connect() {
        BrokerError::Disconnected(e.to_string())
    } else {
        BrokerError::Request(e.to_string())
    }
}

#[async_trait]
impl BrokerClient for GatewayClient {
    fn name(&self) -> &'static str {
        "gateway"
    }

    async fn connect(&self) -> Result<bool, BrokerError> {
        debug!(url = %self.base_url, "Opening gateway session");
        let response = self
            .client
            .post(self.url("/session"))
            .json(&LoginRequest {
                email: &self.email,
                password: &self.password,
            })
            .send()
            .await
            .map_err(transport_error)?;

        let login: LoginResponse = Self::read_json(response, "login").await?;
        if let Some(reason) = &login.reason {
            debug!(reason = %reason, "Gateway login response");
        }
        Ok(login.connected)
    }

    async fn change_account(&self, kind: AccountKind) -> Result<(), BrokerError> {
        let response = self
            .client
            .post(self.url("/account"))
            .json(&AccountRequest { kind })
            .send()
            .await
            .map_err(transport_error)?;

        let _: serde_json::Value = Self::read_json(response, "account").await?;
        Ok(())
    }

    async fn get_balance(&self) -> Result<Decimal, BrokerError> {
        let response = self
            .client
            .get(self.url("/balance"))
            .send()
            .await
            .map_err(transport_error)?;

        let balance: BalanceResponse = Self::read_json(response, "balance").await?;
        Ok(balance.balance)
    }

    async fn all_asset_names(&self) -> Result<Vec<String>, BrokerError> {
        let response = self
            .client
            .get(self.url("/assets"))
            .send()
            .await
            .map_err(transport_error)?;

        Self::read_json(response, "assets").await
    }

    async fn check_asset(&self, symbol: &str) -> Result<Option<AssetStatus>, BrokerError> {
        let response = self
            .client
            .get(self.url(&format!("/assets/{}", symbol)))
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::read_json(response, "asset").await.map(Some)
    }

    async fn get_candles(&self, asset: &str, period_secs: u32) -> Result<Vec<Candle>, BrokerError> {
        let url = self.url(&format!("/candles/{}?period={}", asset, period_secs));
        debug!(url = %url, "Fetching candles");

        let response = self.client.get(&url).send().await.map_err(transport_error)?;
        let items: Vec<CandleResponse> = Self::read_json(response, "candles").await?;

        let mut candles: Vec<Candle> = items.into_iter().map(Candle::from).collect();
        candles.sort_by_key(|c| c.timestamp);
        Ok(candles)
    }

    async fn trade(
        &self,
        action: TradeAction,
        amount: Decimal,
        asset: &str,
        duration_secs: u32,
    ) -> Result<OrderReceipt, BrokerError> {
        let response = self
            .client
            .post(self.url("/orders"))
            .json(&OrderRequest {
                action,
                amount,
                asset,
                duration: duration_secs,
            })
            .send()
            .await
            .map_err(transport_error)?;

        let order: OrderResponse = Self::read_json(response, "order").await?;
        Ok(order.into())
    }

    async fn check_win(&self, trade_id: &str) -> Result<bool, BrokerError> {
        let response = self
            .client
            .get(self.url(&format!("/orders/{}/result", trade_id)))
            .timeout(SETTLEMENT_TIMEOUT)
            .send()
            .await
            .map_err(transport_error)?;

        let result: SettlementResponse = Self::read_json(response, "settlement").await?;
        *self.last_profit.lock().await = Some(result.profit);
        Ok(result.win)
    }

    async fn get_profit(&self) -> Result<Decimal, BrokerError> {
        self.last_profit
            .lock()
            .await
            .take()
            .ok_or_else(|| BrokerError::InvalidResponse("no settled trade to read profit from".into()))
    }

    async fn close(&self) -> Result<(), BrokerError> {
        let response = self
            .client
            .delete(self.url("/session"))
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(BrokerError::Request(format!("logout failed: {}", response.status())));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let client = GatewayClient::new(
            "http://localhost:9000/".to_string(),
            "a@b.c".to_string(),
            "secret".to_string(),
        )
        .unwrap();
        assert_eq!(client.url("/balance"), "http://localhost:9000/balance");
    }

    #[tokio::test]
    async fn test_profit_requires_prior_settlement() {
        let client = GatewayClient::new(
            DEFAULT_GATEWAY_URL.to_string(),
            "a@b.c".to_string(),
            "secret".to_string(),
        )
        .unwrap();
        assert!(client.get_profit().await.is_err());
    }
}
