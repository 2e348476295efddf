//! Broker-facing types and gateway wire formats.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Candle, TradeAction};

/// Failures reported by a broker client.
#[derive(Debug, Clone, Error)]
pub enum BrokerError {
    /// The broker refused the session (bad credentials, 2FA, maintenance)
    #[error("failed to connect to broker")]
    ConnectionFailed,

    /// The session dropped and cannot be used any more
    #[error("broker session disconnected: {0}")]
    Disconnected(String),

    /// A single request failed; the session is still usable
    #[error("broker request failed: {0}")]
    Request(String),

    /// The broker answered with something we could not interpret
    #[error("invalid broker response: {0}")]
    InvalidResponse(String),
}

impl BrokerError {
    /// Errors after which no further broker calls make sense.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BrokerError::ConnectionFailed | BrokerError::Disconnected(_))
    }
}

/// Account the session trades on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountKind {
    Practice,
    Real,
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountKind::Practice => f.write_str("PRACTICE"),
            AccountKind::Real => f.write_str("REAL"),
        }
    }
}

impl FromStr for AccountKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "practice" | "demo" => Ok(AccountKind::Practice),
            "real" | "live" => Ok(AccountKind::Real),
            other => Err(format!("unknown account kind '{}'", other)),
        }
    }
}

/// Availability of a tradable symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetStatus {
    pub id: u32,
    pub name: String,
    pub is_open: bool,
}

/// Broker acknowledgement of an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub success: bool,
    #[serde(default)]
    pub trade_id: Option<String>,
    #[serde(default)]
    pub message: String,
}

impl OrderReceipt {
    pub fn accepted(trade_id: impl Into<String>) -> Self {
        Self {
            success: true,
            trade_id: Some(trade_id.into()),
            message: String::new(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            trade_id: None,
            message: message.into(),
        }
    }
}

// === Gateway wire formats ===

/// Body of `POST /session`.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Response of `POST /session`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub connected: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Body of `POST /account`.
#[derive(Debug, Clone, Serialize)]
pub struct AccountRequest {
    pub kind: AccountKind,
}

/// Response of `GET /balance`.
#[derive(Debug, Clone, Deserialize)]
pub struct BalanceResponse {
    pub balance: Decimal,
}

/// One element of `GET /candles/{asset}`.
#[derive(Debug, Clone, Deserialize)]
pub struct CandleResponse {
    /// Unix seconds
    pub time: i64,
    pub open: Decimal,
    pub close: Decimal,
    #[serde(alias = "max")]
    pub high: Decimal,
    #[serde(alias = "min")]
    pub low: Decimal,
}

impl From<CandleResponse> for Candle {
    fn from(c: CandleResponse) -> Self {
        Candle::from_unix(c.time, c.open, c.close, c.high, c.low)
    }
}

/// Body of `POST /orders`.
#[derive(Debug, Clone, Serialize)]
pub struct OrderRequest<'a> {
    pub action: TradeAction,
    pub amount: Decimal,
    pub asset: &'a str,
    pub duration: u32,
}

/// Response of `POST /orders`.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderResponse {
    pub success: bool,
    #[serde(default)]
    pub info: OrderInfo,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderInfo {
    /// Ids come back as numbers from some brokers and strings from others
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub message: Option<String>,
}

impl From<OrderResponse> for OrderReceipt {
    fn from(r: OrderResponse) -> Self {
        let trade_id = r.info.id.and_then(|v| match v {
            serde_json::Value::String(s) => Some(s),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        });
        OrderReceipt {
            success: r.success && trade_id.is_some(),
            trade_id,
            message: r.info.message.unwrap_or_default(),
        }
    }
}

/// Response of `GET /orders/{id}/result`.
#[derive(Debug, Clone, Deserialize)]
pub struct SettlementResponse {
    pub win: bool,
    pub profit: Decimal,
}
