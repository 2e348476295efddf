//! Candle (OHLC price bar) model.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Aggregated price bar for a fixed time bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Bucket start
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub close: Decimal,
    pub high: Decimal,
    pub low: Decimal,
}

impl Candle {
    /// Build a candle from a unix timestamp in seconds.
    pub fn from_unix(ts: i64, open: Decimal, close: Decimal, high: Decimal, low: Decimal) -> Self {
        Self {
            timestamp: Utc.timestamp_opt(ts, 0).single().unwrap_or_else(Utc::now),
            open,
            close,
            high,
            low,
        }
    }
}

/// Close prices of a candle series, oldest first.
pub fn closes(candles: &[Candle]) -> Vec<Decimal> {
    candles.iter().map(|c| c.close).collect()
}
