//! Trade model: a binary option order from submission to settlement.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Direction of a binary option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    /// Price will finish above the entry price
    Call,
    /// Price will finish below the entry price
    Put,
}

impl TradeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::Call => "CALL",
            TradeAction::Put => "PUT",
        }
    }

    /// The opposite direction.
    pub fn flip(self) -> Self {
        match self {
            TradeAction::Call => TradeAction::Put,
            TradeAction::Put => TradeAction::Call,
        }
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeAction {
    type Err = TradeError;

    /// Accepts CALL/PUT and the BUY/SELL aliases, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "CALL" | "BUY" => Ok(TradeAction::Call),
            "PUT" | "SELL" => Ok(TradeAction::Put),
            _ => Err(TradeError::UnknownAction(s.to_string())),
        }
    }
}

/// Final result of a settled trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win,
    Loss,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Win => f.write_str("WIN"),
            Outcome::Loss => f.write_str("LOSS"),
        }
    }
}

/// Lifecycle status. Moves from `Pending` to a terminal state exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Pending,
    Win,
    Loss,
}

impl TradeStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TradeStatus::Pending)
    }
}

impl From<Outcome> for TradeStatus {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Win => TradeStatus::Win,
            Outcome::Loss => TradeStatus::Loss,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TradeError {
    #[error("unknown trade action '{0}', expected CALL, PUT, BUY or SELL")]
    UnknownAction(String),

    #[error("trade {id} is already settled as {status:?}")]
    AlreadySettled { id: String, status: TradeStatus },
}

/// A submitted order tracked by the executor until settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    /// Broker-assigned trade identifier
    pub id: String,

    /// Symbol actually traded (may be the OTC variant)
    pub asset: String,

    pub action: TradeAction,

    /// Stake in account currency
    pub amount: Decimal,

    /// Option duration in seconds
    pub duration_secs: u32,

    pub entry_time: DateTime<Utc>,

    pub expiry_time: DateTime<Utc>,

    pub status: TradeStatus,

    /// Signed profit, set only on settlement
    pub profit: Option<Decimal>,
}

impl Trade {
    /// Create a pending trade entered now.
    pub fn new(
        id: String,
        asset: String,
        action: TradeAction,
        amount: Decimal,
        duration_secs: u32,
    ) -> Self {
        let entry_time = Utc::now();
        Self {
            id,
            asset,
            action,
            amount,
            duration_secs,
            entry_time,
            expiry_time: entry_time + Duration::seconds(i64::from(duration_secs)),
            status: TradeStatus::Pending,
            profit: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == TradeStatus::Pending
    }

    /// Record the settlement. Fails without side effects if already settled.
    pub fn settle(&mut self, outcome: Outcome, profit: Decimal) -> Result<(), TradeError> {
        if self.status.is_terminal() {
            return Err(TradeError::AlreadySettled {
                id: self.id.clone(),
                status: self.status,
            });
        }
        self.status = outcome.into();
        self.profit = Some(profit);
        Ok(())
    }

    /// Time left until expiry, zero once expired.
    pub fn time_to_expiry(&self) -> std::time::Duration {
        (self.expiry_time - Utc::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO)
    }
}
