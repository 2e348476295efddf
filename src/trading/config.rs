//! Trading configuration.

use std::time::Duration;

use anyhow::{ensure, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::models::TradeAction;

/// Upper bound on martingale steps so the largest stake stays representable.
pub const MAX_MARTINGALE_STEP: u32 = 32;

/// Longest indicator lookback accepted, in candles.
pub const MAX_INDICATOR_PERIOD: usize = 1000;

/// How the engine retries a failed candle fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Pause before the next attempt (seconds)
    pub pause_secs: u64,

    /// Consecutive failures tolerated; `None` retries forever
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub fn pause(&self) -> Duration {
        Duration::from_secs(self.pause_secs)
    }

    /// Whether `failures` consecutive failures exhaust the policy.
    pub fn is_exhausted(&self, failures: u32) -> bool {
        self.max_attempts.is_some_and(|max| failures >= max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            pause_secs: 5,
            max_attempts: None,
        }
    }
}

/// Run parameters shared by every strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Base symbol; the OTC variant is used when it is closed
    pub asset: String,

    /// Base stake per trade
    pub amount: Decimal,

    /// Option duration (seconds)
    pub duration_secs: u32,

    /// Settled trades after which the run completes
    pub max_trades: u32,

    /// Wait between cycles (seconds)
    pub poll_interval_secs: u64,

    /// Candle bucket size (seconds)
    pub candle_period_secs: u32,

    /// Consecutive executions that may end without a settlement
    pub max_failed_trades: u32,

    pub retry: RetryPolicy,
}

impl EngineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.asset.trim().is_empty(), "asset must not be empty");
        ensure!(self.amount > Decimal::ZERO, "amount must be positive, got {}", self.amount);
        ensure!(self.duration_secs > 0, "duration must be positive");
        ensure!(self.max_trades > 0, "max trades must be positive");
        ensure!(self.candle_period_secs > 0, "candle period must be positive");
        ensure!(self.max_failed_trades > 0, "max failed trades must be positive");
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            asset: "EURUSD".to_string(),
            amount: dec!(1),
            duration_secs: 60,
            max_trades: 5,
            poll_interval_secs: 70,
            candle_period_secs: 60,
            max_failed_trades: 3,
            retry: RetryPolicy::default(),
        }
    }
}

/// Moving-average crossover parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmaConfig {
    pub short_period: usize,
    pub long_period: usize,
}

impl SmaConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            (1..=MAX_INDICATOR_PERIOD).contains(&self.short_period),
            "short period must be between 1 and {}, got {}",
            MAX_INDICATOR_PERIOD,
            self.short_period
        );
        ensure!(
            (1..=MAX_INDICATOR_PERIOD).contains(&self.long_period),
            "long period must be between 1 and {}, got {}",
            MAX_INDICATOR_PERIOD,
            self.long_period
        );
        Ok(())
    }
}

impl Default for SmaConfig {
    fn default() -> Self {
        Self {
            short_period: 5,
            long_period: 20,
        }
    }
}

/// RSI reversion parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RsiConfig {
    pub period: usize,
    /// Buy at or below this value
    pub oversold: Decimal,
    /// Sell at or above this value
    pub overbought: Decimal,
}

impl RsiConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            (1..=MAX_INDICATOR_PERIOD).contains(&self.period),
            "RSI period must be between 1 and {}, got {}",
            MAX_INDICATOR_PERIOD,
            self.period
        );
        ensure!(
            self.oversold < self.overbought,
            "oversold threshold ({}) must be below overbought threshold ({})",
            self.oversold,
            self.overbought
        );
        ensure!(
            self.oversold >= Decimal::ZERO && self.overbought <= dec!(100),
            "RSI thresholds must lie within 0-100"
        );
        Ok(())
    }
}

impl Default for RsiConfig {
    fn default() -> Self {
        Self {
            period: 14,
            oversold: dec!(30),
            overbought: dec!(70),
        }
    }
}

/// Martingale strategy parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MartingaleConfig {
    pub max_step: u32,
    pub initial_direction: TradeAction,
    /// Flip the direction after each win
    pub flip_on_win: bool,
}

impl MartingaleConfig {
    pub fn validate(&self) -> Result<()> {
        validate_max_step(self.max_step)
    }
}

impl Default for MartingaleConfig {
    fn default() -> Self {
        Self {
            max_step: 4,
            initial_direction: TradeAction::Call,
            flip_on_win: true,
        }
    }
}

pub fn validate_max_step(max_step: u32) -> Result<()> {
    ensure!(
        (1..=MAX_MARTINGALE_STEP).contains(&max_step),
        "max step must be between 1 and {}, got {}",
        MAX_MARTINGALE_STEP,
        max_step
    );
    Ok(())
}

/// Order submission and settlement settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Extra wait after expiry before asking for the result (seconds)
    pub settlement_buffer_secs: u64,

    /// Longest wait for the broker's result once asked (seconds)
    pub settlement_timeout_secs: u64,
}

impl ExecutorConfig {
    pub fn settlement_buffer(&self) -> Duration {
        Duration::from_secs(self.settlement_buffer_secs)
    }

    pub fn settlement_timeout(&self) -> Duration {
        Duration::from_secs(self.settlement_timeout_secs)
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            settlement_buffer_secs: 2,
            settlement_timeout_secs: 120,
        }
    }
}
