//! Aggregate win/loss/profit counters for a run.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Running statistics. Only ever incremented, one settlement at a time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyStats {
    pub wins: u32,
    pub losses: u32,
    pub total_profit: Decimal,
}

impl StrategyStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_trades(&self) -> u32 {
        self.wins + self.losses
    }

    /// Win rate as a percentage (0-100). Zero when nothing has settled.
    pub fn win_rate(&self) -> Decimal {
        let total = self.total_trades();
        if total == 0 {
            return Decimal::ZERO;
        }
        Decimal::from(self.wins) / Decimal::from(total) * dec!(100)
    }

    /// Count a win and add its profit.
    pub fn record_win(&mut self, profit: Decimal) {
        self.wins += 1;
        self.total_profit += profit;
    }

    /// Count a loss. The broker may report the loss signed either way,
    /// so the absolute value is always subtracted.
    pub fn record_loss(&mut self, profit: Decimal) {
        self.losses += 1;
        self.total_profit -= profit.abs();
    }
}

impl std::fmt::Display for StrategyStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Run Summary ===")?;
        writeln!(f, "Total trades: {}", self.total_trades())?;
        writeln!(f, "Wins:         {}", self.wins)?;
        writeln!(f, "Losses:       {}", self.losses)?;
        writeln!(f, "Win rate:     {:.2}%", self.win_rate())?;
        writeln!(f, "Total profit: ${:.2}", self.total_profit)?;
        Ok(())
    }
}
