//! Trade signal parsed from free text.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::TradeAction;

/// A structured trade request. Built once per parse, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub asset: String,
    pub action: TradeAction,
    pub amount: Decimal,
    pub duration_secs: u32,
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Asset: {}", self.asset)?;
        writeln!(f, "Action: {}", self.action)?;
        writeln!(f, "Amount: ${}", self.amount)?;
        write!(f, "Duration: {}s", self.duration_secs)
    }
}
