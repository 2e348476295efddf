//! Free-text signal parser.
//!
//! Accepts messages such as `EURUSD CALL 5 120`, `gbpjpy sell` or `BUY`.
//! The first whitespace token that names an action anchors the parse; the
//! token before it is the asset and the two after it are amount and
//! duration. Missing or malformed fields fall back to defaults one by one.

use std::str::FromStr;

use rust_decimal::Decimal;

use crate::models::{Signal, TradeAction};
use crate::trading::normalize_symbol;

pub const DEFAULT_ASSET: &str = "EURUSD";
pub const DEFAULT_AMOUNT: Decimal = Decimal::ONE;
pub const DEFAULT_DURATION_SECS: u32 = 60;

/// Words that make a message look like a signal.
pub const ACTION_KEYWORDS: [&str; 4] = ["CALL", "PUT", "BUY", "SELL"];

/// Parse `text` into a signal. `None` when no token is an action keyword.
pub fn parse(text: &str) -> Option<Signal> {
    let tokens: Vec<&str> = text.split_whitespace().collect();

    let (idx, action) = tokens
        .iter()
        .enumerate()
        .find_map(|(i, token)| TradeAction::from_str(token).ok().map(|action| (i, action)))?;

    let asset = match idx {
        0 => DEFAULT_ASSET.to_string(),
        _ => normalize_symbol(tokens[idx - 1]),
    };

    let amount = tokens
        .get(idx + 1)
        .and_then(|t| Decimal::from_str(t).ok())
        .filter(|a| *a > Decimal::ZERO)
        .unwrap_or(DEFAULT_AMOUNT);

    let duration_secs = tokens
        .get(idx + 2)
        .and_then(|t| t.parse::<u32>().ok())
        .filter(|d| *d > 0)
        .unwrap_or(DEFAULT_DURATION_SECS);

    Some(Signal {
        asset,
        action,
        amount,
        duration_secs,
    })
}

/// Whether `text` mentions an action keyword anywhere, even inside a word.
pub fn mentions_keyword(text: &str) -> bool {
    let upper = text.to_uppercase();
    ACTION_KEYWORDS.iter().any(|k| upper.contains(k))
}
