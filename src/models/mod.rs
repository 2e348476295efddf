//! Data models for candles, trades, signals, and run statistics.

mod candle;
mod signal;
mod stats;
mod trade;

pub use candle::{closes, Candle};
pub use signal::Signal;
pub use stats::StrategyStats;
pub use trade::{Outcome, Trade, TradeAction, TradeStatus};
