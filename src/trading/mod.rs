//! Trading logic: indicators, strategies, position sizing, execution.

mod config;
mod engine;
mod executor;
pub mod indicators;
mod position_sizer;
mod strategy;

pub use config::{
    validate_max_step, EngineConfig, ExecutorConfig, MartingaleConfig, RetryPolicy, RsiConfig,
    SmaConfig,
};
pub use engine::StrategyEngine;
pub use executor::{normalize_symbol, ExecutionError, TradeExecutor};
pub use position_sizer::{PositionSizer, SizingMethod};
pub use strategy::{MartingaleDirection, RsiReversion, SmaCrossover, Strategy};
