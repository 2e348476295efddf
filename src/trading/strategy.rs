//! Trading strategies: when to enter and in which direction.
//!
//! A strategy only decides. Sizing lives in [`super::PositionSizer`] and
//! order handling in [`super::TradeExecutor`], so every variant here can be
//! combined with any sizing method.

use tracing::{debug, info};

use crate::models::{closes, Candle, Outcome, TradeAction};

use super::config::{MartingaleConfig, RsiConfig, SmaConfig};
use super::indicators::{rsi, sma};

/// Why a cycle produced no trade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HoldReason {
    /// Not enough candles for the indicator
    InsufficientData { have: usize, need: usize },
    /// Indicator inside its neutral zone (or a tie)
    Neutral,
}

/// Result of evaluating one candle window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Enter(TradeAction),
    Hold(HoldReason),
}

impl Decision {
    pub fn action(&self) -> Option<TradeAction> {
        match self {
            Decision::Enter(action) => Some(*action),
            Decision::Hold(_) => None,
        }
    }
}

/// Decision policy run by the engine each cycle.
pub trait Strategy: Send {
    fn name(&self) -> &'static str;

    /// Parameter summary for logs
    fn describe(&self) -> String;

    /// `false` for strategies that never look at candles.
    fn uses_market_data(&self) -> bool {
        true
    }

    /// Evaluate the latest candle window (oldest first).
    fn decide(&self, window: &[Candle]) -> Decision;

    /// Feedback after each settled trade.
    fn on_settlement(&mut self, _outcome: Outcome) {}
}

/// Short/long moving-average crossover.
pub struct SmaCrossover {
    config: SmaConfig,
}

impl SmaCrossover {
    pub fn new(config: SmaConfig) -> Self {
        Self { config }
    }
}

impl Strategy for SmaCrossover {
    fn name(&self) -> &'static str {
        "SMA"
    }

    fn describe(&self) -> String {
        format!(
            "Short MA={}, Long MA={}",
            self.config.short_period, self.config.long_period
        )
    }

    fn decide(&self, window: &[Candle]) -> Decision {
        let prices = closes(window);
        let need = self.config.long_period.max(self.config.short_period);
        let Some(pair) = sma(&prices, self.config.short_period, self.config.long_period) else {
            return Decision::Hold(HoldReason::InsufficientData {
                have: prices.len(),
                need,
            });
        };

        info!(short_ma = %pair.short.round_dp(5), long_ma = %pair.long.round_dp(5), "Moving averages");

        if pair.short > pair.long {
            Decision::Enter(TradeAction::Call)
        } else if pair.short < pair.long {
            Decision::Enter(TradeAction::Put)
        } else {
            Decision::Hold(HoldReason::Neutral)
        }
    }
}

/// Mean reversion on RSI extremes: buy oversold, sell overbought.
pub struct RsiReversion {
    config: RsiConfig,
}

impl RsiReversion {
    pub fn new(config: RsiConfig) -> Self {
        Self { config }
    }
}

impl Strategy for RsiReversion {
    fn name(&self) -> &'static str {
        "RSI"
    }

    fn describe(&self) -> String {
        format!(
            "RSI Period={}, Oversold={}, Overbought={}",
            self.config.period, self.config.oversold, self.config.overbought
        )
    }

    fn decide(&self, window: &[Candle]) -> Decision {
        let prices = closes(window);
        let Some(value) = rsi(&prices, self.config.period) else {
            return Decision::Hold(HoldReason::InsufficientData {
                have: prices.len(),
                need: self.config.period.saturating_add(1),
            });
        };

        info!(rsi = %value.round_dp(2), "Current RSI");

        if value <= self.config.oversold {
            Decision::Enter(TradeAction::Call)
        } else if value >= self.config.overbought {
            Decision::Enter(TradeAction::Put)
        } else {
            Decision::Hold(HoldReason::Neutral)
        }
    }
}

/// Market-blind strategy for martingale runs: trades every cycle in the
/// carried direction, flipping it after a win.
pub struct MartingaleDirection {
    direction: TradeAction,
    flip_on_win: bool,
}

impl MartingaleDirection {
    pub fn new(config: &MartingaleConfig) -> Self {
        Self {
            direction: config.initial_direction,
            flip_on_win: config.flip_on_win,
        }
    }

    pub fn direction(&self) -> TradeAction {
        self.direction
    }
}

impl Strategy for MartingaleDirection {
    fn name(&self) -> &'static str {
        "Martingale"
    }

    fn describe(&self) -> String {
        format!(
            "Direction={}, Flip on win={}",
            self.direction, self.flip_on_win
        )
    }

    fn uses_market_data(&self) -> bool {
        false
    }

    fn decide(&self, _window: &[Candle]) -> Decision {
        Decision::Enter(self.direction)
    }

    fn on_settlement(&mut self, outcome: Outcome) {
        if outcome == Outcome::Win && self.flip_on_win {
            self.direction = self.direction.flip();
            debug!(direction = %self.direction, "Flipped direction after win");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::candles_from_closes;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn window(values: &[i64]) -> Vec<Candle> {
        let closes: Vec<Decimal> = values.iter().map(|v| Decimal::from(*v)).collect();
        candles_from_closes(&closes)
    }

    fn sma_strategy() -> SmaCrossover {
        SmaCrossover::new(SmaConfig {
            short_period: 2,
            long_period: 4,
        })
    }

    #[test]
    fn test_sma_call_when_short_above_long() {
        let decision = sma_strategy().decide(&window(&[1, 2, 3, 4]));
        assert_eq!(decision, Decision::Enter(TradeAction::Call));
    }

    #[test]
    fn test_sma_put_when_short_below_long() {
        let decision = sma_strategy().decide(&window(&[4, 3, 2, 1]));
        assert_eq!(decision, Decision::Enter(TradeAction::Put));
    }

    #[test]
    fn test_sma_tie_holds_and_is_idempotent() {
        let strategy = sma_strategy();
        let candles = window(&[5, 5, 5, 5, 5]);
        for _ in 0..3 {
            assert_eq!(strategy.decide(&candles), Decision::Hold(HoldReason::Neutral));
        }
    }

    #[test]
    fn test_sma_insufficient_data() {
        let decision = sma_strategy().decide(&window(&[1, 2, 3]));
        assert_eq!(
            decision,
            Decision::Hold(HoldReason::InsufficientData { have: 3, need: 4 })
        );
    }

    #[test]
    fn test_rsi_thresholds() {
        let strategy = RsiReversion::new(RsiConfig {
            period: 3,
            ..Default::default()
        });

        // Straight down: RSI 0, oversold.
        assert_eq!(strategy.decide(&window(&[10, 9, 8, 7])), Decision::Enter(TradeAction::Call));
        // Straight up: RSI 100, overbought.
        assert_eq!(strategy.decide(&window(&[7, 8, 9, 10])), Decision::Enter(TradeAction::Put));
        // Gains 3, losses 2 over three deltas: RSI 60, neutral.
        assert_eq!(strategy.decide(&window(&[10, 13, 11, 11])), Decision::Hold(HoldReason::Neutral));
    }

    #[test]
    fn test_rsi_huge_period_holds() {
        let strategy = RsiReversion::new(RsiConfig {
            period: usize::MAX,
            ..Default::default()
        });
        assert_eq!(
            strategy.decide(&window(&[1, 2, 3])),
            Decision::Hold(HoldReason::InsufficientData {
                have: 3,
                need: usize::MAX
            })
        );
    }

    #[test]
    fn test_rsi_boundaries_are_inclusive() {
        let strategy = RsiReversion::new(RsiConfig {
            period: 3,
            oversold: dec!(25),
            overbought: dec!(75),
        });
        // Gains 3, loss 1: RSI exactly 75.
        assert_eq!(strategy.decide(&window(&[10, 13, 12, 12])), Decision::Enter(TradeAction::Put));
        // Gain 1, losses 3: RSI exactly 25.
        assert_eq!(strategy.decide(&window(&[12, 13, 10, 10])), Decision::Enter(TradeAction::Call));
    }

    #[test]
    fn test_martingale_direction_flips_only_on_win() {
        let mut strategy = MartingaleDirection::new(&MartingaleConfig::default());
        assert!(!strategy.uses_market_data());
        assert_eq!(strategy.decide(&[]), Decision::Enter(TradeAction::Call));

        strategy.on_settlement(Outcome::Loss);
        assert_eq!(strategy.direction(), TradeAction::Call);

        strategy.on_settlement(Outcome::Win);
        assert_eq!(strategy.decide(&[]), Decision::Enter(TradeAction::Put));
    }

    #[test]
    fn test_martingale_direction_without_flip() {
        let mut strategy = MartingaleDirection::new(&MartingaleConfig {
            flip_on_win: false,
            initial_direction: TradeAction::Put,
            ..Default::default()
        });
        strategy.on_settlement(Outcome::Win);
        assert_eq!(strategy.direction(), TradeAction::Put);
    }
}
