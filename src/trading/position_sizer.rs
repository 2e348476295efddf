//! Position sizing: fixed stake or martingale with a loss-streak cap.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::models::Outcome;

/// Position sizing method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum SizingMethod {
    /// Always stake the base amount
    Fixed,
    /// Double after each loss, reset after a win or after `max_step` losses
    Martingale { max_step: u32 },
}

impl fmt::Display for SizingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizingMethod::Fixed => f.write_str("fixed"),
            SizingMethod::Martingale { max_step } => write!(f, "martingale (max step {})", max_step),
        }
    }
}

/// Stateful stake calculator, fed one settlement at a time.
///
/// For martingale sizing `current_amount == base_amount * 2^current_step`
/// holds after every update, with `current_step < max_step`.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionSizer {
    method: SizingMethod,
    base_amount: Decimal,
    current_step: u32,
    current_amount: Decimal,
}

impl PositionSizer {
    pub fn new(method: SizingMethod, base_amount: Decimal) -> Self {
        Self {
            method,
            base_amount,
            current_step: 0,
            current_amount: base_amount,
        }
    }

    pub fn fixed(base_amount: Decimal) -> Self {
        Self::new(SizingMethod::Fixed, base_amount)
    }

    pub fn martingale(base_amount: Decimal, max_step: u32) -> Self {
        Self::new(SizingMethod::Martingale { max_step: max_step.max(1) }, base_amount)
    }

    pub fn method(&self) -> SizingMethod {
        self.method
    }

    pub fn base_amount(&self) -> Decimal {
        self.base_amount
    }

    pub fn current_step(&self) -> u32 {
        self.current_step
    }

    /// Stake for the next trade.
    pub fn current_amount(&self) -> Decimal {
        self.current_amount
    }

    /// Apply a settled outcome to the sizing state.
    pub fn record(&mut self, outcome: Outcome) {
        let SizingMethod::Martingale { max_step } = self.method else {
            return;
        };

        match outcome {
            Outcome::Win => {
                if self.current_step > 0 {
                    info!(base = %self.base_amount, "Win, resetting stake to base amount");
                }
                self.reset();
            }
            Outcome::Loss if self.current_step + 1 >= max_step => {
                info!(max_step = max_step, base = %self.base_amount, "Reached max step, resetting stake to base amount");
                self.reset();
            }
            Outcome::Loss => {
                self.current_step += 1;
                self.current_amount = doubled(self.base_amount, self.current_step);
                info!(step = self.current_step, amount = %self.current_amount, "Loss, increasing stake");
            }
        }
    }

    /// Total stake lost by the longest loss streak before the cap resets it:
    /// `base_amount * (2^max_step - 1)`.
    pub fn worst_case_streak_cost(&self) -> Decimal {
        match self.method {
            SizingMethod::Fixed => self.base_amount,
            SizingMethod::Martingale { max_step } => {
                (0..max_step).map(|step| doubled(self.base_amount, step)).sum()
            }
        }
    }

    fn reset(&mut self) {
        self.current_step = 0;
        self.current_amount = self.base_amount;
    }
}

fn doubled(base: Decimal, times: u32) -> Decimal {
    (0..times).fold(base, |amount, _| amount * Decimal::TWO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_martingale_doubles_then_resets_at_cap() {
        let mut sizer = PositionSizer::martingale(dec!(1), 3);
        let mut amounts = vec![sizer.current_amount()];

        sizer.record(Outcome::Loss);
        amounts.push(sizer.current_amount());
        sizer.record(Outcome::Loss);
        amounts.push(sizer.current_amount());
        assert_eq!(amounts, vec![dec!(1), dec!(2), dec!(4)]);
        assert_eq!(sizer.current_step(), 2);

        // Third consecutive loss reaches max_step.
        sizer.record(Outcome::Loss);
        assert_eq!(sizer.current_step(), 0);
        assert_eq!(sizer.current_amount(), dec!(1));
    }

    #[test]
    fn test_martingale_win_resets() {
        let mut sizer = PositionSizer::martingale(dec!(2.5), 4);
        sizer.record(Outcome::Loss);
        sizer.record(Outcome::Loss);
        assert_eq!(sizer.current_amount(), dec!(10));

        sizer.record(Outcome::Win);
        assert_eq!(sizer.current_step(), 0);
        assert_eq!(sizer.current_amount(), dec!(2.5));
    }

    #[test]
    fn test_martingale_max_step_one_never_doubles() {
        let mut sizer = PositionSizer::martingale(dec!(1), 1);
        sizer.record(Outcome::Loss);
        assert_eq!(sizer.current_amount(), dec!(1));
        assert_eq!(sizer.current_step(), 0);
    }

    #[test]
    fn test_fixed_sizing_ignores_outcomes() {
        let mut sizer = PositionSizer::fixed(dec!(5));
        sizer.record(Outcome::Loss);
        sizer.record(Outcome::Loss);
        sizer.record(Outcome::Win);
        assert_eq!(sizer.current_amount(), dec!(5));
        assert_eq!(sizer.current_step(), 0);
    }

    #[test]
    fn test_worst_case_streak_cost() {
        let sizer = PositionSizer::martingale(dec!(1), 4);
        assert_eq!(sizer.worst_case_streak_cost(), dec!(15));
        assert_eq!(PositionSizer::fixed(dec!(3)).worst_case_streak_cost(), dec!(3));
    }
}
