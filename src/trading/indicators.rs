//! Technical indicators over a close-price series (oldest first).
//!
//! Both functions return `None` when the series is too short.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Short and long simple moving averages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmaPair {
    pub short: Decimal,
    pub long: Decimal,
}

/// Arithmetic mean of the last `short_period` and last `long_period` closes.
///
/// Requires at least `long_period` closes. Periods must be non-zero.
pub fn sma(closes: &[Decimal], short_period: usize, long_period: usize) -> Option<SmaPair> {
    if short_period == 0 || long_period == 0 || closes.len() < long_period || closes.len() < short_period {
        return None;
    }
    Some(SmaPair {
        short: mean_of_last(closes, short_period),
        long: mean_of_last(closes, long_period),
    })
}

fn mean_of_last(values: &[Decimal], n: usize) -> Decimal {
    let sum: Decimal = values[values.len() - n..].iter().copied().sum();
    sum / Decimal::from(n)
}

/// Relative Strength Index in [0, 100].
///
/// Uses simple averages of the last `period` gains and losses (the seed
/// value of Wilder's RSI, without the smoothing recurrence). Needs at least
/// `period + 1` closes. With no losses in the window the RSI is 100.
pub fn rsi(closes: &[Decimal], period: usize) -> Option<Decimal> {
    if period == 0 || closes.len() <= period {
        return None;
    }

    let deltas = closes[closes.len() - period - 1..]
        .windows(2)
        .map(|w| w[1] - w[0]);

    let (mut gains, mut losses) = (Decimal::ZERO, Decimal::ZERO);
    for delta in deltas {
        if delta > Decimal::ZERO {
            gains += delta;
        } else {
            losses -= delta;
        }
    }

    if losses.is_zero() {
        return Some(dec!(100));
    }

    // 100 - 100 / (1 + RS) with RS = avg_gain / avg_loss, rearranged so the
    // shared `period` divisor cancels and the result stays exact.
    Some(dec!(100) * gains / (gains + losses))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(values: &[i64]) -> Vec<Decimal> {
        values.iter().map(|v| Decimal::from(*v)).collect()
    }

    #[test]
    fn test_sma_uses_trailing_windows() {
        let closes = series(&[100, 1, 2, 3, 4, 5, 6]);
        let pair = sma(&closes, 2, 6).unwrap();
        assert_eq!(pair.short, dec!(5.5));
        assert_eq!(pair.long, dec!(3.5));
    }

    #[test]
    fn test_sma_insufficient_data() {
        let closes = series(&[1, 2, 3]);
        assert!(sma(&closes, 2, 4).is_none());
        assert!(sma(&closes, 0, 3).is_none());
        assert!(sma(&closes, 2, 3).is_some());
    }

    #[test]
    fn test_rsi_all_gains_is_100() {
        let closes = series(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(rsi(&closes, 5), Some(dec!(100)));
    }

    #[test]
    fn test_rsi_flat_series_is_100() {
        let closes = series(&[7, 7, 7, 7]);
        assert_eq!(rsi(&closes, 3), Some(dec!(100)));
    }

    #[test]
    fn test_rsi_balanced_moves_is_50() {
        let closes = series(&[10, 12, 10, 12, 10]);
        assert_eq!(rsi(&closes, 4), Some(dec!(50)));
    }

    #[test]
    fn test_rsi_all_losses_is_0() {
        let closes = series(&[10, 9, 8, 7]);
        assert_eq!(rsi(&closes, 3), Some(Decimal::ZERO));
    }

    #[test]
    fn test_rsi_only_last_period_counts() {
        // The early crash is outside the 2-delta window.
        let closes = series(&[100, 10, 11, 12]);
        assert_eq!(rsi(&closes, 2), Some(dec!(100)));

        // Gains 3, loss 1 over three deltas: RS = 3, RSI = 75.
        let closes = series(&[10, 13, 12, 12]);
        assert_eq!(rsi(&closes, 3), Some(dec!(75)));
    }

    #[test]
    fn test_rsi_insufficient_data() {
        let closes = series(&[1, 2, 3]);
        assert!(rsi(&closes, 3).is_none());
        assert!(rsi(&closes, 2).is_some());
        assert!(rsi(&closes, usize::MAX).is_none());
    }
}
