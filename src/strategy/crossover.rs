use crate::error::StrategyError;
use crate::indicators::{calculate_sma, calculate_sma_at};
use crate::models::{Candle, MovingAveragePair, Signal};
use crate::strategy::{Evaluation, Strategy};

/// Moving-average crossover strategy.
///
/// A signal fires only on a state transition between the previous and the
/// current candle (edge-triggered), never on sustained state: a series that
/// stays crossed produces exactly one Buy at the crossing candle and Hold
/// afterwards.
#[derive(Debug, Clone)]
pub struct CrossoverStrategy {
    short_period: usize,
    long_period: usize,
}

impl CrossoverStrategy {
    pub fn new(short_period: usize, long_period: usize) -> Self {
        Self {
            short_period,
            long_period,
        }
    }

    pub fn short_period(&self) -> usize {
        self.short_period
    }

    pub fn long_period(&self) -> usize {
        self.long_period
    }
}

impl Strategy for CrossoverStrategy {
    fn evaluate(&self, candles: &[Candle]) -> Result<Evaluation, StrategyError> {
        let (signal, averages) = compute_signal(candles, self.short_period, self.long_period)?;
        Ok(Evaluation { signal, averages })
    }

    fn name(&self) -> &str {
        "ma-crossover"
    }

    fn min_candles_required(&self) -> usize {
        self.long_period
    }
}

/// Compute the edge-triggered crossover signal for the latest candle.
///
/// Pure function over its inputs: the same series always yields the same
/// output. Returns `InsufficientData` when fewer than `long_period` candles
/// are available. No rounding happens here; quantity/price precision is the
/// order executor's concern.
///
/// Rule: Buy iff the short MA was at or below the long MA at the previous
/// candle and is above it now; Sell on the mirror transition; Hold
/// otherwise. When the series is exactly `long_period` candles long the
/// previous state is not computable and counts as "not crossed", matching
/// the first candle at which the comparison becomes defined.
pub fn compute_signal(
    candles: &[Candle],
    short_period: usize,
    long_period: usize,
) -> Result<(Signal, MovingAveragePair), StrategyError> {
    debug_assert!(short_period < long_period);

    if candles.len() < long_period {
        return Err(StrategyError::InsufficientData {
            have: candles.len(),
            need: long_period,
        });
    }

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

    // Lengths checked above, so the current averages always exist.
    let short_now = calculate_sma(&closes, short_period).expect("length checked");
    let long_now = calculate_sma(&closes, long_period).expect("length checked");
    let averages = MovingAveragePair {
        short: short_now,
        long: long_now,
    };

    let above_now = short_now > long_now;
    let above_prev = match (
        calculate_sma_at(&closes, short_period, closes.len() - 1),
        calculate_sma_at(&closes, long_period, closes.len() - 1),
    ) {
        (Some(short_prev), Some(long_prev)) => short_prev > long_prev,
        _ => false,
    };

    let signal = match (above_prev, above_now) {
        (false, true) => Signal::Buy,
        (true, false) => Signal::Sell,
        _ => Signal::Hold,
    };

    Ok((signal, averages))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn series(closes: &[f64]) -> Vec<Candle> {
        let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                timestamp: start + Duration::minutes(5 * i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1000.0,
            })
            .collect()
    }

    #[test]
    fn test_insufficient_data_below_long_period() {
        let candles = series(&[100.0, 101.0, 102.0, 103.0]);
        let result = compute_signal(&candles, 3, 5);

        assert_eq!(
            result,
            Err(StrategyError::InsufficientData { have: 4, need: 5 })
        );
    }

    #[test]
    fn test_buy_fires_at_first_computable_crossing() {
        // Monotonically increasing closes: the short MA exceeds the long MA
        // at the first candle where both are defined.
        let candles = series(&[100.0, 101.0, 102.0, 103.0, 104.0]);
        let (signal, averages) = compute_signal(&candles, 3, 5).unwrap();

        assert_eq!(signal, Signal::Buy);
        assert_eq!(averages.short, 103.0); // mean of 102, 103, 104
        assert_eq!(averages.long, 102.0); // mean of 100..104
    }

    #[test]
    fn test_sustained_crossed_state_holds() {
        // Same trend, one more candle: the crossed state persists but the
        // transition already happened, so no new signal.
        let candles = series(&[100.0, 101.0, 102.0, 103.0, 104.0, 105.0]);
        let (signal, _) = compute_signal(&candles, 3, 5).unwrap();

        assert_eq!(signal, Signal::Hold);
    }

    #[test]
    fn test_exactly_one_buy_over_growing_series() {
        // Concrete scenario: closes 100..=109, short=3, long=5. Feeding the
        // series prefix by prefix, exactly one Buy fires, at index 4.
        let closes: Vec<f64> = (0..10).map(|i| 100.0 + i as f64).collect();
        let candles = series(&closes);

        let mut buys = Vec::new();
        for end in 1..=candles.len() {
            match compute_signal(&candles[..end], 3, 5) {
                Ok((Signal::Buy, _)) => buys.push(end - 1),
                Ok((Signal::Sell, _)) => panic!("unexpected sell in rising series"),
                _ => {}
            }
        }

        assert_eq!(buys, vec![4]);
    }

    #[test]
    fn test_sell_fires_on_downward_crossing() {
        // Rise long enough to establish short > long, then fall until the
        // short MA drops back through the long MA.
        let closes = vec![
            100.0, 102.0, 104.0, 106.0, 108.0, 110.0, 104.0, 98.0, 92.0, 86.0,
        ];
        let candles = series(&closes);

        let mut sells = Vec::new();
        for end in 5..=candles.len() {
            if let Ok((Signal::Sell, _)) = compute_signal(&candles[..end], 3, 5) {
                sells.push(end - 1);
            }
        }

        assert_eq!(sells.len(), 1, "sell must fire exactly once");
    }

    #[test]
    fn test_flat_series_holds() {
        let candles = series(&[100.0; 12]);
        let (signal, averages) = compute_signal(&candles, 3, 5).unwrap();

        assert_eq!(signal, Signal::Hold);
        assert_eq!(averages.short, averages.long);
    }

    #[test]
    fn test_pure_function_same_input_same_output() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + (i % 7) as f64).collect();
        let candles = series(&closes);

        let first = compute_signal(&candles, 3, 5).unwrap();
        let second = compute_signal(&candles, 3, 5).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_strategy_trait_surface() {
        let strategy = CrossoverStrategy::new(20, 50);
        assert_eq!(strategy.name(), "ma-crossover");
        assert_eq!(strategy.min_candles_required(), 50);

        let candles = series(&[100.0; 10]);
        assert!(strategy.evaluate(&candles).is_err());
    }
}
