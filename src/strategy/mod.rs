// Trading strategy module
pub mod crossover;

pub use crossover::{compute_signal, CrossoverStrategy};

use crate::error::StrategyError;
use crate::models::{Candle, MovingAveragePair, Signal};

/// One strategy evaluation over a candle series
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub signal: Signal,
    pub averages: MovingAveragePair,
}

/// Base trait for trading strategies
pub trait Strategy: Send + Sync {
    /// Evaluate a candle series (oldest first) into a signal and the
    /// indicator values behind it
    fn evaluate(&self, candles: &[Candle]) -> Result<Evaluation, StrategyError>;

    /// Strategy name for logging
    fn name(&self) -> &str;

    /// Minimum candles required before a signal is computable
    fn min_candles_required(&self) -> usize;
}
