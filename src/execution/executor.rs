use std::time::Duration;

use crate::error::ExchangeError;
use crate::exchange::ExchangeClient;
use crate::models::{
    BracketLevels, Order, OrderAck, OrderSide, Position, PositionSide, Signal,
};

/// Risk and bracket parameters for the executor
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Fraction of available balance committed per entry
    pub position_size_fraction: f64,
    /// Stop-loss distance from entry, percent
    pub stop_loss_pct: f64,
    /// Take-profit distance from entry, percent
    pub take_profit_pct: f64,
    /// Instrument minimum order quantity
    pub min_order_qty: f64,
    /// Settlement coin for balance queries
    pub balance_coin: String,
    /// Wait between entry acknowledgment and bracket attachment; the
    /// exchange needs the position to materialize before a trading stop is
    /// accepted
    pub settlement_delay: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            position_size_fraction: 0.1,
            stop_loss_pct: 2.0,
            take_profit_pct: 4.0,
            min_order_qty: 0.001,
            balance_coin: "USDT".to_string(),
            settlement_delay: Duration::from_secs(1),
        }
    }
}

/// What a signal turned into
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    /// Entry filled and the bracket is attached
    Entered {
        ack: OrderAck,
        quantity: f64,
        bracket: BracketLevels,
    },
    /// Entry filled but bracket attachment failed: the position is live and
    /// unguarded. Elevated severity; never collapsed into a generic error.
    EnteredUnprotected {
        ack: OrderAck,
        quantity: f64,
        bracket: BracketLevels,
        reason: String,
    },
    /// Position closed with a reduce-only order
    Closed { ack: OrderAck, size: f64 },
    /// The exchange refused the order; logged, no retry this cycle
    Rejected { reason: String },
    /// Signal/position combination requires nothing (idempotence guard)
    NoAction { reason: &'static str },
}

/// Converts signals into sized market orders with bracket protection.
///
/// State machine over {Flat, Long}: Buy opens when flat, Sell closes when
/// long, everything else is a no-op so a repeated signal can never double an
/// entry or an exit.
pub struct OrderExecutor {
    exchange: ExchangeClient,
    config: ExecutorConfig,
}

impl OrderExecutor {
    pub fn new(exchange: ExchangeClient, config: ExecutorConfig) -> Self {
        Self { exchange, config }
    }

    pub async fn execute_signal(
        &self,
        symbol: &str,
        signal: Signal,
        position: Option<&Position>,
        current_price: f64,
    ) -> Result<ExecutionOutcome, ExchangeError> {
        let long = position
            .map(|p| p.is_open() && p.side == PositionSide::Long)
            .unwrap_or(false);

        match (signal, long) {
            (Signal::Buy, false) => self.enter(symbol, current_price).await,
            (Signal::Sell, true) => {
                // `long` implies a position is present
                self.close(position.expect("open position checked")).await
            }
            (Signal::Buy, true) => Ok(ExecutionOutcome::NoAction {
                reason: "buy signal but already long",
            }),
            (Signal::Sell, false) => Ok(ExecutionOutcome::NoAction {
                reason: "sell signal but no position to close",
            }),
            (Signal::Hold, _) => Ok(ExecutionOutcome::NoAction {
                reason: "hold signal",
            }),
        }
    }

    async fn enter(&self, symbol: &str, price: f64) -> Result<ExecutionOutcome, ExchangeError> {
        if !(price > 0.0) {
            return Ok(ExecutionOutcome::Rejected {
                reason: format!("non-positive price {price} for {symbol}"),
            });
        }

        let balance = self
            .exchange
            .available_balance(&self.config.balance_coin)
            .await?;
        let quantity = size_order(
            symbol,
            balance,
            price,
            self.config.position_size_fraction,
            self.config.min_order_qty,
        );

        let order = Order {
            symbol: symbol.to_string(),
            side: OrderSide::Buy,
            quantity,
            reduce_only: false,
        };

        let ack = match self.exchange.place_market_order(&order).await {
            Ok(ack) => ack,
            Err(err @ ExchangeError::Api { .. }) => {
                return Ok(ExecutionOutcome::Rejected {
                    reason: err.to_string(),
                })
            }
            Err(err) => return Err(err),
        };

        tracing::info!(symbol, quantity, price, "entry order placed");

        // Bracket attachment happens strictly after the entry ack, and the
        // position must settle first.
        let bracket = BracketLevels::from_entry(
            price,
            self.config.stop_loss_pct,
            self.config.take_profit_pct,
        );
        if !self.config.settlement_delay.is_zero() {
            tokio::time::sleep(self.config.settlement_delay).await;
        }

        match self.exchange.set_trading_stop(symbol, &bracket).await {
            Ok(()) => {
                tracing::info!(
                    symbol,
                    stop_loss = bracket.stop_loss,
                    take_profit = bracket.take_profit,
                    "bracket attached"
                );
                Ok(ExecutionOutcome::Entered {
                    ack,
                    quantity,
                    bracket,
                })
            }
            Err(err) => {
                tracing::error!(
                    symbol,
                    quantity,
                    error = %err,
                    "POSITION UNPROTECTED: entry filled but bracket attachment failed"
                );
                Ok(ExecutionOutcome::EnteredUnprotected {
                    ack,
                    quantity,
                    bracket,
                    reason: err.to_string(),
                })
            }
        }
    }

    async fn close(&self, position: &Position) -> Result<ExecutionOutcome, ExchangeError> {
        let order = Order {
            symbol: position.symbol.clone(),
            side: OrderSide::Sell,
            quantity: position.size,
            reduce_only: true,
        };

        match self.exchange.place_market_order(&order).await {
            Ok(ack) => {
                tracing::info!(symbol = %position.symbol, size = position.size, "position closed");
                Ok(ExecutionOutcome::Closed {
                    ack,
                    size: position.size,
                })
            }
            Err(err @ ExchangeError::Api { .. }) => Ok(ExecutionOutcome::Rejected {
                reason: err.to_string(),
            }),
            Err(err) => Err(err),
        }
    }
}

/// Quantity decimal places per instrument: BTC-denominated pairs trade in
/// finer steps than the rest
pub fn quantity_decimals(symbol: &str) -> u32 {
    if symbol.contains("BTC") {
        6
    } else {
        4
    }
}

/// Size an entry from the available balance, rounded per instrument and
/// clamped to the exchange minimum
pub fn size_order(
    symbol: &str,
    balance: f64,
    price: f64,
    fraction: f64,
    min_qty: f64,
) -> f64 {
    let raw = balance * fraction / price;
    let factor = 10f64.powi(quantity_decimals(symbol) as i32);
    let rounded = (raw * factor).round() / factor;
    rounded.max(min_qty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::SimExchange;
    use crate::models::Candle;
    use chrono::{TimeZone, Utc};

    fn candle(price: f64) -> Candle {
        Candle {
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 1000.0,
        }
    }

    fn test_config() -> ExecutorConfig {
        ExecutorConfig {
            settlement_delay: Duration::ZERO,
            ..ExecutorConfig::default()
        }
    }

    fn executor_with(sim: SimExchange) -> OrderExecutor {
        OrderExecutor::new(ExchangeClient::Simulated(sim), test_config())
    }

    fn long_position(symbol: &str, size: f64, entry: f64) -> Position {
        Position {
            symbol: symbol.to_string(),
            side: PositionSide::Long,
            size,
            avg_entry_price: entry,
            unrealized_pnl: 0.0,
            pnl_percentage: 0.0,
        }
    }

    #[test]
    fn test_size_order_concrete_scenario() {
        // balance=10000, fraction=0.1, price=50000, BTCUSDT -> 0.02
        let quantity = size_order("BTCUSDT", 10_000.0, 50_000.0, 0.1, 0.001);
        assert_eq!(quantity, 0.02);
    }

    #[test]
    fn test_size_order_clamps_to_minimum() {
        let quantity = size_order("BTCUSDT", 10.0, 50_000.0, 0.1, 0.001);
        assert_eq!(quantity, 0.001);
    }

    #[test]
    fn test_size_order_rounding_per_instrument() {
        // Non-BTC pairs round to 4 decimals
        let quantity = size_order("ETHUSDT", 10_000.0, 3_333.0, 0.1, 0.001);
        assert_eq!(quantity, 0.3000);

        let fine = size_order("BTCUSDT", 999.0, 50_000.0, 0.1, 0.000001);
        assert_eq!(fine, 0.001998);
    }

    #[tokio::test]
    async fn test_buy_while_flat_enters_with_bracket() {
        let sim = SimExchange::new(10_000.0).with_candles("BTCUSDT", vec![candle(50_000.0)]);
        let executor = executor_with(sim.clone());

        let outcome = executor
            .execute_signal("BTCUSDT", Signal::Buy, None, 50_000.0)
            .await
            .unwrap();

        match outcome {
            ExecutionOutcome::Entered { quantity, bracket, .. } => {
                assert_eq!(quantity, 0.02);
                assert_eq!(bracket.stop_loss, 49_000.0);
                assert_eq!(bracket.take_profit, 52_000.0);
            }
            other => panic!("expected Entered, got {other:?}"),
        }

        assert_eq!(sim.orders().len(), 1);
        assert!(sim.bracket("BTCUSDT").is_some());
    }

    #[tokio::test]
    async fn test_buy_while_long_is_a_no_op() {
        let sim = SimExchange::new(10_000.0).with_candles("BTCUSDT", vec![candle(50_000.0)]);
        let executor = executor_with(sim.clone());
        let position = long_position("BTCUSDT", 0.02, 49_000.0);

        let outcome = executor
            .execute_signal("BTCUSDT", Signal::Buy, Some(&position), 50_000.0)
            .await
            .unwrap();

        assert!(matches!(outcome, ExecutionOutcome::NoAction { .. }));
        assert!(sim.orders().is_empty(), "no duplicate order may be placed");
    }

    #[tokio::test]
    async fn test_sell_while_flat_is_a_no_op() {
        let sim = SimExchange::new(10_000.0).with_candles("BTCUSDT", vec![candle(50_000.0)]);
        let executor = executor_with(sim.clone());

        let outcome = executor
            .execute_signal("BTCUSDT", Signal::Sell, None, 50_000.0)
            .await
            .unwrap();

        assert!(matches!(outcome, ExecutionOutcome::NoAction { .. }));
        assert!(sim.orders().is_empty());
    }

    #[tokio::test]
    async fn test_sell_while_long_closes_full_size() {
        let sim = SimExchange::new(10_000.0).with_candles("BTCUSDT", vec![candle(50_000.0)]);
        let executor = executor_with(sim.clone());

        // Open through the simulator so there is a position to reduce.
        executor
            .execute_signal("BTCUSDT", Signal::Buy, None, 50_000.0)
            .await
            .unwrap();
        let position = sim.position("BTCUSDT").unwrap().unwrap();

        let outcome = executor
            .execute_signal("BTCUSDT", Signal::Sell, Some(&position), 50_000.0)
            .await
            .unwrap();

        match outcome {
            ExecutionOutcome::Closed { size, .. } => assert_eq!(size, 0.02),
            other => panic!("expected Closed, got {other:?}"),
        }
        assert!(sim.position("BTCUSDT").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bracket_failure_surfaces_unprotected_entry() {
        let sim = SimExchange::new(10_000.0)
            .with_candles("BTCUSDT", vec![candle(50_000.0)])
            .with_trading_stop_failure();
        let executor = executor_with(sim.clone());

        let outcome = executor
            .execute_signal("BTCUSDT", Signal::Buy, None, 50_000.0)
            .await
            .unwrap();

        match outcome {
            ExecutionOutcome::EnteredUnprotected { quantity, reason, .. } => {
                assert_eq!(quantity, 0.02);
                assert!(reason.contains("trading-stop"));
            }
            other => panic!("expected EnteredUnprotected, got {other:?}"),
        }

        // The entry stands even though the bracket is missing.
        assert!(sim.position("BTCUSDT").unwrap().is_some());
        assert!(sim.bracket("BTCUSDT").is_none());
    }

    #[tokio::test]
    async fn test_rejected_order_is_not_an_error() {
        // Price data exists but the account cannot cover the entry.
        let sim = SimExchange::new(5.0).with_candles("BTCUSDT", vec![candle(50_000.0)]);
        let executor = executor_with(sim.clone());

        let outcome = executor
            .execute_signal("BTCUSDT", Signal::Buy, None, 50_000.0)
            .await
            .unwrap();

        match outcome {
            ExecutionOutcome::Rejected { reason } => {
                assert!(reason.contains("insufficient"));
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
        assert!(sim.position("BTCUSDT").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_hold_does_nothing() {
        let sim = SimExchange::new(10_000.0).with_candles("BTCUSDT", vec![candle(50_000.0)]);
        let executor = executor_with(sim.clone());

        let outcome = executor
            .execute_signal("BTCUSDT", Signal::Hold, None, 50_000.0)
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            ExecutionOutcome::NoAction { reason: "hold signal" }
        ));
    }
}
