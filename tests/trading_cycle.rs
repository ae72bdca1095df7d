//! End-to-end trading rounds against the simulated exchange: full
//! fetch -> signal -> position -> execute cycles, no network.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, TimeZone, Utc};

use crossbot::exchange::{ExchangeClient, SimExchange};
use crossbot::execution::{ExecutorConfig, OrderExecutor};
use crossbot::models::{Candle, OrderSide};
use crossbot::scheduler::{Scheduler, SchedulerConfig};
use crossbot::strategy::CrossoverStrategy;
use crossbot::telemetry::TradeLog;

fn candles(closes: &[f64]) -> Vec<Candle> {
    let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Candle {
            timestamp: start + ChronoDuration::minutes(5 * i as i64),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1000.0,
        })
        .collect()
}

fn build_scheduler(sim: &SimExchange, symbols: &[&str]) -> (Scheduler, TradeLog) {
    let exchange = ExchangeClient::Simulated(sim.clone());
    let executor = OrderExecutor::new(
        exchange.clone(),
        ExecutorConfig {
            settlement_delay: Duration::ZERO,
            ..ExecutorConfig::default()
        },
    );
    let trade_log = TradeLog::default();
    let scheduler = Scheduler::new(
        exchange,
        Arc::new(CrossoverStrategy::new(3, 5)),
        executor,
        trade_log.clone(),
        SchedulerConfig {
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            candle_interval: "5".to_string(),
            kline_limit: 100,
            poll_interval: Duration::from_secs(60),
        },
    );
    (scheduler, trade_log)
}

#[tokio::test]
async fn test_full_cycle_entry_then_exit() {
    // Round 1: an upward crossing at the latest candle opens a long with a
    // bracket attached.
    let sim = SimExchange::new(10_000.0)
        .with_candles("BTCUSDT", candles(&[49_600.0, 49_700.0, 49_800.0, 49_900.0, 50_000.0]));
    let (scheduler, trade_log) = build_scheduler(&sim, &["BTCUSDT"]);

    scheduler.run_round().await;

    let position = sim.position("BTCUSDT").unwrap().expect("position opened");
    assert_eq!(position.size, 0.02, "balance=10000, 10% at 50000 -> 0.02");
    let bracket = sim.bracket("BTCUSDT").expect("bracket attached");
    assert_eq!(bracket.stop_loss, 49_000.0);
    assert_eq!(bracket.take_profit, 52_000.0);

    // Round 2: the short MA crosses back below the long MA on the latest
    // candle; the position is closed reduce-only, full size.
    let sim = sim.with_candles(
        "BTCUSDT",
        candles(&[
            50_000.0, 51_000.0, 52_000.0, 53_000.0, 54_000.0, 55_000.0, 52_000.0, 49_000.0,
        ]),
    );
    scheduler.run_round().await;

    assert!(sim.position("BTCUSDT").unwrap().is_none(), "position closed");

    let trades = trade_log.recent(10);
    assert_eq!(trades.len(), 2);
    assert_eq!(trades[0].side, OrderSide::Buy);
    assert_eq!(trades[1].side, OrderSide::Sell);
    assert_eq!(trades[1].quantity, 0.02);
}

#[tokio::test]
async fn test_sustained_cross_never_reenters() {
    // The crossed state persists across rounds; only the transition round
    // may trade.
    let sim = SimExchange::new(10_000.0)
        .with_candles("BTCUSDT", candles(&[100.0, 101.0, 102.0, 103.0, 104.0]));
    let (scheduler, trade_log) = build_scheduler(&sim, &["BTCUSDT"]);

    for _ in 0..5 {
        scheduler.run_round().await;
    }

    assert_eq!(sim.orders().len(), 1, "exactly one entry order");
    assert_eq!(trade_log.len(), 1);
}

#[tokio::test]
async fn test_symbol_isolation_within_a_round() {
    // Symbol A's market data fetch fails; symbol B in the same round still
    // gets evaluated and can still trade.
    let sim = SimExchange::new(10_000.0)
        .with_candles("ADAUSDT", candles(&[1.0; 6]))
        .with_kline_failure("ADAUSDT")
        .with_candles("ETHUSDT", candles(&[2_960.0, 2_970.0, 2_980.0, 2_990.0, 3_000.0]));
    let (scheduler, trade_log) = build_scheduler(&sim, &["ADAUSDT", "ETHUSDT"]);

    scheduler.run_round().await;

    assert!(sim.position("ETHUSDT").unwrap().is_some());
    assert_eq!(trade_log.recent(10)[0].symbol, "ETHUSDT");
}

#[tokio::test]
async fn test_failed_bracket_leaves_open_position_and_is_elevated() {
    let sim = SimExchange::new(10_000.0)
        .with_candles("BTCUSDT", candles(&[49_600.0, 49_700.0, 49_800.0, 49_900.0, 50_000.0]))
        .with_trading_stop_failure();
    let (scheduler, trade_log) = build_scheduler(&sim, &["BTCUSDT"]);

    scheduler.run_round().await;

    // The entry stands, unguarded, and the trade record says so.
    assert!(sim.position("BTCUSDT").unwrap().is_some());
    assert!(sim.bracket("BTCUSDT").is_none());
    let trades = trade_log.recent(10);
    assert_eq!(trades.len(), 1);
    assert!(trades[0].note.contains("UNPROTECTED"));
}

#[tokio::test]
async fn test_insufficient_history_never_trades() {
    let sim = SimExchange::new(10_000.0)
        .with_candles("BTCUSDT", candles(&[100.0, 101.0, 102.0, 103.0]));
    let (scheduler, trade_log) = build_scheduler(&sim, &["BTCUSDT"]);

    scheduler.run_round().await;

    assert!(sim.orders().is_empty());
    assert!(trade_log.is_empty());
}
