// Strategy cycle scheduler.
//
// One sequential worker drives every configured symbol through
// fetch -> signal -> position check -> execute -> log, then sleeps until the
// next round. Sequential evaluation is deliberate: it bounds exchange
// rate-limit exposure and keeps order placement ordering deterministic for
// the single account.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::account::AccountTracker;
use crate::error::StrategyError;
use crate::exchange::ExchangeClient;
use crate::execution::{ExecutionOutcome, OrderExecutor};
use crate::models::{normalize_candles, OrderSide, Signal, TradeRecord};
use crate::strategy::Strategy;
use crate::telemetry::TradeLog;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub symbols: Vec<String>,
    /// Candle interval in exchange notation
    pub candle_interval: String,
    /// Candles requested per fetch
    pub kline_limit: u32,
    /// Sleep between full rounds
    pub poll_interval: Duration,
}

pub struct Scheduler {
    exchange: ExchangeClient,
    strategy: Arc<dyn Strategy>,
    tracker: AccountTracker,
    executor: OrderExecutor,
    trade_log: TradeLog,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        exchange: ExchangeClient,
        strategy: Arc<dyn Strategy>,
        executor: OrderExecutor,
        trade_log: TradeLog,
        config: SchedulerConfig,
    ) -> Self {
        let tracker = AccountTracker::new(exchange.clone());
        Self {
            exchange,
            strategy,
            tracker,
            executor,
            trade_log,
            config,
        }
    }

    /// Run rounds until the shutdown signal flips. The wait between rounds
    /// is cancellable; an in-flight symbol evaluation is allowed to finish,
    /// but no new one starts once shutdown is observed.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            strategy = self.strategy.name(),
            symbols = ?self.config.symbols,
            interval_secs = self.config.poll_interval.as_secs(),
            "scheduler starting"
        );

        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            // Wake on the next tick or on shutdown, whichever comes first;
            // the inter-round sleep is cancellable, never a blocking wait.
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    // A dropped sender means no one can ever signal us again.
                    if changed.is_err() {
                        break;
                    }
                }
            }
            if *shutdown.borrow() {
                break;
            }
            self.round(Some(&shutdown)).await;
        }

        tracing::info!(
            executed_trades = self.trade_log.len(),
            "scheduler stopped"
        );
    }

    /// One full pass over every configured symbol (testing entry point)
    pub async fn run_round(&self) {
        self.round(None).await;
    }

    async fn round(&self, shutdown: Option<&watch::Receiver<bool>>) {
        tracing::info!("--- trading round ---");

        for symbol in &self.config.symbols {
            if shutdown.map(|s| *s.borrow()).unwrap_or(false) {
                tracing::info!("shutdown observed, skipping remaining symbols");
                break;
            }

            // One symbol's failure must not block the rest of the round.
            if let Err(err) = self.evaluate_symbol(symbol).await {
                tracing::warn!(symbol = %symbol, error = %err, "symbol cycle failed, continuing");
            }
        }
    }

    async fn evaluate_symbol(&self, symbol: &str) -> anyhow::Result<()> {
        let candles = self
            .exchange
            .get_klines(symbol, &self.config.candle_interval, self.config.kline_limit)
            .await?;
        let candles = normalize_candles(candles);

        let evaluation = match self.strategy.evaluate(&candles) {
            Ok(evaluation) => evaluation,
            Err(StrategyError::InsufficientData { have, need }) => {
                tracing::info!(symbol, have, need, "collecting data, holding");
                return Ok(());
            }
        };

        let current_price = candles
            .last()
            .map(|candle| candle.close)
            .ok_or_else(|| anyhow::anyhow!("empty candle series for {symbol}"))?;

        tracing::info!(
            symbol,
            price = current_price,
            ma_short = evaluation.averages.short,
            ma_long = evaluation.averages.long,
            signal = ?evaluation.signal,
            "evaluated"
        );

        // Position state is read fresh each cycle; a failed query aborts
        // this symbol rather than being mistaken for "flat".
        let position = self.tracker.open_position(symbol).await?;

        if evaluation.signal != Signal::Hold {
            tracing::info!(symbol, signal = ?evaluation.signal, "signal detected");
        }

        let outcome = self
            .executor
            .execute_signal(symbol, evaluation.signal, position.as_ref(), current_price)
            .await?;
        self.record_outcome(symbol, current_price, &outcome);

        if let Some(position) = &position {
            tracing::info!(
                symbol,
                side = ?position.side,
                size = position.size,
                pnl = position.unrealized_pnl,
                pnl_pct = position.pnl_percentage,
                "open position"
            );
        }

        Ok(())
    }

    fn record_outcome(&self, symbol: &str, price: f64, outcome: &ExecutionOutcome) {
        match outcome {
            ExecutionOutcome::Entered { quantity, bracket, .. } => {
                self.trade_log.record(TradeRecord::new(
                    symbol,
                    OrderSide::Buy,
                    *quantity,
                    price,
                    "entry with bracket",
                ));
                tracing::info!(
                    symbol,
                    quantity,
                    stop_loss = bracket.stop_loss,
                    take_profit = bracket.take_profit,
                    "entered long"
                );
            }
            ExecutionOutcome::EnteredUnprotected { quantity, reason, .. } => {
                self.trade_log.record(TradeRecord::new(
                    symbol,
                    OrderSide::Buy,
                    *quantity,
                    price,
                    "entry UNPROTECTED",
                ));
                tracing::error!(
                    symbol,
                    quantity,
                    reason = %reason,
                    "entered long WITHOUT bracket protection - operator attention required"
                );
            }
            ExecutionOutcome::Closed { size, .. } => {
                self.trade_log.record(TradeRecord::new(
                    symbol,
                    OrderSide::Sell,
                    *size,
                    price,
                    "close",
                ));
            }
            ExecutionOutcome::Rejected { reason } => {
                tracing::warn!(symbol, reason = %reason, "order rejected, no retry this cycle");
            }
            ExecutionOutcome::NoAction { reason } => {
                tracing::debug!(symbol, reason, "no action");
            }
        }
    }
}
