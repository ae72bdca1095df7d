// Dashboard telemetry feed.
//
// Runs independently of the trading scheduler on its own cadence, reading
// the same exchange state and recomputing the same signals. Exchange
// queries are idempotent, so the feed and the scheduler may both be in
// flight at once; the only shared mutable state is the trade log and the
// snapshot, both behind locks.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::time::{interval, Instant, MissedTickBehavior};

use crate::account::AccountTracker;
use crate::exchange::ExchangeClient;
use crate::models::{Position, Signal, TradeRecord};
use crate::strategy::Strategy;

/// Trades kept for the dashboard history view
pub const TRADE_HISTORY_CAPACITY: usize = 50;
/// Trades included per history event
const TRADE_HISTORY_EVENT_LEN: usize = 20;

/// Bounded ring buffer of executed trades, shared between the scheduler
/// (writer) and the telemetry feed (reader)
#[derive(Clone)]
pub struct TradeLog {
    inner: Arc<Mutex<VecDeque<TradeRecord>>>,
    capacity: usize,
}

impl TradeLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn record(&self, trade: TradeRecord) {
        let mut trades = self.inner.lock().unwrap();
        trades.push_back(trade);
        while trades.len() > self.capacity {
            trades.pop_front();
        }
    }

    /// The most recent `n` trades, oldest first
    pub fn recent(&self, n: usize) -> Vec<TradeRecord> {
        let trades = self.inner.lock().unwrap();
        trades.iter().rev().take(n).rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TradeLog {
    fn default() -> Self {
        Self::new(TRADE_HISTORY_CAPACITY)
    }
}

/// Per-symbol market view published to subscribers
#[derive(Debug, Clone, Serialize)]
pub struct MarketData {
    pub symbol: String,
    pub price: f64,
    pub ma_short: f64,
    pub ma_long: f64,
    pub signal: Signal,
}

/// Structured events pushed to dashboard subscribers
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelemetryEvent {
    AccountStatus {
        balance: f64,
        total_unrealized_pnl: f64,
        active_positions: usize,
        uptime_secs: u64,
        demo_mode: bool,
    },
    SignalUpdate(MarketData),
    PositionSnapshot {
        positions: Vec<Position>,
    },
    TradeHistory {
        trades: Vec<TradeRecord>,
    },
}

/// Latest state kept for request/response endpoints
#[derive(Debug, Clone, Default, Serialize)]
pub struct Snapshot {
    pub balance: f64,
    pub total_unrealized_pnl: f64,
    pub active_positions: usize,
    pub uptime_secs: u64,
    pub demo_mode: bool,
    pub markets: HashMap<String, MarketData>,
    pub positions: Vec<Position>,
    pub trades: Vec<TradeRecord>,
}

/// Periodic recomputation of signals/positions for dashboard consumers.
pub struct TelemetryFeed {
    exchange: ExchangeClient,
    tracker: AccountTracker,
    strategy: Arc<dyn Strategy>,
    symbols: Vec<String>,
    candle_interval: String,
    kline_limit: u32,
    cadence: Duration,
    trade_log: TradeLog,
    events: broadcast::Sender<TelemetryEvent>,
    snapshot: Arc<RwLock<Snapshot>>,
    started_at: Instant,
}

impl TelemetryFeed {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        exchange: ExchangeClient,
        strategy: Arc<dyn Strategy>,
        symbols: Vec<String>,
        candle_interval: String,
        kline_limit: u32,
        cadence: Duration,
        trade_log: TradeLog,
    ) -> Self {
        let (events, _) = broadcast::channel(100);
        let tracker = AccountTracker::new(exchange.clone());

        Self {
            exchange,
            tracker,
            strategy,
            symbols,
            candle_interval,
            kline_limit,
            cadence,
            trade_log,
            events,
            snapshot: Arc::new(RwLock::new(Snapshot::default())),
            started_at: Instant::now(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TelemetryEvent> {
        self.events.subscribe()
    }

    pub fn sender(&self) -> broadcast::Sender<TelemetryEvent> {
        self.events.clone()
    }

    pub fn snapshot_handle(&self) -> Arc<RwLock<Snapshot>> {
        self.snapshot.clone()
    }

    /// Run until the shutdown signal flips
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            symbols = self.symbols.len(),
            cadence_secs = self.cadence.as_secs(),
            "telemetry feed starting"
        );

        let mut ticker = interval(self.cadence);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            if *shutdown.borrow() {
                break;
            }
            self.refresh().await;
        }

        tracing::info!("telemetry feed stopped");
    }

    /// One feed tick: recompute everything and publish
    pub async fn refresh(&self) {
        let mut markets = HashMap::new();

        for symbol in &self.symbols {
            match self.market_data(symbol).await {
                Ok(Some(data)) => {
                    let _ = self.events.send(TelemetryEvent::SignalUpdate(data.clone()));
                    markets.insert(symbol.clone(), data);
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(symbol = %symbol, error = %err, "telemetry market refresh failed");
                }
            }
        }

        let mut positions = Vec::new();
        for symbol in &self.symbols {
            match self.tracker.open_position(symbol).await {
                Ok(Some(position)) => positions.push(position),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(symbol = %symbol, error = %err, "telemetry position refresh failed");
                }
            }
        }
        let total_unrealized_pnl: f64 = positions.iter().map(|p| p.unrealized_pnl).sum();

        // On a failed balance query the last known value stands; an unknown
        // balance is not a zero balance.
        let balance = match self.tracker.available_balance("USDT").await {
            Ok(balance) => Some(balance),
            Err(err) => {
                tracing::warn!(error = %err, "telemetry balance refresh failed");
                None
            }
        };

        let uptime_secs = self.started_at.elapsed().as_secs();
        let trades = self.trade_log.recent(TRADE_HISTORY_EVENT_LEN);

        {
            let mut snapshot = self.snapshot.write().unwrap();
            if let Some(balance) = balance {
                snapshot.balance = balance;
            }
            snapshot.total_unrealized_pnl = total_unrealized_pnl;
            snapshot.active_positions = positions.len();
            snapshot.uptime_secs = uptime_secs;
            snapshot.demo_mode = self.exchange.is_simulated();
            snapshot.markets = markets;
            snapshot.positions = positions.clone();
            snapshot.trades = trades.clone();
        }

        let status = TelemetryEvent::AccountStatus {
            balance: self.snapshot.read().unwrap().balance,
            total_unrealized_pnl,
            active_positions: positions.len(),
            uptime_secs,
            demo_mode: self.exchange.is_simulated(),
        };
        let _ = self.events.send(status);
        let _ = self.events.send(TelemetryEvent::PositionSnapshot { positions });
        let _ = self.events.send(TelemetryEvent::TradeHistory { trades });
    }

    async fn market_data(&self, symbol: &str) -> anyhow::Result<Option<MarketData>> {
        let candles = self
            .exchange
            .get_klines(symbol, &self.candle_interval, self.kline_limit)
            .await?;
        let candles = crate::models::normalize_candles(candles);

        let Some(last) = candles.last() else {
            return Ok(None);
        };
        let price = last.close;

        // Not enough history is a quiet state here, not a warning.
        let Ok(evaluation) = self.strategy.evaluate(&candles) else {
            return Ok(None);
        };

        Ok(Some(MarketData {
            symbol: symbol.to_string(),
            price,
            ma_short: evaluation.averages.short,
            ma_long: evaluation.averages.long,
            signal: evaluation.signal,
        }))
    }
}
