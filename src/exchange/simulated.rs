use chrono::{Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::error::ExchangeError;
use crate::models::{
    BracketLevels, Candle, Order, OrderAck, OrderSide, Position, PositionSide, TradeRecord,
};

/// Candle spacing of the simulated feed
const STEP_MINUTES: i64 = 5;
/// Candles seeded per symbol in demo mode
const DEMO_HISTORY: usize = 120;

/// In-memory exchange.
///
/// Backs the dashboard's demo mode (random-walk prices, instant fills) and
/// the test suite (scripted candles, injectable failures). Clones share
/// state, so the scheduler, tracker and telemetry feed all see the same
/// simulated account.
#[derive(Clone)]
pub struct SimExchange {
    state: Arc<Mutex<SimState>>,
}

struct SimState {
    balance: f64,
    candles: HashMap<String, Vec<Candle>>,
    positions: HashMap<String, Position>,
    brackets: HashMap<String, BracketLevels>,
    orders: Vec<Order>,
    walks: HashMap<String, StdRng>,
    next_order_id: u64,
    fail_klines: HashSet<String>,
    fail_trading_stop: bool,
}

impl SimExchange {
    pub fn new(balance: f64) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                balance,
                candles: HashMap::new(),
                positions: HashMap::new(),
                brackets: HashMap::new(),
                orders: Vec::new(),
                walks: HashMap::new(),
                next_order_id: 1,
                fail_klines: HashSet::new(),
                fail_trading_stop: false,
            })),
        }
    }

    /// Demo-mode exchange: seeded random-walk price history per symbol,
    /// advancing one candle per kline fetch.
    pub fn demo(symbols: &[String], balance: f64) -> Self {
        let sim = Self::new(balance);
        {
            let mut state = sim.state.lock().unwrap();
            for symbol in symbols {
                let mut rng = StdRng::seed_from_u64(seed_for(symbol));
                let candles = seed_walk(&mut rng, base_price(symbol));
                state.candles.insert(symbol.clone(), candles);
                state.walks.insert(symbol.clone(), rng);
            }
        }
        sim
    }

    /// Script the candle series for a symbol (testing)
    pub fn with_candles(self, symbol: &str, candles: Vec<Candle>) -> Self {
        self.state
            .lock()
            .unwrap()
            .candles
            .insert(symbol.to_string(), candles);
        self
    }

    /// Make kline fetches for a symbol fail (testing fault isolation)
    pub fn with_kline_failure(self, symbol: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .fail_klines
            .insert(symbol.to_string());
        self
    }

    /// Make every trading-stop call fail (testing the unprotected-position
    /// path)
    pub fn with_trading_stop_failure(self) -> Self {
        self.state.lock().unwrap().fail_trading_stop = true;
        self
    }

    pub fn get_klines(&self, symbol: &str, limit: u32) -> Result<Vec<Candle>, ExchangeError> {
        let mut state = self.state.lock().unwrap();

        if state.fail_klines.contains(symbol) {
            return Err(ExchangeError::Api {
                code: 10002,
                message: format!("simulated outage fetching klines for {symbol}"),
            });
        }

        // Walking symbols advance one candle per fetch.
        if let Some(mut rng) = state.walks.remove(symbol) {
            let next = state
                .candles
                .get(symbol)
                .and_then(|series| series.last())
                .map(|last| step_candle(&mut rng, last));
            if let Some(candle) = next {
                state.candles.get_mut(symbol).unwrap().push(candle);
            }
            state.walks.insert(symbol.to_string(), rng);
        }

        let series = state.candles.get(symbol).cloned().unwrap_or_default();
        let skip = series.len().saturating_sub(limit as usize);
        Ok(series.into_iter().skip(skip).collect())
    }

    pub fn available_balance(&self) -> Result<f64, ExchangeError> {
        Ok(self.state.lock().unwrap().balance)
    }

    pub fn position(&self, symbol: &str) -> Result<Option<Position>, ExchangeError> {
        let mut state = self.state.lock().unwrap();
        let last_price = last_close(&state, symbol);

        let Some(position) = state.positions.get_mut(symbol) else {
            return Ok(None);
        };

        if let Some(price) = last_price {
            position.unrealized_pnl = (price - position.avg_entry_price) * position.size;
            let cost = position.avg_entry_price * position.size;
            position.pnl_percentage = if cost > 0.0 {
                position.unrealized_pnl / cost * 100.0
            } else {
                0.0
            };
        }

        Ok(Some(position.clone()))
    }

    pub fn place_market_order(&self, order: &Order) -> Result<OrderAck, ExchangeError> {
        let mut state = self.state.lock().unwrap();

        let price = last_close(&state, &order.symbol).ok_or_else(|| ExchangeError::Api {
            code: 10001,
            message: format!("no market data for {}", order.symbol),
        })?;

        match (order.side, order.reduce_only) {
            (OrderSide::Buy, false) => {
                let cost = order.quantity * price;
                if cost > state.balance {
                    return Err(ExchangeError::Api {
                        code: 110007,
                        message: "insufficient available balance".to_string(),
                    });
                }
                state.balance -= cost;

                let entry = state
                    .positions
                    .entry(order.symbol.clone())
                    .or_insert_with(|| Position {
                        symbol: order.symbol.clone(),
                        side: PositionSide::Long,
                        size: 0.0,
                        avg_entry_price: 0.0,
                        unrealized_pnl: 0.0,
                        pnl_percentage: 0.0,
                    });
                let total_cost = entry.avg_entry_price * entry.size + cost;
                entry.size += order.quantity;
                entry.avg_entry_price = total_cost / entry.size;
                entry.side = PositionSide::Long;
            }
            (OrderSide::Sell, true) => {
                let Some(position) = state.positions.remove(&order.symbol) else {
                    return Err(ExchangeError::Api {
                        code: 110017,
                        message: "reduce-only order has no position to reduce".to_string(),
                    });
                };
                state.balance += position.size.min(order.quantity) * price;
                state.brackets.remove(&order.symbol);
            }
            _ => {
                return Err(ExchangeError::Api {
                    code: 10001,
                    message: "unsupported order combination in simulation".to_string(),
                });
            }
        }

        state.orders.push(order.clone());
        let id = state.next_order_id;
        state.next_order_id += 1;
        Ok(OrderAck {
            order_id: format!("sim-{id}"),
        })
    }

    pub fn set_trading_stop(
        &self,
        symbol: &str,
        bracket: &BracketLevels,
    ) -> Result<(), ExchangeError> {
        let mut state = self.state.lock().unwrap();

        if state.fail_trading_stop {
            return Err(ExchangeError::Api {
                code: 10016,
                message: "simulated trading-stop failure".to_string(),
            });
        }
        if !state.positions.contains_key(symbol) {
            return Err(ExchangeError::Api {
                code: 10001,
                message: format!("no open position for {symbol}"),
            });
        }

        state.brackets.insert(symbol.to_string(), *bracket);
        Ok(())
    }

    // ===== Inspection (tests and demo wiring) =====

    pub fn orders(&self) -> Vec<Order> {
        self.state.lock().unwrap().orders.clone()
    }

    pub fn bracket(&self, symbol: &str) -> Option<BracketLevels> {
        self.state.lock().unwrap().brackets.get(symbol).copied()
    }

    pub fn last_price(&self, symbol: &str) -> Option<f64> {
        last_close(&self.state.lock().unwrap(), symbol)
    }
}

fn last_close(state: &SimState, symbol: &str) -> Option<f64> {
    state
        .candles
        .get(symbol)
        .and_then(|series| series.last())
        .map(|candle| candle.close)
}

fn seed_for(symbol: &str) -> u64 {
    symbol.bytes().fold(0u64, |acc, b| {
        acc.wrapping_mul(31).wrapping_add(b as u64)
    })
}

fn base_price(symbol: &str) -> f64 {
    match symbol {
        "BTCUSDT" => 45_000.0,
        "ETHUSDT" => 3_000.0,
        "ADAUSDT" => 0.5,
        "XRPUSDT" => 0.6,
        _ => 1_000.0,
    }
}

fn seed_walk(rng: &mut StdRng, base: f64) -> Vec<Candle> {
    let start = Utc::now() - Duration::minutes(STEP_MINUTES * DEMO_HISTORY as i64);
    let mut candles = Vec::with_capacity(DEMO_HISTORY);
    let mut price = base;

    for i in 0..DEMO_HISTORY {
        let open = price;
        let change: f64 = rng.gen_range(-0.02..0.02);
        price *= 1.0 + change;
        candles.push(Candle {
            timestamp: start + Duration::minutes(STEP_MINUTES * i as i64),
            open,
            high: open.max(price) * 1.001,
            low: open.min(price) * 0.999,
            close: price,
            volume: rng.gen_range(500.0..5_000.0),
        });
    }
    candles
}

fn step_candle(rng: &mut StdRng, last: &Candle) -> Candle {
    let change: f64 = rng.gen_range(-0.02..0.02);
    let close = last.close * (1.0 + change);
    Candle {
        timestamp: last.timestamp + Duration::minutes(STEP_MINUTES),
        open: last.close,
        high: last.close.max(close) * 1.001,
        low: last.close.min(close) * 0.999,
        close,
        volume: rng.gen_range(500.0..5_000.0),
    }
}

/// Fabricated fill history shown by the dashboard before any real activity
/// exists (demo mode only)
pub fn demo_trade_history(symbols: &[String], count: usize) -> Vec<TradeRecord> {
    let mut rng = rand::thread_rng();
    let mut trades = Vec::with_capacity(count);

    for i in 0..count {
        let symbol = &symbols[i % symbols.len().max(1)];
        let side = if rng.gen_bool(0.5) {
            OrderSide::Buy
        } else {
            OrderSide::Sell
        };
        let price = base_price(symbol) * rng.gen_range(0.95..1.05);
        let mut record = TradeRecord::new(
            symbol,
            side,
            (rng.gen_range(0.001..0.1f64) * 1_000.0).round() / 1_000.0,
            (price * 100.0).round() / 100.0,
            "Filled (Demo)",
        );
        record.time = Utc::now() - Duration::hours((count - i) as i64 * 2);
        trades.push(record);
    }
    trades
}
