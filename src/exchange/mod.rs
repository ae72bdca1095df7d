// Exchange access module.
//
// All order flow and account queries go through `ExchangeClient`, a
// two-variant capability selected once at construction: a real Bybit
// connection, or the in-memory simulated exchange used by the dashboard's
// demo mode and by tests. Both variants answer the same surface, so nothing
// downstream branches on connectivity.
pub mod bybit;
pub mod simulated;

pub use bybit::BybitClient;
pub use simulated::SimExchange;

use crate::error::ExchangeError;
use crate::models::{BracketLevels, Candle, Order, OrderAck, Position};

#[derive(Clone)]
pub enum ExchangeClient {
    Connected(BybitClient),
    Simulated(SimExchange),
}

impl ExchangeClient {
    pub fn is_simulated(&self) -> bool {
        matches!(self, ExchangeClient::Simulated(_))
    }

    /// Fetch recent candles for a symbol, oldest first, deduplicated
    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Candle>, ExchangeError> {
        match self {
            ExchangeClient::Connected(client) => client.get_klines(symbol, interval, limit).await,
            ExchangeClient::Simulated(sim) => sim.get_klines(symbol, limit),
        }
    }

    /// Available balance for a settlement coin
    pub async fn available_balance(&self, coin: &str) -> Result<f64, ExchangeError> {
        match self {
            ExchangeClient::Connected(client) => client.get_wallet_balance(coin).await,
            ExchangeClient::Simulated(sim) => sim.available_balance(),
        }
    }

    /// Current position for a symbol, if the exchange reports one
    pub async fn position(&self, symbol: &str) -> Result<Option<Position>, ExchangeError> {
        match self {
            ExchangeClient::Connected(client) => client.get_position(symbol).await,
            ExchangeClient::Simulated(sim) => sim.position(symbol),
        }
    }

    /// Place a market order and return the synchronous acknowledgment
    pub async fn place_market_order(&self, order: &Order) -> Result<OrderAck, ExchangeError> {
        match self {
            ExchangeClient::Connected(client) => client.place_market_order(order).await,
            ExchangeClient::Simulated(sim) => sim.place_market_order(order),
        }
    }

    /// Attach stop-loss/take-profit levels to the open position
    pub async fn set_trading_stop(
        &self,
        symbol: &str,
        bracket: &BracketLevels,
    ) -> Result<(), ExchangeError> {
        match self {
            ExchangeClient::Connected(client) => client.set_trading_stop(symbol, bracket).await,
            ExchangeClient::Simulated(sim) => sim.set_trading_stop(symbol, bracket),
        }
    }
}
