// Position and balance tracking.

use crate::error::ExchangeError;
use crate::exchange::ExchangeClient;
use crate::models::Position;

/// Uncached view of the exchange account.
///
/// Every call is a fresh remote query. The extra round-trips are deliberate:
/// the exchange owns the position, and mirroring it per query can never go
/// stale the way a local cache would. A failed query is an error ("unknown
/// state"), never a flat position or a zero balance - conflating the two is
/// how duplicate entries happen.
#[derive(Clone)]
pub struct AccountTracker {
    exchange: ExchangeClient,
}

impl AccountTracker {
    pub fn new(exchange: ExchangeClient) -> Self {
        Self { exchange }
    }

    /// Current position for a symbol, `None` when the exchange reports no
    /// entry
    pub async fn position(&self, symbol: &str) -> Result<Option<Position>, ExchangeError> {
        self.exchange.position(symbol).await
    }

    /// Open position for a symbol, treating zero-size entries as flat
    pub async fn open_position(&self, symbol: &str) -> Result<Option<Position>, ExchangeError> {
        Ok(self
            .position(symbol)
            .await?
            .filter(|position| position.is_open()))
    }

    /// Available balance for a settlement coin
    pub async fn available_balance(&self, coin: &str) -> Result<f64, ExchangeError> {
        self.exchange.available_balance(coin).await
    }
}
