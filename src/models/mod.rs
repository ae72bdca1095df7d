use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// OHLCV candlestick data for one time bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Sort candles ascending by timestamp and drop duplicate buckets.
///
/// The exchange is assumed to return unique timestamps but this is not
/// enforced upstream; every series goes through here before a signal is
/// computed. When two candles share a timestamp the later-fetched one wins.
pub fn normalize_candles(mut candles: Vec<Candle>) -> Vec<Candle> {
    candles.sort_by_key(|c| c.timestamp);
    candles.dedup_by(|next, prev| {
        if next.timestamp == prev.timestamp {
            *prev = next.clone();
            true
        } else {
            false
        }
    });
    candles
}

/// Short/long trailing simple moving averages over close prices
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovingAveragePair {
    pub short: f64,
    pub long: f64,
}

/// Trading signal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

/// Position side as reported by the exchange
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum PositionSide {
    Long,
    Short,
    Flat,
}

/// Open position mirror.
///
/// Owned by the exchange; this struct only reflects the answer of a single
/// position query and is never cached or persisted across cycles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: PositionSide,
    pub size: f64,
    pub avg_entry_price: f64,
    pub unrealized_pnl: f64,
    pub pnl_percentage: f64,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.side != PositionSide::Flat && self.size > 0.0
    }
}

/// Order side
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "Buy",
            OrderSide::Sell => "Sell",
        }
    }
}

/// Market order request. Fire-and-forget: nothing beyond the synchronous
/// acknowledgment is tracked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    pub reduce_only: bool,
}

/// Synchronous order acknowledgment from the exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: String,
}

/// Stop-loss/take-profit pair derived from the entry price
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BracketLevels {
    pub stop_loss: f64,
    pub take_profit: f64,
}

impl BracketLevels {
    /// Derive bracket levels from an entry price and percentages expressed
    /// as whole numbers (2.0 means 2%).
    pub fn from_entry(entry_price: f64, stop_loss_pct: f64, take_profit_pct: f64) -> Self {
        Self {
            stop_loss: entry_price * (1.0 - stop_loss_pct / 100.0),
            take_profit: entry_price * (1.0 + take_profit_pct / 100.0),
        }
    }
}

/// Executed order snapshot kept in the telemetry ring buffer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: Uuid,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    pub price: f64,
    pub time: DateTime<Utc>,
    pub note: String,
}

impl TradeRecord {
    pub fn new(symbol: &str, side: OrderSide, quantity: f64, price: f64, note: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            side,
            quantity,
            price,
            time: Utc::now(),
            note: note.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn candle_at(secs: i64, close: f64) -> Candle {
        Candle {
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1000.0,
        }
    }

    #[test]
    fn test_normalize_sorts_out_of_order_candles() {
        let candles = vec![candle_at(300, 103.0), candle_at(0, 100.0), candle_at(600, 106.0)];
        let normalized = normalize_candles(candles);

        assert_eq!(normalized.len(), 3);
        assert_eq!(normalized[0].close, 100.0);
        assert_eq!(normalized[2].close, 106.0);
    }

    #[test]
    fn test_normalize_dedups_by_timestamp() {
        let candles = vec![
            candle_at(0, 100.0),
            candle_at(300, 101.0),
            candle_at(300, 102.0), // duplicate bucket, later fetch wins
            candle_at(600, 103.0),
        ];
        let normalized = normalize_candles(candles);

        assert_eq!(normalized.len(), 3);
        assert_eq!(normalized[1].close, 102.0);
    }

    #[test]
    fn test_bracket_levels_from_entry() {
        let bracket = BracketLevels::from_entry(50000.0, 2.0, 4.0);
        assert_eq!(bracket.stop_loss, 49000.0);
        assert_eq!(bracket.take_profit, 52000.0);
    }

    #[test]
    fn test_flat_position_is_not_open() {
        let position = Position {
            symbol: "BTCUSDT".to_string(),
            side: PositionSide::Flat,
            size: 0.0,
            avg_entry_price: 0.0,
            unrealized_pnl: 0.0,
            pnl_percentage: 0.0,
        };
        assert!(!position.is_open());
    }

    #[test]
    fn test_long_position_is_open() {
        let position = Position {
            symbol: "BTCUSDT".to_string(),
            side: PositionSide::Long,
            size: 0.02,
            avg_entry_price: 50000.0,
            unrealized_pnl: 12.5,
            pnl_percentage: 1.25,
        };
        assert!(position.is_open());
    }
}
