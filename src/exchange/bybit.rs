use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;

use crate::error::ExchangeError;
use crate::models::{
    normalize_candles, BracketLevels, Candle, Order, OrderAck, Position, PositionSide,
};

const MAINNET_API_BASE: &str = "https://api.bybit.com";
const TESTNET_API_BASE: &str = "https://api-testnet.bybit.com";

/// Bybit v5 request receive window (ms)
const RECV_WINDOW: &str = "5000";

/// All requests target the linear (USDT perpetual) category
const CATEGORY: &str = "linear";

type HmacSha256 = Hmac<Sha256>;

/// Client for the Bybit v5 REST API (linear perpetuals).
///
/// Private endpoints are signed with HMAC-SHA256 over
/// `timestamp + api_key + recv_window + payload`, where payload is the
/// query string for GET and the raw JSON body for POST.
#[derive(Clone)]
pub struct BybitClient {
    client: Client,
    api_key: String,
    api_secret: String,
    base_url: String,
}

// ============== Response Types ==============

#[derive(Debug, Deserialize)]
struct BybitEnvelope {
    #[serde(rename = "retCode")]
    ret_code: i64,
    #[serde(rename = "retMsg")]
    ret_msg: String,
    #[serde(default)]
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct KlineResult {
    list: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct WalletBalanceResult {
    list: Vec<WalletAccount>,
}

#[derive(Debug, Deserialize)]
struct WalletAccount {
    coin: Vec<WalletCoin>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WalletCoin {
    #[serde(default)]
    available_to_withdraw: String,
    #[serde(default)]
    wallet_balance: String,
}

#[derive(Debug, Deserialize)]
struct PositionResult {
    list: Vec<PositionRaw>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionRaw {
    symbol: String,
    side: String,
    size: String,
    #[serde(default)]
    avg_price: String,
    #[serde(default)]
    unrealised_pnl: String,
    #[serde(default)]
    position_value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderCreateResult {
    order_id: String,
}

// ============== Implementation ==============

impl BybitClient {
    pub fn new(api_key: &str, api_secret: &str, testnet: bool) -> Self {
        let base_url = if testnet {
            TESTNET_API_BASE
        } else {
            MAINNET_API_BASE
        };
        Self::with_base_url(api_key, api_secret, base_url)
    }

    /// Create a client against an explicit base URL (testing)
    pub fn with_base_url(api_key: &str, api_secret: &str, base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("HTTP client build failed");

        Self {
            client,
            api_key: api_key.to_owned(),
            api_secret: api_secret.to_owned(),
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    fn sign(&self, timestamp: i64, payload: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(timestamp.to_string().as_bytes());
        mac.update(self.api_key.as_bytes());
        mac.update(RECV_WINDOW.as_bytes());
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    async fn signed_get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &str,
    ) -> Result<T, ExchangeError> {
        let timestamp = Utc::now().timestamp_millis();
        let signature = self.sign(timestamp, query);

        let response = self
            .client
            .get(format!("{}{}?{}", self.base_url, path, query))
            .header("X-BAPI-API-KEY", &self.api_key)
            .header("X-BAPI-TIMESTAMP", timestamp.to_string())
            .header("X-BAPI-RECV-WINDOW", RECV_WINDOW)
            .header("X-BAPI-SIGN", signature)
            .send()
            .await?;

        Self::unwrap_envelope(response).await
    }

    async fn signed_post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, ExchangeError> {
        let body_text =
            serde_json::to_string(body).map_err(|e| ExchangeError::Parse(e.to_string()))?;
        let timestamp = Utc::now().timestamp_millis();
        let signature = self.sign(timestamp, &body_text);

        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header("X-BAPI-API-KEY", &self.api_key)
            .header("X-BAPI-TIMESTAMP", timestamp.to_string())
            .header("X-BAPI-RECV-WINDOW", RECV_WINDOW)
            .header("X-BAPI-SIGN", signature)
            .header("Content-Type", "application/json")
            .body(body_text)
            .send()
            .await?;

        Self::unwrap_envelope(response).await
    }

    async fn public_get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &str,
    ) -> Result<T, ExchangeError> {
        let response = self
            .client
            .get(format!("{}{}?{}", self.base_url, path, query))
            .send()
            .await?;

        Self::unwrap_envelope(response).await
    }

    async fn unwrap_envelope<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ExchangeError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExchangeError::Api {
                code: status.as_u16() as i64,
                message: body,
            });
        }

        let envelope: BybitEnvelope = response.json().await?;
        if envelope.ret_code != 0 {
            return Err(ExchangeError::Api {
                code: envelope.ret_code,
                message: envelope.ret_msg,
            });
        }

        serde_json::from_value(envelope.result).map_err(|e| ExchangeError::Parse(e.to_string()))
    }

    /// Fetch recent klines for a symbol.
    ///
    /// Bybit returns newest first; the result here is chronological and
    /// deduplicated by timestamp.
    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let query = format!(
            "category={}&symbol={}&interval={}&limit={}",
            CATEGORY,
            symbol,
            interval,
            limit.min(1000)
        );
        let result: KlineResult = self.public_get("/v5/market/kline", &query).await?;

        let candles: Vec<Candle> = result
            .list
            .iter()
            .filter_map(|row| parse_kline_row(row))
            .collect();

        Ok(normalize_candles(candles))
    }

    /// Available balance for a coin in the unified account
    pub async fn get_wallet_balance(&self, coin: &str) -> Result<f64, ExchangeError> {
        let query = format!("accountType=UNIFIED&coin={}", coin);
        let result: WalletBalanceResult =
            self.signed_get("/v5/account/wallet-balance", &query).await?;

        let entry = result
            .list
            .first()
            .and_then(|account| account.coin.first())
            .ok_or_else(|| {
                ExchangeError::Parse(format!("no balance entry for {coin} in wallet response"))
            })?;

        // availableToWithdraw is blank for some account modes; fall back to
        // the full wallet balance in that case.
        let text = if entry.available_to_withdraw.is_empty() {
            &entry.wallet_balance
        } else {
            &entry.available_to_withdraw
        };

        text.parse::<f64>()
            .map_err(|_| ExchangeError::Parse(format!("unparseable balance `{text}`")))
    }

    /// Current position for a symbol. `None` when the exchange reports no
    /// entry; a transport or API failure is an error, never `None`.
    pub async fn get_position(&self, symbol: &str) -> Result<Option<Position>, ExchangeError> {
        let query = format!("category={}&symbol={}", CATEGORY, symbol);
        let result: PositionResult = self.signed_get("/v5/position/list", &query).await?;

        let Some(raw) = result.list.into_iter().next() else {
            return Ok(None);
        };

        let size = raw.size.parse::<f64>().unwrap_or(0.0);
        let side = match raw.side.as_str() {
            "Buy" => PositionSide::Long,
            "Sell" => PositionSide::Short,
            _ => PositionSide::Flat,
        };
        let avg_entry_price = raw.avg_price.parse::<f64>().unwrap_or(0.0);
        let unrealized_pnl = raw.unrealised_pnl.parse::<f64>().unwrap_or(0.0);
        let position_value = raw.position_value.parse::<f64>().unwrap_or(0.0);
        let pnl_percentage = if position_value > 0.0 {
            unrealized_pnl / position_value * 100.0
        } else {
            0.0
        };

        Ok(Some(Position {
            symbol: raw.symbol,
            side,
            size,
            avg_entry_price,
            unrealized_pnl,
            pnl_percentage,
        }))
    }

    /// Place a market order (IOC)
    pub async fn place_market_order(&self, order: &Order) -> Result<OrderAck, ExchangeError> {
        let mut body = serde_json::json!({
            "category": CATEGORY,
            "symbol": order.symbol,
            "side": order.side.as_str(),
            "orderType": "Market",
            "qty": format_quantity(order.quantity),
            "timeInForce": "IOC",
        });
        if order.reduce_only {
            body["reduceOnly"] = serde_json::Value::Bool(true);
        }

        let result: OrderCreateResult = self.signed_post("/v5/order/create", &body).await?;
        Ok(OrderAck {
            order_id: result.order_id,
        })
    }

    /// Set stop-loss/take-profit on the open position for a symbol
    pub async fn set_trading_stop(
        &self,
        symbol: &str,
        bracket: &BracketLevels,
    ) -> Result<(), ExchangeError> {
        let body = serde_json::json!({
            "category": CATEGORY,
            "symbol": symbol,
            "stopLoss": format_price(bracket.stop_loss),
            "takeProfit": format_price(bracket.take_profit),
            "positionIdx": 0,
        });

        // Result payload carries no fields of interest.
        let _: serde_json::Value = self.signed_post("/v5/position/trading-stop", &body).await?;
        Ok(())
    }

    /// Connectivity probe: fetch the server time
    pub async fn ping(&self) -> Result<DateTime<Utc>, ExchangeError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct TimeResult {
            time_second: String,
        }

        let result: TimeResult = self.public_get("/v5/market/time", "").await?;
        let secs = result
            .time_second
            .parse::<i64>()
            .map_err(|_| ExchangeError::Parse("unparseable server time".to_string()))?;
        DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| ExchangeError::Parse("server time out of range".to_string()))
    }
}

fn parse_kline_row(row: &[String]) -> Option<Candle> {
    if row.len() < 6 {
        return None;
    }
    let millis = row[0].parse::<i64>().ok()?;
    Some(Candle {
        timestamp: DateTime::from_timestamp_millis(millis)?,
        open: row[1].parse().ok()?,
        high: row[2].parse().ok()?,
        low: row[3].parse().ok()?,
        close: row[4].parse().ok()?,
        volume: row[5].parse().ok()?,
    })
}

/// Render a quantity without trailing zero noise ("0.02", not "0.020000")
fn format_quantity(quantity: f64) -> String {
    let mut text = format!("{:.8}", quantity);
    while text.ends_with('0') {
        text.pop();
    }
    if text.ends_with('.') {
        text.pop();
    }
    text
}

fn format_price(price: f64) -> String {
    format!("{:.4}", price)
}
