use serde::Deserialize;

use crate::error::ConfigError;

/// Process-lifetime configuration, loaded once at startup.
///
/// Sources are layered: an optional `config.toml` (or the file named by
/// `CROSSBOT_CONFIG`), overridden by `CROSSBOT_*` environment variables.
/// `.env` is loaded by the binaries before this runs.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    #[serde(default = "default_testnet")]
    pub testnet: bool,

    #[serde(default = "default_trading_pairs")]
    pub trading_pairs: Vec<String>,

    #[serde(default = "default_short_period")]
    pub ma_short_period: usize,
    #[serde(default = "default_long_period")]
    pub ma_long_period: usize,

    /// Stop-loss distance from entry, in percent (2.0 = 2%)
    #[serde(default = "default_stop_loss")]
    pub stop_loss_percentage: f64,
    /// Take-profit distance from entry, in percent
    #[serde(default = "default_take_profit")]
    pub take_profit_percentage: f64,
    /// Fraction of available balance committed per entry
    #[serde(default = "default_position_fraction")]
    pub position_size_fraction: f64,

    /// Candle interval in Bybit notation ("1", "5", "60", "D", ...)
    #[serde(default = "default_candle_interval")]
    pub candle_interval: String,
    /// Candles requested per fetch
    #[serde(default = "default_kline_limit")]
    pub kline_limit: u32,

    /// Sleep between full trading rounds
    #[serde(default = "default_trading_interval")]
    pub trading_interval_seconds: u64,
    /// Dashboard feed cadence
    #[serde(default = "default_telemetry_interval")]
    pub telemetry_interval_seconds: u64,
    #[serde(default = "default_bind_addr")]
    pub dashboard_bind_addr: String,
}

fn default_testnet() -> bool {
    true
}
fn default_trading_pairs() -> Vec<String> {
    vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()]
}
fn default_short_period() -> usize {
    20
}
fn default_long_period() -> usize {
    50
}
fn default_stop_loss() -> f64 {
    2.0
}
fn default_take_profit() -> f64 {
    4.0
}
fn default_position_fraction() -> f64 {
    0.1
}
fn default_candle_interval() -> String {
    "5".to_string()
}
fn default_kline_limit() -> u32 {
    100
}
fn default_trading_interval() -> u64 {
    60
}
fn default_telemetry_interval() -> u64 {
    3
}
fn default_bind_addr() -> String {
    "0.0.0.0:5000".to_string()
}

impl BotConfig {
    /// Load and validate configuration. Trading processes must call this
    /// before doing anything else; a failure here is fatal.
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var("CROSSBOT_CONFIG").unwrap_or_else(|_| "config".to_string());

        let settings = config::Config::builder()
            .add_source(config::File::with_name(&path).required(false))
            .add_source(
                config::Environment::with_prefix("CROSSBOT")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("trading_pairs"),
            )
            .build()?;

        let config: BotConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Structural validation shared by both binaries. Credential checks are
    /// separate because the dashboard may legitimately run without keys.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trading_pairs.is_empty() {
            return Err(ConfigError::MissingField("trading_pairs"));
        }
        if self.ma_short_period == 0 || self.ma_long_period == 0 {
            return Err(ConfigError::Invalid(
                "moving-average periods must be positive".to_string(),
            ));
        }
        if self.ma_short_period >= self.ma_long_period {
            return Err(ConfigError::Invalid(format!(
                "ma_short_period ({}) must be less than ma_long_period ({})",
                self.ma_short_period, self.ma_long_period
            )));
        }
        if !(self.position_size_fraction > 0.0 && self.position_size_fraction <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "position_size_fraction must be in (0, 1], got {}",
                self.position_size_fraction
            )));
        }
        if self.stop_loss_percentage <= 0.0 || self.take_profit_percentage <= 0.0 {
            return Err(ConfigError::Invalid(
                "stop-loss and take-profit percentages must be positive".to_string(),
            ));
        }
        if self.trading_interval_seconds == 0 || self.telemetry_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "polling intervals must be positive".to_string(),
            ));
        }
        if (self.kline_limit as usize) < self.ma_long_period + 1 {
            return Err(ConfigError::Invalid(format!(
                "kline_limit ({}) too small for ma_long_period ({})",
                self.kline_limit, self.ma_long_period
            )));
        }
        Ok(())
    }

    /// Fail fast on missing or template credentials. The trading bot calls
    /// this at startup so a misconfigured key pair dies before the first
    /// trade, not at it.
    pub fn require_credentials(&self) -> Result<(), ConfigError> {
        if self.api_key.is_empty() {
            return Err(ConfigError::MissingField("api_key"));
        }
        if self.api_secret.is_empty() {
            return Err(ConfigError::MissingField("api_secret"));
        }
        if self.api_key.starts_with("YOUR_") {
            return Err(ConfigError::Placeholder("api_key"));
        }
        if self.api_secret.starts_with("YOUR_") {
            return Err(ConfigError::Placeholder("api_secret"));
        }
        Ok(())
    }

    pub fn has_credentials(&self) -> bool {
        self.require_credentials().is_ok()
    }
}
