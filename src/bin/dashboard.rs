//! Companion web process: recomputes signals and positions on its own
//! cadence and streams them to browser subscribers. Runs against the real
//! exchange when credentials are configured and reachable, otherwise falls
//! back to a simulated demo feed instead of refusing to start.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;

use crossbot::config::BotConfig;
use crossbot::exchange::{simulated, BybitClient, ExchangeClient, SimExchange};
use crossbot::server::{self, AppState};
use crossbot::strategy::CrossoverStrategy;
use crossbot::telemetry::{TelemetryFeed, TradeLog};

const DEMO_BALANCE: f64 = 10_000.0;
const DEMO_TRADE_SEED: usize = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let config = BotConfig::load().context("configuration rejected")?;

    let trade_log = TradeLog::default();
    let exchange = connect_or_demo(&config, &trade_log).await;

    let strategy = Arc::new(CrossoverStrategy::new(
        config.ma_short_period,
        config.ma_long_period,
    ));
    let feed = TelemetryFeed::new(
        exchange,
        strategy,
        config.trading_pairs.clone(),
        config.candle_interval.clone(),
        config.kline_limit,
        Duration::from_secs(config.telemetry_interval_seconds),
        trade_log,
    );

    let state = AppState {
        snapshot: feed.snapshot_handle(),
        events: feed.sender(),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let feed_task = tokio::spawn(async move { feed.run(shutdown_rx).await });

    tokio::select! {
        result = server::serve(&config.dashboard_bind_addr, state) => {
            result.context("dashboard server failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received Ctrl+C, shutting down...");
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = feed_task.await;
    tracing::info!("dashboard stopped");
    Ok(())
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crossbot=info,dashboard=info".into()),
        )
        .init();
}

/// Prefer a live connection; fall back to the simulated exchange when keys
/// are absent or the probe fails. The dashboard reflects demo mode rather
/// than crashing.
async fn connect_or_demo(config: &BotConfig, trade_log: &TradeLog) -> ExchangeClient {
    if config.has_credentials() {
        let client = BybitClient::new(&config.api_key, &config.api_secret, config.testnet);
        match client.get_wallet_balance("USDT").await {
            Ok(balance) => {
                tracing::info!(balance, "connected to Bybit");
                return ExchangeClient::Connected(client);
            }
            Err(err) => {
                tracing::warn!(error = %err, "exchange unreachable, continuing in demo mode");
            }
        }
    } else {
        tracing::warn!("API keys not configured - using demo mode");
    }

    for trade in simulated::demo_trade_history(&config.trading_pairs, DEMO_TRADE_SEED) {
        trade_log.record(trade);
    }
    ExchangeClient::Simulated(SimExchange::demo(&config.trading_pairs, DEMO_BALANCE))
}
