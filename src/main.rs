use anyhow::Context;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crossbot::config::BotConfig;
use crossbot::exchange::{BybitClient, ExchangeClient};
use crossbot::execution::{ExecutorConfig, OrderExecutor};
use crossbot::scheduler::{Scheduler, SchedulerConfig};
use crossbot::strategy::CrossoverStrategy;
use crossbot::telemetry::TradeLog;

#[derive(Parser)]
#[command(name = "crossbot", about = "Moving-average crossover trading bot for Bybit")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the trading loop (default)
    Run,
    /// Validate configuration and exchange connectivity, then exit
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();

    // Only a configuration failure may stop the process from starting.
    let config = BotConfig::load().context("configuration rejected")?;
    config
        .require_credentials()
        .context("API credentials missing or placeholder")?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Check => check(&config).await,
        Command::Run => run(config).await,
    }
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crossbot=info".into()),
        )
        .init();
}

/// One-shot startup validation: exit 0 when config and connectivity pass
async fn check(config: &BotConfig) -> anyhow::Result<()> {
    let client = BybitClient::new(&config.api_key, &config.api_secret, config.testnet);

    let server_time = client.ping().await.context("exchange unreachable")?;
    let balance = client
        .get_wallet_balance("USDT")
        .await
        .context("wallet balance query failed - check API key permissions")?;

    tracing::info!(%server_time, balance, "connectivity check passed");
    println!("OK: connected, balance {balance:.4} USDT");
    Ok(())
}

async fn run(config: BotConfig) -> anyhow::Result<()> {
    tracing::info!("crossbot starting");
    tracing::info!(
        pairs = ?config.trading_pairs,
        short = config.ma_short_period,
        long = config.ma_long_period,
        "strategy: moving-average crossover"
    );

    let client = BybitClient::new(&config.api_key, &config.api_secret, config.testnet);

    // Probe the account before the first cycle so bad credentials fail the
    // startup, not the first trade.
    let balance = client
        .get_wallet_balance("USDT")
        .await
        .context("connectivity validation failed")?;
    tracing::info!(
        balance,
        network = if config.testnet { "testnet" } else { "mainnet" },
        "connected to Bybit"
    );

    let exchange = ExchangeClient::Connected(client);
    let strategy = Arc::new(CrossoverStrategy::new(
        config.ma_short_period,
        config.ma_long_period,
    ));
    let executor = OrderExecutor::new(
        exchange.clone(),
        ExecutorConfig {
            position_size_fraction: config.position_size_fraction,
            stop_loss_pct: config.stop_loss_percentage,
            take_profit_pct: config.take_profit_percentage,
            ..ExecutorConfig::default()
        },
    );
    let trade_log = TradeLog::default();

    let scheduler = Scheduler::new(
        exchange,
        strategy,
        executor,
        trade_log.clone(),
        SchedulerConfig {
            symbols: config.trading_pairs.clone(),
            candle_interval: config.candle_interval.clone(),
            kline_limit: config.kline_limit,
            poll_interval: Duration::from_secs(config.trading_interval_seconds),
        },
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut scheduler_task = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received Ctrl+C, shutting down...");
            let _ = shutdown_tx.send(true);
            let _ = (&mut scheduler_task).await;
        }
        result = &mut scheduler_task => {
            tracing::error!("scheduler exited unexpectedly: {:?}", result);
        }
    }

    tracing::info!(executed_trades = trade_log.len(), "crossbot stopped");
    Ok(())
}
