// Core modules
pub mod account;
pub mod config;
pub mod error;
pub mod exchange;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod scheduler;
pub mod server;
pub mod strategy;
pub mod telemetry;

// Re-export commonly used types
pub use config::BotConfig;
pub use error::{ConfigError, ExchangeError, StrategyError};
pub use exchange::{BybitClient, ExchangeClient, SimExchange};
pub use models::*;
pub use strategy::{CrossoverStrategy, Strategy};
