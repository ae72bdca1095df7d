// Order execution module
pub mod executor;

pub use executor::{ExecutionOutcome, ExecutorConfig, OrderExecutor};
pub use executor::{quantity_decimals, size_order};
