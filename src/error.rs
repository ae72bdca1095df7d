use thiserror::Error;

/// Fatal startup errors. The process must not start trading when any of
/// these fire; they are the only errors allowed to terminate the process.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required config field `{0}`")]
    MissingField(&'static str),

    #[error("config field `{0}` still contains its placeholder value")]
    Placeholder(&'static str),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to read configuration: {0}")]
    Source(#[from] config::ConfigError),
}

/// Errors from the exchange boundary.
///
/// `Transport` means the call never got a definitive answer ("unknown
/// state") - callers must not treat it as a flat position or zero balance.
/// `Api` means the exchange answered with a non-zero result code; for order
/// placement that is a rejection, logged and not retried within the cycle.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("exchange unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("exchange API error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("unexpected exchange response: {0}")]
    Parse(String),
}

impl ExchangeError {
    /// True when the call may have reached the exchange but we never saw a
    /// definitive answer, so account state is unknown.
    pub fn is_transient(&self) -> bool {
        matches!(self, ExchangeError::Transport(_))
    }
}

/// Errors from signal computation.
#[derive(Debug, Error, PartialEq)]
pub enum StrategyError {
    #[error("insufficient data: {have} candles, need at least {need}")]
    InsufficientData { have: usize, need: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_is_not_transient() {
        let err = ExchangeError::Api {
            code: 10001,
            message: "params error".to_string(),
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn test_insufficient_data_display() {
        let err = StrategyError::InsufficientData { have: 3, need: 50 };
        assert_eq!(
            err.to_string(),
            "insufficient data: 3 candles, need at least 50"
        );
    }
}
