use configuration::Mode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RouterError {
    #[error(transparent)]
    Api(#[from] api_client::error::ApiError),

    #[error(transparent)]
    Matching(#[from] matching::error::MatchingError),

    #[error(transparent)]
    Stream(#[from] streams::StreamError),

    /// The replay clock ran past the end of the loaded data. Terminal:
    /// callers use this to end a backtest cleanly, not as a transient fault.
    #[error("Replay exhausted after {0} ticks")]
    ReplayExhausted(u64),

    #[error("No market data available yet for {0}")]
    NoMarketData(String),

    #[error("Operation `{operation}` is not available in {mode:?} mode")]
    UnsupportedInMode {
        operation: &'static str,
        mode: Mode,
    },

    #[error("Order response carried an unrecognized symbol: {0}")]
    MalformedResponse(String),
}
