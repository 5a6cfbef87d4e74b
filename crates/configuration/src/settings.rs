use crate::error::ConfigError;
use core_types::{Interval, Pair};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Which path order requests take: the real exchange or the simulator.
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub streaming: StreamingConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub api: ApiConfig,
    /// The streams to subscribe to at startup.
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionConfig>,
}

impl Config {
    /// Rejects configurations the runtime could not honor. Called once at load.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.streaming.max_streams_per_connection == 0 {
            return Err(ConfigError::InvalidValue {
                field: "streaming.max_streams_per_connection".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.streaming.max_url_length < 64 {
            return Err(ConfigError::InvalidValue {
                field: "streaming.max_url_length".into(),
                reason: "must leave room for the base URL".into(),
            });
        }
        for (field, rate) in [
            ("simulation.maker_fee_rate", self.simulation.maker_fee_rate),
            ("simulation.taker_fee_rate", self.simulation.taker_fee_rate),
            ("ledger.buy_rate", self.ledger.buy_rate),
        ] {
            if rate.is_sign_negative() || rate > Decimal::ONE {
                return Err(ConfigError::InvalidValue {
                    field: field.into(),
                    reason: "must be between 0 and 1".into(),
                });
            }
        }
        Ok(())
    }
}

/// The runtime mode selecting which backend the request router talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Orders go to the real exchange over REST.
    Live,
    /// Orders go to the matching engine, driven by preloaded historical data.
    #[default]
    SimulateHistory,
    /// Orders go to the matching engine, driven by the live tick stream.
    SimulateLive,
}

/// Parameters for the multiplexed market-data streaming client.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Hard upper bound on streams multiplexed over one WebSocket connection.
    pub max_streams_per_connection: usize,
    /// Hard upper bound on the serialized combined-stream URL, in bytes.
    /// The wire protocol rejects over-length subscription URLs outright.
    pub max_url_length: usize,
    /// Seconds of silence on a connection before it is considered stale
    /// and forced through a reconnect.
    pub max_silence_secs: u64,
    /// How many rows each stream's history ring retains.
    pub history_capacity: usize,
    /// Seconds a subscribe call may wait in the ticket queue before it
    /// fails with a congestion error.
    pub ticket_timeout_secs: u64,
    /// Maximum consecutive failed connect attempts before the connection
    /// surfaces a fatal connectivity error.
    pub max_connect_retries: u32,
    /// Base delay between connect retries; doubled per attempt.
    pub reconnect_backoff_secs: u64,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            max_streams_per_connection: 16,
            max_url_length: 2048,
            max_silence_secs: 60,
            history_capacity: 500,
            ticket_timeout_secs: 30,
            max_connect_retries: 5,
            reconnect_backoff_secs: 2,
        }
    }
}

/// Parameters for the simulated exchange.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Fee rate for orders matched at their requested (resting) price.
    /// 0.001 corresponds to 0.1%.
    pub maker_fee_rate: Decimal,
    /// Fee rate for orders matched immediately at a tick's close price.
    pub taker_fee_rate: Decimal,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            maker_fee_rate: dec!(0.001),
            taker_fee_rate: dec!(0.001),
        }
    }
}

/// Parameters governing the wallet's capital allocation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Absolute ceiling on the quote amount committed to a single buy.
    pub max_buy: Decimal,
    /// Fraction of current spot available per buy; the more restrictive of
    /// this and `max_buy` wins.
    pub buy_rate: Decimal,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_buy: dec!(1000),
            buy_rate: dec!(0.1),
        }
    }
}

/// Credentials and endpoints for the live REST and WebSocket APIs.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ApiConfig {
    /// When false, the testnet endpoints are used.
    pub live_trading: bool,
    pub keys: ApiKeys,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ApiKeys {
    pub key: String,
    pub secret: String,
}

/// One stream to subscribe to at startup, e.g. BTCUSDT at 1m.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionConfig {
    pub pair: Pair,
    pub interval: Interval,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        let config = Config {
            mode: Mode::default(),
            streaming: StreamingConfig::default(),
            simulation: SimulationConfig::default(),
            ledger: LedgerConfig::default(),
            api: ApiConfig::default(),
            subscriptions: Vec::new(),
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_capacity_connection() {
        let mut config = Config {
            mode: Mode::default(),
            streaming: StreamingConfig::default(),
            simulation: SimulationConfig::default(),
            ledger: LedgerConfig::default(),
            api: ApiConfig::default(),
            subscriptions: Vec::new(),
        };
        config.streaming.max_streams_per_connection = 0;
        assert!(config.validate().is_err());
    }
}
