use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One OHLCV candlestick row, ordered oldest to newest inside a history ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub close_time: DateTime<Utc>,
}

/// The matching engine's view of "now": one candle plus a logical clock value.
///
/// In live mode the sequence is derived from wall-clock candle times; in
/// simulate mode it is the replay index. The engine only ever compares
/// sequences for ordering, so the two sources are interchangeable.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub kline: Kline,
    pub sequence: u64,
}

impl Tick {
    pub fn new(kline: Kline, sequence: u64) -> Self {
        Self { kline, sequence }
    }

    pub fn close(&self) -> Decimal {
        self.kline.close
    }
}
