use crate::error::StreamError;
use chrono::{DateTime, Duration, TimeZone, Utc};
use core_types::{Interval, Kline, Pair};
use std::collections::VecDeque;
use std::fmt;

/// The identity of a logical subscription: one pair at one interval.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamId {
    pub pair: Pair,
    pub interval: Interval,
}

impl StreamId {
    pub fn new(pair: Pair, interval: Interval) -> Self {
        Self { pair, interval }
    }

    /// The wire name used inside combined-stream URLs, e.g. "btcusdt@kline_1m".
    pub fn stream_name(&self) -> String {
        format!("{}@kline_{}", self.pair.stream_symbol(), self.interval)
    }

    /// Parses the wire name back into an id, for routing inbound messages.
    pub fn from_stream_name(name: &str) -> Result<Self, StreamError> {
        let (symbol, rest) = name
            .split_once("@kline_")
            .ok_or_else(|| StreamError::MalformedStreamName(name.to_string()))?;
        let pair = Pair::from_symbol(symbol)
            .map_err(|_| StreamError::MalformedStreamName(name.to_string()))?;
        let interval = rest
            .parse::<Interval>()
            .map_err(|_| StreamError::MalformedStreamName(name.to_string()))?;
        Ok(Self { pair, interval })
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.pair, self.interval)
    }
}

/// A fixed-capacity ring of OHLCV rows for one stream, ordered oldest to
/// newest, plus the reset watermark after which the ring is rebuilt from
/// fresh data instead of extended incrementally.
///
/// Writers must hold the per-stream lock while applying updates; readers
/// only ever receive snapshot copies, so they never observe a partially
/// updated row.
#[derive(Debug)]
pub struct StreamHistory {
    id: StreamId,
    capacity: usize,
    rows: VecDeque<Kline>,
    /// Set from the first applied row, so replayed data resets on its own
    /// timeline rather than the host's wall clock.
    next_reset: Option<DateTime<Utc>>,
}

impl StreamHistory {
    pub fn new(id: StreamId, capacity: usize) -> Self {
        Self {
            id,
            capacity,
            rows: VecDeque::with_capacity(capacity),
            next_reset: None,
        }
    }

    pub fn id(&self) -> &StreamId {
        &self.id
    }

    /// Applies one inbound candle.
    ///
    /// A row with the same open time as the newest row replaces it (the
    /// candle is still open); a newer open time evicts the oldest row and
    /// appends (the previous candle closed). Rows older than the newest are
    /// late duplicates from a reconnect replay and are dropped.
    pub fn apply(&mut self, kline: Kline) {
        match self.next_reset {
            None => self.next_reset = Some(next_utc_midnight(kline.open_time)),
            Some(watermark) if kline.open_time >= watermark => {
                tracing::debug!(stream = %self.id, "reset watermark passed, rebuilding ring");
                self.rows.clear();
                self.next_reset = Some(next_utc_midnight(kline.open_time));
            }
            Some(_) => {}
        }

        match self.rows.back() {
            Some(last) if last.open_time == kline.open_time => {
                *self.rows.back_mut().expect("back exists") = kline;
            }
            Some(last) if kline.open_time < last.open_time => {
                tracing::trace!(stream = %self.id, "dropping stale row after reconnect");
            }
            _ => {
                if self.rows.len() == self.capacity {
                    self.rows.pop_front();
                }
                self.rows.push_back(kline);
            }
        }
    }

    /// A copy of the ring, oldest to newest. Never exposes the live buffer.
    pub fn snapshot(&self) -> Vec<Kline> {
        self.rows.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<&Kline> {
        self.rows.back()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn next_utc_midnight(after: DateTime<Utc>) -> DateTime<Utc> {
    let next_day = after.date_naive() + Duration::days(1);
    Utc.from_utc_datetime(&next_day.and_hms_opt(0, 0, 0).expect("midnight is valid"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn id() -> StreamId {
        StreamId::new(Pair::new("BTC", "USDT"), Interval::OneMinute)
    }

    fn kline_at(minute: i64, close: rust_decimal::Decimal) -> Kline {
        let open_time = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
            + Duration::minutes(minute);
        Kline {
            open_time,
            open: close,
            high: close,
            low: close,
            close,
            volume: dec!(1),
            close_time: open_time + Duration::minutes(1),
        }
    }

    #[test]
    fn stream_name_round_trips() {
        let id = id();
        assert_eq!(id.stream_name(), "btcusdt@kline_1m");
        assert_eq!(StreamId::from_stream_name("btcusdt@kline_1m").unwrap(), id);
        assert!(StreamId::from_stream_name("btcusdt@depth").is_err());
    }

    #[test]
    fn same_open_time_replaces_the_open_candle() {
        let mut history = StreamHistory::new(id(), 10);
        history.apply(kline_at(0, dec!(100)));
        history.apply(kline_at(0, dec!(101)));

        assert_eq!(history.len(), 1);
        assert_eq!(history.latest().unwrap().close, dec!(101));
    }

    #[test]
    fn newer_open_time_appends_and_evicts_at_capacity() {
        let mut history = StreamHistory::new(id(), 3);
        for minute in 0..5 {
            history.apply(kline_at(minute, dec!(100) + rust_decimal::Decimal::from(minute)));
        }

        let rows = history.snapshot();
        assert_eq!(rows.len(), 3);
        // Oldest rows were evicted; order is oldest to newest.
        assert_eq!(rows[0].close, dec!(102));
        assert_eq!(rows[2].close, dec!(104));
    }

    #[test]
    fn stale_rows_from_a_reconnect_replay_are_dropped() {
        let mut history = StreamHistory::new(id(), 10);
        history.apply(kline_at(5, dec!(105)));
        history.apply(kline_at(3, dec!(103)));

        assert_eq!(history.len(), 1);
        assert_eq!(history.latest().unwrap().close, dec!(105));
    }

    #[test]
    fn snapshot_is_a_copy() {
        let mut history = StreamHistory::new(id(), 10);
        history.apply(kline_at(0, dec!(100)));
        let snapshot = history.snapshot();
        history.apply(kline_at(1, dec!(200)));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].close, dec!(100));
    }

    #[test]
    fn watermark_crossing_rebuilds_instead_of_extending() {
        let mut history = StreamHistory::new(id(), 10);
        history.apply(kline_at(0, dec!(100)));
        assert_eq!(history.len(), 1);

        // A candle from after the watermark wipes the ring and starts fresh.
        let tomorrow = kline_at(24 * 60, dec!(300));
        history.apply(tomorrow);
        assert_eq!(history.len(), 1);
        assert_eq!(history.latest().unwrap().close, dec!(300));
    }
}
