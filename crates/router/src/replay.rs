use crate::error::RouterError;
use core_types::{Kline, Pair, Tick};
use std::collections::HashMap;
use streams::StreamId;

/// The historical tick source for simulate-from-history mode.
///
/// All loaded series advance in lockstep under one global cursor, so a
/// backtest over several pairs sees a consistent "now" at every step. The
/// cursor is the ticks' logical clock, which is what makes replays
/// deterministic: the same data always produces the same tick sequence.
#[derive(Debug, Default)]
pub struct ReplaySession {
    series: HashMap<StreamId, Vec<Kline>>,
    cursor: u64,
    /// The shortest loaded series bounds the replay; lockstep ends when any
    /// series runs out.
    len: usize,
}

impl ReplaySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads one stream's historical rows. Rows are expected oldest to
    /// newest, as returned by the REST kline endpoint.
    pub fn load(&mut self, id: StreamId, klines: Vec<Kline>) {
        self.len = if self.series.is_empty() {
            klines.len()
        } else {
            self.len.min(klines.len())
        };
        self.series.insert(id, klines);
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The tick every loaded stream is currently positioned at.
    pub fn ticks(&self) -> Vec<(StreamId, Tick)> {
        self.series
            .iter()
            .filter_map(|(id, rows)| {
                rows.get(self.cursor as usize)
                    .map(|kline| (id.clone(), Tick::new(kline.clone(), self.cursor)))
            })
            .collect()
    }

    /// The current tick of the first loaded stream trading `pair`.
    pub fn current_for_pair(&self, pair: &Pair) -> Option<Tick> {
        self.series.iter().find_map(|(id, rows)| {
            if id.pair == *pair {
                rows.get(self.cursor as usize)
                    .map(|kline| Tick::new(kline.clone(), self.cursor))
            } else {
                None
            }
        })
    }

    /// Steps the global clock forward by one tick.
    ///
    /// Stepping past the end of the shortest loaded series is the replay's
    /// terminal signal, not a transient failure.
    pub fn advance(&mut self) -> Result<u64, RouterError> {
        let next = self.cursor + 1;
        if (next as usize) >= self.len {
            return Err(RouterError::ReplayExhausted(self.cursor + 1));
        }
        self.cursor = next;
        Ok(next)
    }
}
