pub mod connection;
pub mod error;
pub mod packing;
pub mod stream;
pub mod ticket;

pub use connection::{Connection, ConnectionState};
pub use error::StreamError;
pub use stream::{StreamHistory, StreamId};

use crate::connection::RingMap;
use crate::packing::{combined_stream_url, pack_streams};
use crate::ticket::TicketQueue;
use configuration::StreamingConfig;
use core_types::{Kline, Tick};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

/// The multiplexed market-data client.
///
/// Owns the WebSocket connections, packs logical streams onto them within
/// the wire protocol's hard bounds, and maintains a bounded history ring per
/// stream. Subscribe and unsubscribe calls are serialized through a FIFO
/// ticket queue because each topology change replaces a connection.
pub struct StreamManager {
    config: StreamingConfig,
    base_url: String,
    rings: RingMap,
    connections: Mutex<Vec<Connection>>,
    tickets: TicketQueue,
}

impl StreamManager {
    pub fn new(config: StreamingConfig, base_url: impl Into<String>) -> Self {
        Self {
            config,
            base_url: base_url.into(),
            rings: Arc::new(RwLock::new(HashMap::new())),
            connections: Mutex::new(Vec::new()),
            tickets: TicketQueue::new(),
        }
    }

    fn ticket_timeout(&self) -> Duration {
        Duration::from_secs(self.config.ticket_timeout_secs)
    }

    fn close_timeout(&self) -> Duration {
        Duration::from_secs(self.config.reconnect_backoff_secs.max(5))
    }

    /// Subscribes to a stream, creating its history ring and placing it on a
    /// connection. Existing subscriptions are unaffected; a duplicate
    /// subscribe is a no-op.
    pub async fn subscribe(&self, id: StreamId) -> Result<(), StreamError> {
        let _ticket = self.tickets.acquire(self.ticket_timeout()).await?;

        {
            let rings = self.rings.read().await;
            if rings.contains_key(&id) {
                tracing::debug!(stream = %id, "already subscribed");
                return Ok(());
            }
        }

        // Reject before touching any connection if the stream could never fit.
        let alone = combined_stream_url(&self.base_url, std::slice::from_ref(&id)).len();
        if alone > self.config.max_url_length {
            return Err(StreamError::UrlTooLong {
                length: alone,
                max: self.config.max_url_length,
            });
        }

        let ring = Arc::new(Mutex::new(StreamHistory::new(
            id.clone(),
            self.config.history_capacity,
        )));
        self.rings.write().await.insert(id.clone(), ring);

        let mut connections = self.connections.lock().await;

        // Try to fit the stream onto an existing connection first. The wire
        // protocol carries the stream set in the URL, so growing a connection
        // means replacing it with one carrying the augmented set.
        for slot in 0..connections.len() {
            let mut augmented = connections[slot].streams().to_vec();
            augmented.push(id.clone());
            let fits = augmented.len() <= self.config.max_streams_per_connection
                && combined_stream_url(&self.base_url, &augmented).len()
                    <= self.config.max_url_length;
            if fits {
                tracing::info!(stream = %id, slot, "adding stream to existing connection");
                let old = connections.remove(slot);
                let closed = old.close(self.close_timeout()).await;
                // The replacement carries the augmented set even when the old
                // socket failed to stop in time, so the connections always
                // cover exactly the subscribed set.
                connections.insert(
                    slot,
                    Connection::spawn(
                        &self.config,
                        &self.base_url,
                        augmented,
                        Arc::clone(&self.rings),
                    ),
                );
                return closed;
            }
        }

        tracing::info!(stream = %id, "opening new connection for stream");
        connections.push(Connection::spawn(
            &self.config,
            &self.base_url,
            vec![id],
            Arc::clone(&self.rings),
        ));
        Ok(())
    }

    /// Removes a stream and its history. The connection that carried it is
    /// replaced with one for the remaining streams, or dropped if empty.
    pub async fn unsubscribe(&self, id: &StreamId) -> Result<(), StreamError> {
        let _ticket = self.tickets.acquire(self.ticket_timeout()).await?;

        if self.rings.write().await.remove(id).is_none() {
            return Err(StreamError::UnknownStream(id.to_string()));
        }

        let mut connections = self.connections.lock().await;
        let Some(slot) = connections
            .iter()
            .position(|c| c.streams().contains(id))
        else {
            return Ok(());
        };

        let old = connections.remove(slot);
        let remaining: Vec<StreamId> = old
            .streams()
            .iter()
            .filter(|s| *s != id)
            .cloned()
            .collect();
        let closed = old.close(self.close_timeout()).await;

        // The remaining streams get their replacement connection regardless
        // of how the old socket went down.
        if !remaining.is_empty() {
            tracing::info!(stream = %id, "restarting connection without stream");
            connections.insert(
                slot,
                Connection::spawn(
                    &self.config,
                    &self.base_url,
                    remaining,
                    Arc::clone(&self.rings),
                ),
            );
        } else {
            tracing::info!(stream = %id, "dropping now-empty connection");
        }
        closed
    }

    /// Subscribes a batch of streams at once, packing them into the fewest
    /// connections both bounds allow.
    pub async fn subscribe_all(&self, ids: Vec<StreamId>) -> Result<(), StreamError> {
        let _ticket = self.tickets.acquire(self.ticket_timeout()).await?;

        let fresh: Vec<StreamId> = {
            let rings = self.rings.read().await;
            ids.into_iter().filter(|id| !rings.contains_key(id)).collect()
        };
        if fresh.is_empty() {
            return Ok(());
        }

        let groups = pack_streams(
            &self.base_url,
            &fresh,
            self.config.max_streams_per_connection,
            self.config.max_url_length,
        )?;

        {
            let mut rings = self.rings.write().await;
            for id in &fresh {
                rings.insert(
                    id.clone(),
                    Arc::new(Mutex::new(StreamHistory::new(
                        id.clone(),
                        self.config.history_capacity,
                    ))),
                );
            }
        }

        let mut connections = self.connections.lock().await;
        for group in groups {
            tracing::info!(streams = group.len(), "opening connection for stream group");
            connections.push(Connection::spawn(
                &self.config,
                &self.base_url,
                group,
                Arc::clone(&self.rings),
            ));
        }
        Ok(())
    }

    /// A copy of the stream's history ring, oldest to newest.
    pub async fn get_history(&self, id: &StreamId) -> Result<Vec<Kline>, StreamError> {
        let ring = {
            let rings = self.rings.read().await;
            rings
                .get(id)
                .cloned()
                .ok_or_else(|| StreamError::UnknownStream(id.to_string()))?
        };
        let history = ring.lock().await;
        Ok(history.snapshot())
    }

    /// The newest row of the stream as a sequenced tick, if any has arrived.
    pub async fn latest_tick(&self, id: &StreamId) -> Result<Option<Tick>, StreamError> {
        let ring = {
            let rings = self.rings.read().await;
            rings
                .get(id)
                .cloned()
                .ok_or_else(|| StreamError::UnknownStream(id.to_string()))?
        };
        let history = ring.lock().await;
        Ok(history.latest().map(|kline| Tick {
            sequence: kline.open_time.timestamp_millis() as u64,
            kline: kline.clone(),
        }))
    }

    pub async fn subscribed(&self) -> Vec<StreamId> {
        self.rings.read().await.keys().cloned().collect()
    }

    /// Whether the connection carrying this stream has gone silent or died.
    pub async fn is_stale(&self, id: &StreamId) -> Result<bool, StreamError> {
        let connections = self.connections.lock().await;
        let connection = connections
            .iter()
            .find(|c| c.streams().contains(id))
            .ok_or_else(|| StreamError::UnknownStream(id.to_string()))?;
        Ok(connection.is_stale())
    }

    /// Surfaces a fatal connectivity failure on the connection carrying this
    /// stream, after its connect retries were exhausted.
    pub async fn health(&self, id: &StreamId) -> Result<(), StreamError> {
        let connections = self.connections.lock().await;
        let connection = connections
            .iter()
            .find(|c| c.streams().contains(id))
            .ok_or_else(|| StreamError::UnknownStream(id.to_string()))?;
        match connection.fatal_reason() {
            Some(reason) => Err(StreamError::Connect {
                attempts: self.config.max_connect_retries,
                reason,
            }),
            None => Ok(()),
        }
    }

    /// Stops every connection, bounded per connection by the close timeout.
    /// Every connection is attempted even when one fails to stop; the first
    /// failure is surfaced after the sweep.
    pub async fn close(&self) -> Result<(), StreamError> {
        let mut connections = self.connections.lock().await;
        let mut first_error = None;
        for connection in connections.drain(..) {
            if let Err(e) = connection.close(self.close_timeout()).await {
                tracing::error!(error = %e, "connection did not stop in time");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
