use crate::error::StreamError;
use crate::packing::combined_stream_url;
use crate::stream::{StreamHistory, StreamId};
use chrono::{TimeZone, Utc};
use configuration::StreamingConfig;
use core_types::Kline;
use futures_util::stream::StreamExt;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{Notify, RwLock, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// The shared map of per-stream history rings. Each ring has its own lock so
/// one stream's writer never blocks another's readers; the outer lock only
/// guards subscription topology changes.
pub type RingMap = Arc<RwLock<HashMap<StreamId, Arc<tokio::sync::Mutex<StreamHistory>>>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    /// No message within the silence window; a reconnect has been requested.
    Stale,
    Reconnecting,
    /// Connect retries were exhausted. Terminal.
    Closed,
}

// --- WebSocket Deserialization Structs ---

#[derive(Debug, Deserialize)]
struct WsStreamWrapper {
    stream: String,
    data: WsKlineEvent,
}

#[derive(Debug, Deserialize)]
struct WsKlineEvent {
    #[serde(rename = "e")]
    event_type: String,
    #[serde(rename = "k")]
    kline: WsKline,
}

#[derive(Debug, Deserialize)]
struct WsKline {
    #[serde(rename = "t")]
    open_time: i64,
    #[serde(rename = "T")]
    close_time: i64,
    #[serde(rename = "o")]
    open: String,
    #[serde(rename = "h")]
    high: String,
    #[serde(rename = "l")]
    low: String,
    #[serde(rename = "c")]
    close: String,
    #[serde(rename = "v")]
    volume: String,
}

impl WsKline {
    fn to_kline(&self) -> Option<Kline> {
        Some(Kline {
            open_time: Utc.timestamp_millis_opt(self.open_time).single()?,
            open: Decimal::from_str(&self.open).ok()?,
            high: Decimal::from_str(&self.high).ok()?,
            low: Decimal::from_str(&self.low).ok()?,
            close: Decimal::from_str(&self.close).ok()?,
            volume: Decimal::from_str(&self.volume).ok()?,
            close_time: Utc.timestamp_millis_opt(self.close_time).single()?,
        })
    }
}

/// One WebSocket connection multiplexing a fixed set of streams.
///
/// The wire protocol carries the subscription set in the URL, so the set is
/// immutable for the connection's lifetime; changing it means replacing the
/// connection. Three tasks run per connection: a reader owning the socket,
/// a consumer applying decoded rows to the rings, and a supervisor watching
/// for silence.
pub struct Connection {
    streams: Vec<StreamId>,
    state: Arc<StdMutex<ConnectionState>>,
    fatal: Arc<StdMutex<Option<String>>>,
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Connection {
    /// Opens a connection for the given stream set and spawns its tasks.
    pub fn spawn(
        config: &StreamingConfig,
        base_url: &str,
        streams: Vec<StreamId>,
        rings: RingMap,
    ) -> Self {
        let url = combined_stream_url(base_url, &streams);
        let state = Arc::new(StdMutex::new(ConnectionState::Connecting));
        let fatal = Arc::new(StdMutex::new(None));
        let (shutdown, _) = watch::channel(false);
        let reconnect = Arc::new(Notify::new());
        let last_message = Arc::new(StdMutex::new(Instant::now()));
        let (tx, rx) = mpsc::channel::<(StreamId, Kline)>(1024);

        let reader = tokio::spawn(reader_task(
            url,
            config.max_connect_retries,
            Duration::from_secs(config.reconnect_backoff_secs),
            Arc::clone(&state),
            Arc::clone(&fatal),
            shutdown.subscribe(),
            Arc::clone(&reconnect),
            Arc::clone(&last_message),
            tx,
        ));
        let consumer = tokio::spawn(consumer_task(rx, rings));
        let supervisor = tokio::spawn(supervisor_task(
            Duration::from_secs(config.max_silence_secs),
            Arc::clone(&state),
            shutdown.subscribe(),
            reconnect,
            last_message,
        ));

        Self {
            streams,
            state,
            fatal,
            shutdown,
            handles: vec![reader, consumer, supervisor],
        }
    }

    pub fn streams(&self) -> &[StreamId] {
        &self.streams
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().expect("connection state poisoned")
    }

    pub fn is_stale(&self) -> bool {
        matches!(self.state(), ConnectionState::Stale | ConnectionState::Closed)
    }

    /// The reason this connection gave up for good, if it did.
    pub fn fatal_reason(&self) -> Option<String> {
        self.fatal.lock().expect("fatal slot poisoned").clone()
    }

    /// Signals all tasks to stop and waits for them, bounded by `timeout`.
    pub async fn close(mut self, timeout: Duration) -> Result<(), StreamError> {
        let _ = self.shutdown.send(true);
        let handles = std::mem::take(&mut self.handles);
        tokio::time::timeout(timeout, futures_util::future::join_all(handles))
            .await
            .map(|_| ())
            .map_err(|_| StreamError::ShutdownTimeout(timeout))
    }
}

#[allow(clippy::too_many_arguments)]
async fn reader_task(
    url: String,
    max_retries: u32,
    base_backoff: Duration,
    state: Arc<StdMutex<ConnectionState>>,
    fatal: Arc<StdMutex<Option<String>>>,
    mut shutdown: watch::Receiver<bool>,
    reconnect: Arc<Notify>,
    last_message: Arc<StdMutex<Instant>>,
    tx: mpsc::Sender<(StreamId, Kline)>,
) {
    let mut attempts: u32 = 0;
    loop {
        if *shutdown.borrow() {
            return;
        }
        tracing::info!(%url, "connecting market data socket");
        let attempt = tokio::select! {
            _ = shutdown.changed() => return,
            attempt = connect_async(url.as_str()) => attempt,
        };
        let mut ws = match attempt {
            Ok((ws, _)) => {
                attempts = 0;
                set_state(&state, ConnectionState::Open);
                *last_message.lock().expect("clock poisoned") = Instant::now();
                ws
            }
            Err(e) => {
                attempts += 1;
                if attempts > max_retries {
                    tracing::error!(error = %e, attempts, "connect retries exhausted, giving up");
                    *fatal.lock().expect("fatal slot poisoned") = Some(e.to_string());
                    set_state(&state, ConnectionState::Closed);
                    return;
                }
                let backoff = base_backoff * 2u32.saturating_pow(attempts - 1);
                tracing::warn!(error = %e, attempts, ?backoff, "connect failed, backing off");
                tokio::select! {
                    _ = shutdown.changed() => return,
                    _ = tokio::time::sleep(backoff) => continue,
                }
            }
        };

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    return;
                }
                _ = reconnect.notified() => {
                    tracing::warn!("reconnect requested, dropping socket");
                    set_state(&state, ConnectionState::Reconnecting);
                    break;
                }
                msg = ws.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            *last_message.lock().expect("clock poisoned") = Instant::now();
                            handle_text(&text, &tx).await;
                        }
                        Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                            *last_message.lock().expect("clock poisoned") = Instant::now();
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(?frame, "socket closed by peer");
                            set_state(&state, ConnectionState::Reconnecting);
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::error!(error = %e, "socket read error");
                            set_state(&state, ConnectionState::Reconnecting);
                            break;
                        }
                        None => {
                            tracing::warn!("socket stream ended");
                            set_state(&state, ConnectionState::Reconnecting);
                            break;
                        }
                    }
                }
            }
        }
    }
}

async fn handle_text(text: &str, tx: &mpsc::Sender<(StreamId, Kline)>) {
    let wrapper = match serde_json::from_str::<WsStreamWrapper>(text) {
        Ok(wrapper) => wrapper,
        Err(e) => {
            tracing::warn!(error = %e, "unparseable stream message");
            return;
        }
    };
    if wrapper.data.event_type != "kline" {
        return;
    }
    let Ok(id) = StreamId::from_stream_name(&wrapper.stream) else {
        tracing::warn!(stream = %wrapper.stream, "message from unrecognized stream");
        return;
    };
    let Some(kline) = wrapper.data.kline.to_kline() else {
        tracing::warn!(stream = %wrapper.stream, "malformed kline payload");
        return;
    };
    if tx.send((id, kline)).await.is_err() {
        tracing::debug!("consumer gone, dropping row");
    }
}

/// Applies decoded rows to their stream's ring, under that ring's own lock.
async fn consumer_task(mut rx: mpsc::Receiver<(StreamId, Kline)>, rings: RingMap) {
    while let Some((id, kline)) = rx.recv().await {
        let ring = {
            let map = rings.read().await;
            map.get(&id).cloned()
        };
        match ring {
            Some(ring) => ring.lock().await.apply(kline),
            // Unsubscribed mid-flight; the row is simply late.
            None => tracing::trace!(stream = %id, "row for unsubscribed stream"),
        }
    }
}

/// Flags the connection stale and requests a reconnect when the socket has
/// been silent past the configured window.
async fn supervisor_task(
    max_silence: Duration,
    state: Arc<StdMutex<ConnectionState>>,
    mut shutdown: watch::Receiver<bool>,
    reconnect: Arc<Notify>,
    last_message: Arc<StdMutex<Instant>>,
) {
    let mut interval = tokio::time::interval(max_silence / 4);
    loop {
        tokio::select! {
            _ = shutdown.changed() => return,
            _ = interval.tick() => {
                let silent_for = last_message.lock().expect("clock poisoned").elapsed();
                let current = *state.lock().expect("connection state poisoned");
                if current == ConnectionState::Open && silent_for > max_silence {
                    tracing::warn!(?silent_for, "connection silent past threshold, marking stale");
                    set_state(&state, ConnectionState::Stale);
                    reconnect.notify_one();
                }
            }
        }
    }
}

fn set_state(state: &Arc<StdMutex<ConnectionState>>, next: ConnectionState) {
    *state.lock().expect("connection state poisoned") = next;
}
