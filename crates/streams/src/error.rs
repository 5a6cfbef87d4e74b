use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamError {
    /// The ticket queue did not reach this caller's turn in time. Retryable;
    /// distinct from connectivity failures.
    #[error("Subscription queue congested: waited {0:?} without reaching the head")]
    Congestion(std::time::Duration),

    #[error("WebSocket connect failed after {attempts} attempts: {reason}")]
    Connect { attempts: u32, reason: String },

    /// A single connection's serialized URL would exceed the wire protocol's
    /// hard limit. The offending subscription is rejected outright.
    #[error("Combined stream URL would be {length} bytes, exceeding the {max} byte limit")]
    UrlTooLong { length: usize, max: usize },

    #[error("Not subscribed to stream: {0}")]
    UnknownStream(String),

    #[error("Stream manager tasks did not stop within {0:?}")]
    ShutdownTimeout(std::time::Duration),

    #[error("Invalid stream name on the wire: {0}")]
    MalformedStreamName(String),
}
