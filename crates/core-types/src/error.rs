use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Unsupported interval: {0}")]
    UnsupportedInterval(String),

    #[error("Malformed pair symbol: {0}")]
    MalformedPair(String),
}
