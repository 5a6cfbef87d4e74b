use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Amount must not be negative: {0}")]
    NegativeAmount(String),

    #[error("Not enough spot balance. Required: {required}, Available: {available}")]
    InsufficientSpot { required: String, available: String },

    #[error("Not enough {asset} position. Required: {required}, Available: {available}")]
    InsufficientPosition {
        asset: String,
        required: String,
        available: String,
    },

    #[error("Missing market price for asset: {0}")]
    MissingPrice(String),

    #[error("Unsupported snapshot version {found}, expected {expected}")]
    SnapshotVersion { found: u32, expected: u32 },
}
