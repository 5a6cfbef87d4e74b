pub mod error;
pub mod snapshot;
pub mod transaction;
pub mod wallet;

// Re-export the core types to provide a clean public API.
pub use error::LedgerError;
pub use snapshot::{SNAPSHOT_VERSION, WalletSnapshot};
pub use transaction::{Transaction, TransactionKind};
pub use wallet::{TradeFill, Wallet};
