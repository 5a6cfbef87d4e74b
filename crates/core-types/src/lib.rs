pub mod enums;
pub mod error;
pub mod kline;
pub mod order;
pub mod pair;

// Re-export the core types to provide a clean public API.
pub use enums::{LiquidityRole, OrderKind, OrderSide, OrderStatus};
pub use error::CoreError;
pub use kline::{Kline, Tick};
pub use order::OrderRequest;
pub use pair::{Asset, Interval, Pair};
