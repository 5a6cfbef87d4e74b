use core_types::{OrderKind, OrderSide, OrderStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// Using `#[serde(rename_all = "camelCase")]` to automatically map from JSON camelCase to Rust snake_case.

/// The exchange's order object, returned by `POST /api/v3/order` and mirrored
/// field-for-field by the simulated matching engine. Calling code must not be
/// able to distinguish a live response from a simulated one structurally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub symbol: String,
    #[serde(rename = "type")]
    pub kind: OrderKind,
    pub side: OrderSide,
    pub status: OrderStatus,
    pub order_id: u64,
    pub client_order_id: String,
    pub price: Decimal,
    pub stop_price: Decimal,
    pub orig_qty: Decimal,
    pub executed_qty: Decimal,
    /// Note: the misspelling is the exchange's, not ours.
    pub cummulative_quote_qty: Decimal,
    /// Creation time, milliseconds since epoch.
    pub time: i64,
    /// Time of the last state transition, milliseconds since epoch.
    pub transact_time: i64,
    pub fills: Vec<Fill>,
}

/// One execution inside an order response. Fills are modeled all-or-nothing,
/// so a filled order carries exactly one of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fill {
    pub price: Decimal,
    pub qty: Decimal,
    pub commission: Decimal,
    pub commission_asset: String,
}

/// Price and quantity filters for one traded pair, from `GET /api/v3/exchangeInfo`.
/// Orders are rounded to these increments and rejected outside the bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolFilters {
    pub symbol: String,
    pub tick_size: Decimal,
    pub step_size: Decimal,
    pub min_qty: Decimal,
    pub max_qty: Decimal,
    pub min_price: Decimal,
    pub max_price: Decimal,
}

/// Represents an error response from the exchange API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub code: i32,
    pub msg: String,
}
