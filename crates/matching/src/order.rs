use api_client::{Fill, OrderResponse};
use chrono::{DateTime, Utc};
use core_types::{OrderKind, OrderSide, OrderStatus, Pair};
use rust_decimal::Decimal;
use uuid::Uuid;

/// An order resting inside the matching engine's fake book.
///
/// Created on submit, becomes terminal exactly once (via evaluation or an
/// explicit cancel) and is never resurrected afterwards.
#[derive(Debug, Clone)]
pub struct PendingOrder {
    pub order_id: u64,
    pub client_order_id: Uuid,
    pub pair: Pair,
    pub side: OrderSide,
    pub kind: OrderKind,
    /// Quantity after step-size rounding.
    pub quantity: Decimal,
    /// Limit price after tick-size rounding, for Limit and StopLimit kinds.
    pub limit_price: Option<Decimal>,
    /// Stop price after tick-size rounding, for Stop and StopLimit kinds.
    pub stop_price: Option<Decimal>,
    pub status: OrderStatus,
    /// Set once the stop condition has fired; from then on a StopLimit
    /// behaves as a plain limit order.
    pub triggered: bool,
    pub created_at: DateTime<Utc>,
}

/// The outcome of evaluating an order against one tick.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Nothing happened; the order keeps resting.
    None,
    /// The stop condition fired but the limit leg did not fill yet.
    Triggered,
    /// The order filled completely.
    Filled {
        price: Decimal,
        fee: Decimal,
        fee_asset: String,
    },
}

impl PendingOrder {
    /// Builds the exchange-shaped response for the order's current state.
    /// Field-for-field identical to the live REST order object.
    pub fn to_response(&self, fill: Option<&Fill>) -> OrderResponse {
        let now_ms = Utc::now().timestamp_millis();
        let (executed_qty, cummulative_quote_qty, fills) = match fill {
            Some(fill) => (
                fill.qty,
                fill.qty * fill.price,
                vec![fill.clone()],
            ),
            None => (Decimal::ZERO, Decimal::ZERO, Vec::new()),
        };

        OrderResponse {
            symbol: self.pair.symbol(),
            kind: self.kind,
            side: self.side,
            status: self.status,
            order_id: self.order_id,
            client_order_id: self.client_order_id.to_string(),
            price: self.limit_price.unwrap_or(Decimal::ZERO),
            stop_price: self.stop_price.unwrap_or(Decimal::ZERO),
            orig_qty: self.quantity,
            executed_qty,
            cummulative_quote_qty,
            time: self.created_at.timestamp_millis(),
            transact_time: now_ms,
            fills,
        }
    }
}
