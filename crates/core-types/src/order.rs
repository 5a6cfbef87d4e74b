use crate::enums::{OrderKind, OrderSide};
use crate::pair::Pair;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A typed request to place an order, shared by the live REST path and the
/// simulated matching engine so callers cannot tell the two apart.
///
/// Market orders size themselves either by `quantity` (base asset) or by
/// `quote_quantity` (quote notional, the venue's quoteOrderQty); exactly one
/// of the two must be set. Every other kind requires `quantity`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Caller-side idempotency id, echoed back by the exchange.
    pub client_order_id: Uuid,
    pub pair: Pair,
    pub side: OrderSide,
    pub kind: OrderKind,
    /// Quantity in the base asset.
    pub quantity: Option<Decimal>,
    /// Quote-notional sizing, market orders only.
    pub quote_quantity: Option<Decimal>,
    /// Required for Limit and StopLimit orders.
    pub limit_price: Option<Decimal>,
    /// Required for Stop and StopLimit orders.
    pub stop_price: Option<Decimal>,
}

impl OrderRequest {
    /// Convenience constructor for a market order sized in the base asset.
    pub fn market(pair: Pair, side: OrderSide, quantity: Decimal) -> Self {
        Self {
            client_order_id: Uuid::new_v4(),
            pair,
            side,
            kind: OrderKind::Market,
            quantity: Some(quantity),
            quote_quantity: None,
            limit_price: None,
            stop_price: None,
        }
    }

    /// Convenience constructor for a market order sized by quote notional.
    pub fn market_quote(pair: Pair, side: OrderSide, quote_quantity: Decimal) -> Self {
        Self {
            client_order_id: Uuid::new_v4(),
            pair,
            side,
            kind: OrderKind::Market,
            quantity: None,
            quote_quantity: Some(quote_quantity),
            limit_price: None,
            stop_price: None,
        }
    }

    /// Convenience constructor for a limit order.
    pub fn limit(pair: Pair, side: OrderSide, quantity: Decimal, price: Decimal) -> Self {
        Self {
            client_order_id: Uuid::new_v4(),
            pair,
            side,
            kind: OrderKind::Limit,
            quantity: Some(quantity),
            quote_quantity: None,
            limit_price: Some(price),
            stop_price: None,
        }
    }
}
