use crate::error::MatchingError;
use crate::order::{PendingOrder, Transition};
use api_client::{Fill, OrderResponse, SymbolFilters};
use chrono::Utc;
use configuration::SimulationConfig;
use core_types::{LiquidityRole, OrderKind, OrderRequest, OrderSide, OrderStatus, Pair, Tick};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

pub mod error;
pub mod filters;
pub mod order;

pub use order::PendingOrder as Order;

/// The simulated exchange's order-matching engine.
///
/// Given typed order requests and a sequence of ticks, it decides whether,
/// when, at what price and with which fee an order fills, and produces
/// responses shaped identically to the live exchange's order object. The
/// engine is deliberately agnostic about where its ticks come from: the
/// live stream and the historical replay feed it through the same
/// `process_tick` path, which is what keeps backtests and paper trading
/// consistent with each other.
///
/// The engine never touches a wallet; callers apply the returned fills to
/// their own ledger.
pub struct MatchingEngine {
    maker_fee_rate: Decimal,
    taker_fee_rate: Decimal,
    /// Venue filters keyed by canonical symbol.
    filters: HashMap<String, SymbolFilters>,
    /// Every order ever submitted, terminal ones included, keyed by id.
    /// BTreeMap keeps evaluation order deterministic across runs.
    orders: BTreeMap<u64, PendingOrder>,
    /// The last tick seen per pair, used as the "previous" close for
    /// crossing detection.
    last_ticks: HashMap<Pair, Tick>,
    next_order_id: u64,
}

impl MatchingEngine {
    pub fn new(simulation: &SimulationConfig) -> Self {
        Self {
            maker_fee_rate: simulation.maker_fee_rate,
            taker_fee_rate: simulation.taker_fee_rate,
            filters: HashMap::new(),
            orders: BTreeMap::new(),
            last_ticks: HashMap::new(),
            next_order_id: 1,
        }
    }

    /// Installs the venue's per-pair price/quantity filters, typically from
    /// an exchangeInfo download. Pairs without filters fall back to
    /// permissive defaults.
    pub fn set_filters(&mut self, filters: Vec<SymbolFilters>) {
        for f in filters {
            self.filters.insert(f.symbol.clone(), f);
        }
    }

    fn filters_for(&self, pair: &Pair) -> SymbolFilters {
        let symbol = pair.symbol();
        self.filters
            .get(&symbol)
            .cloned()
            .unwrap_or_else(|| filters::permissive(&symbol))
    }

    /// Submits an order: validates required fields per kind, rounds price
    /// and quantity to the venue filters, and immediately evaluates against
    /// the current tick, mirroring the exchange's immediate-or-queue
    /// behavior.
    pub fn submit(
        &mut self,
        request: &OrderRequest,
        tick: &Tick,
    ) -> Result<OrderResponse, MatchingError> {
        let pair_filters = self.filters_for(&request.pair);

        let needs_limit = matches!(request.kind, OrderKind::Limit | OrderKind::StopLimit);
        let needs_stop = matches!(request.kind, OrderKind::Stop | OrderKind::StopLimit);
        if needs_limit && request.limit_price.is_none() {
            return Err(MatchingError::MissingLimitPrice(format!("{:?}", request.kind)));
        }
        if needs_stop && request.stop_price.is_none() {
            return Err(MatchingError::MissingStopPrice(format!("{:?}", request.kind)));
        }

        // Market orders size themselves in either asset; quote sizing converts
        // to a base quantity at the current close, like the venue's
        // quoteOrderQty. Every other kind requires a base quantity.
        let quantity = match request.kind {
            OrderKind::Market => match (request.quantity, request.quote_quantity) {
                (Some(quantity), None) => quantity,
                (None, Some(quote)) => {
                    if quote <= Decimal::ZERO {
                        return Err(MatchingError::InvalidQuantity(quote.to_string()));
                    }
                    if tick.close() <= Decimal::ZERO {
                        return Err(MatchingError::InvalidSizing(format!(
                            "no positive close to convert quote quantity {quote}"
                        )));
                    }
                    quote / tick.close()
                }
                _ => {
                    return Err(MatchingError::InvalidSizing(
                        "market orders take exactly one of quantity and quote quantity".into(),
                    ));
                }
            },
            _ => {
                if request.quote_quantity.is_some() {
                    return Err(MatchingError::InvalidSizing(
                        "quote quantity is only valid for market orders".into(),
                    ));
                }
                request
                    .quantity
                    .ok_or_else(|| MatchingError::InvalidSizing("missing base quantity".into()))?
            }
        };
        if quantity <= Decimal::ZERO {
            return Err(MatchingError::InvalidQuantity(quantity.to_string()));
        }

        let quantity = filters::round_quantity(&pair_filters, quantity);
        filters::check_quantity_bounds(&pair_filters, quantity)?;

        let limit_price = match request.limit_price.filter(|_| needs_limit) {
            Some(price) => {
                let rounded = filters::round_price(&pair_filters, price);
                filters::check_price_bounds(&pair_filters, rounded)?;
                Some(rounded)
            }
            None => None,
        };
        let stop_price = match request.stop_price.filter(|_| needs_stop) {
            Some(price) => {
                let rounded = filters::round_price(&pair_filters, price);
                filters::check_price_bounds(&pair_filters, rounded)?;
                Some(rounded)
            }
            None => None,
        };

        let order_id = self.next_order_id;
        self.next_order_id += 1;

        let mut order = PendingOrder {
            order_id,
            client_order_id: request.client_order_id,
            pair: request.pair.clone(),
            side: request.side,
            kind: request.kind,
            quantity,
            limit_price,
            stop_price,
            status: OrderStatus::New,
            triggered: false,
            created_at: Utc::now(),
        };

        // Submission-time evaluation has no previous tick by definition.
        let transition = self.evaluate(&mut order, None, tick);
        let response = self.apply_transition(&mut order, transition);
        tracing::debug!(
            order_id,
            pair = %order.pair,
            status = ?order.status,
            "order submitted"
        );
        self.orders.insert(order_id, order);
        Ok(response)
    }

    /// Advances every resting order on `pair` by one tick and returns the
    /// responses of orders that became terminal on this tick.
    pub fn process_tick(&mut self, pair: &Pair, tick: &Tick) -> Vec<OrderResponse> {
        let prev = self.last_ticks.get(pair).cloned();
        let mut completed = Vec::new();

        let ids: Vec<u64> = self
            .orders
            .iter()
            .filter(|(_, o)| o.status == OrderStatus::New && o.pair == *pair)
            .map(|(id, _)| *id)
            .collect();

        for id in ids {
            let mut order = self.orders.remove(&id).expect("id collected above");
            let transition = self.evaluate(&mut order, prev.as_ref(), tick);
            if !matches!(transition, Transition::None) {
                let response = self.apply_transition(&mut order, transition);
                if order.status.is_terminal() {
                    completed.push(response);
                }
            }
            self.orders.insert(id, order);
        }

        self.last_ticks.insert(pair.clone(), tick.clone());
        completed
    }

    /// Cancels a resting order. Only legal while the order is NEW; a
    /// terminal order is a rejected no-op.
    pub fn cancel(&mut self, order_id: u64) -> Result<OrderResponse, MatchingError> {
        let order = self
            .orders
            .get_mut(&order_id)
            .ok_or(MatchingError::UnknownOrder(order_id))?;
        if order.status.is_terminal() {
            return Err(MatchingError::AlreadyTerminal(order_id));
        }
        order.status = OrderStatus::Canceled;
        Ok(order.to_response(None))
    }

    /// Looks up an order's current state.
    pub fn order(&self, order_id: u64) -> Option<&PendingOrder> {
        self.orders.get(&order_id)
    }

    /// All orders still resting on a pair.
    pub fn open_orders(&self, pair: &Pair) -> Vec<&PendingOrder> {
        self.orders
            .values()
            .filter(|o| o.status == OrderStatus::New && o.pair == *pair)
            .collect()
    }

    // --- Core evaluation ---

    /// Decides an order's transition for one tick.
    ///
    /// The previous tick matters because a single sampling interval can skip
    /// over a price level entirely: a threshold counts as crossed when it
    /// lies between the previous and current close, inclusive, or when there
    /// is no previous tick and the current close already satisfies the
    /// condition outright (the submission-time case).
    fn evaluate(
        &self,
        order: &mut PendingOrder,
        prev: Option<&Tick>,
        tick: &Tick,
    ) -> Transition {
        match order.kind {
            OrderKind::Market => self.fill_at_close(order, tick),
            OrderKind::Limit => self.try_limit_fill(order, tick),
            OrderKind::Stop => {
                let stop = order.stop_price.expect("validated at submit");
                if Self::stop_crossed(order.side, stop, prev, tick.close()) {
                    // A triggered stop becomes a market order on that same tick.
                    self.fill_at_close(order, tick)
                } else {
                    Transition::None
                }
            }
            OrderKind::StopLimit => {
                if !order.triggered {
                    let stop = order.stop_price.expect("validated at submit");
                    if !Self::stop_crossed(order.side, stop, prev, tick.close()) {
                        return Transition::None;
                    }
                    order.triggered = true;
                    // Triggering does not guarantee a fill: the limit leg is
                    // evaluated against this same tick and all later ones.
                    match self.try_limit_fill(order, tick) {
                        Transition::None => Transition::Triggered,
                        filled => filled,
                    }
                } else {
                    self.try_limit_fill(order, tick)
                }
            }
        }
    }

    /// Whether the close crossed the stop threshold on this tick.
    fn stop_crossed(
        side: OrderSide,
        stop: Decimal,
        prev: Option<&Tick>,
        close: Decimal,
    ) -> bool {
        let satisfied = match side {
            OrderSide::Buy => close >= stop,
            OrderSide::Sell => close <= stop,
        };
        if !satisfied {
            return false;
        }
        match prev {
            None => true,
            Some(prev) => {
                let prev_close = prev.close();
                stop >= prev_close.min(close) && stop <= prev_close.max(close)
            }
        }
    }

    fn fee_rate(&self, role: LiquidityRole) -> Decimal {
        match role {
            LiquidityRole::Maker => self.maker_fee_rate,
            LiquidityRole::Taker => self.taker_fee_rate,
        }
    }

    /// Executes at the tick's close price: the taker path shared by market
    /// orders and triggered stops.
    fn fill_at_close(&self, order: &PendingOrder, tick: &Tick) -> Transition {
        let pair_filters = self.filters_for(&order.pair);
        let price = filters::round_price(&pair_filters, tick.close());
        self.filled(order, price, LiquidityRole::Taker)
    }

    /// Fills a resting limit order once the close has reached its price.
    /// Executions at the requested limit price are maker fills.
    fn try_limit_fill(&self, order: &PendingOrder, tick: &Tick) -> Transition {
        let limit = order.limit_price.expect("validated at submit");
        let reached = match order.side {
            OrderSide::Buy => tick.close() <= limit,
            OrderSide::Sell => tick.close() >= limit,
        };
        if reached {
            self.filled(order, limit, LiquidityRole::Maker)
        } else {
            Transition::None
        }
    }

    /// Fee is charged on the asset received: base for buys, quote for sells.
    fn filled(&self, order: &PendingOrder, price: Decimal, role: LiquidityRole) -> Transition {
        let fee_rate = self.fee_rate(role);
        let (fee, fee_asset) = match order.side {
            OrderSide::Buy => (fee_rate * order.quantity, order.pair.base.to_string()),
            OrderSide::Sell => (
                fee_rate * order.quantity * price,
                order.pair.quote.to_string(),
            ),
        };
        Transition::Filled {
            price,
            fee,
            fee_asset,
        }
    }

    fn apply_transition(
        &self,
        order: &mut PendingOrder,
        transition: Transition,
    ) -> OrderResponse {
        match transition {
            Transition::Filled {
                price,
                fee,
                fee_asset,
            } => {
                order.status = OrderStatus::Filled;
                let fill = Fill {
                    price,
                    qty: order.quantity,
                    commission: fee,
                    commission_asset: fee_asset,
                };
                order.to_response(Some(&fill))
            }
            Transition::Triggered | Transition::None => order.to_response(None),
        }
    }
}
