pub mod error;
pub mod replay;

pub use error::RouterError;
pub use replay::ReplaySession;

use api_client::{ExchangeApi, OrderResponse};
use configuration::Mode;
use core_types::{OrderRequest, OrderStatus, Pair, Tick};
use ledger::TradeFill;
use matching::MatchingEngine;
use std::sync::Arc;
use streams::StreamManager;

/// Dispatches typed requests to the backend the runtime mode selects.
///
/// The router has no trading logic of its own: in live mode requests go to
/// the exchange's REST surface, in either simulate mode they go to the
/// matching engine, fed by ticks from the replay clock or the live stream
/// rings. Because the simulated responses are byte-shaped like the live
/// ones, callers cannot tell the backends apart structurally.
pub struct RequestRouter {
    backend: Backend,
}

enum Backend {
    Live {
        api: Arc<dyn ExchangeApi>,
    },
    SimulateLive {
        engine: MatchingEngine,
        streams: Arc<StreamManager>,
    },
    SimulateHistory {
        engine: MatchingEngine,
        replay: ReplaySession,
    },
}

impl RequestRouter {
    pub fn live(api: Arc<dyn ExchangeApi>) -> Self {
        Self {
            backend: Backend::Live { api },
        }
    }

    pub fn simulate_live(engine: MatchingEngine, streams: Arc<StreamManager>) -> Self {
        Self {
            backend: Backend::SimulateLive { engine, streams },
        }
    }

    pub fn simulate_history(engine: MatchingEngine, replay: ReplaySession) -> Self {
        Self {
            backend: Backend::SimulateHistory { engine, replay },
        }
    }

    pub fn mode(&self) -> Mode {
        match self.backend {
            Backend::Live { .. } => Mode::Live,
            Backend::SimulateLive { .. } => Mode::SimulateLive,
            Backend::SimulateHistory { .. } => Mode::SimulateHistory,
        }
    }

    /// Places an order through the mode's backend.
    pub async fn place_order(
        &mut self,
        request: &OrderRequest,
    ) -> Result<OrderResponse, RouterError> {
        match &mut self.backend {
            Backend::Live { api } => {
                tracing::info!(pair = %request.pair, "routing order to the live exchange");
                Ok(api.place_order(request).await?)
            }
            Backend::SimulateLive { engine, streams } => {
                let id = streams
                    .subscribed()
                    .await
                    .into_iter()
                    .find(|s| s.pair == request.pair)
                    .ok_or_else(|| RouterError::NoMarketData(request.pair.to_string()))?;
                let tick = streams
                    .latest_tick(&id)
                    .await?
                    .ok_or_else(|| RouterError::NoMarketData(request.pair.to_string()))?;
                Ok(engine.submit(request, &tick)?)
            }
            Backend::SimulateHistory { engine, replay } => {
                let tick = replay
                    .current_for_pair(&request.pair)
                    .ok_or_else(|| RouterError::NoMarketData(request.pair.to_string()))?;
                Ok(engine.submit(request, &tick)?)
            }
        }
    }

    /// Cancels a resting order through the mode's backend.
    pub async fn cancel_order(
        &mut self,
        pair: &Pair,
        order_id: u64,
    ) -> Result<OrderResponse, RouterError> {
        match &mut self.backend {
            Backend::Live { api } => Ok(api.cancel_order(pair, order_id).await?),
            Backend::SimulateLive { engine, .. } | Backend::SimulateHistory { engine, .. } => {
                Ok(engine.cancel(order_id)?)
            }
        }
    }

    /// Advances the replay clock by one tick and runs every resting order
    /// against the new tick, returning the orders that became terminal.
    ///
    /// Only meaningful in simulate-from-history mode; exhaustion of the
    /// loaded data surfaces as the terminal `ReplayExhausted` signal.
    pub fn step(&mut self) -> Result<Vec<OrderResponse>, RouterError> {
        let Backend::SimulateHistory { engine, replay } = &mut self.backend else {
            return Err(RouterError::UnsupportedInMode {
                operation: "step",
                mode: self.mode(),
            });
        };
        replay.advance()?;
        let mut completed = Vec::new();
        for (id, tick) in replay.ticks() {
            completed.extend(engine.process_tick(&id.pair, &tick));
        }
        Ok(completed)
    }

    /// Runs resting orders against one live tick. The simulate-from-live
    /// loop calls this with each fresh ring row, so the exact same matching
    /// path serves both simulated modes.
    pub fn apply_tick(
        &mut self,
        pair: &Pair,
        tick: &Tick,
    ) -> Result<Vec<OrderResponse>, RouterError> {
        match &mut self.backend {
            Backend::SimulateLive { engine, .. } | Backend::SimulateHistory { engine, .. } => {
                Ok(engine.process_tick(pair, tick))
            }
            Backend::Live { .. } => Err(RouterError::UnsupportedInMode {
                operation: "apply_tick",
                mode: Mode::Live,
            }),
        }
    }
}

/// Digests a filled order response into the shape the ledger books.
///
/// Returns `None` for non-terminal or unfilled responses; callers apply the
/// digest to their own wallet, keeping the engine and the ledger decoupled.
///
/// Commissions arrive denominated in whatever asset the exchange charged
/// them in (base for buys, quote for sells). The wallet accounts fees in the
/// quote asset, so base-denominated commissions are valued at their fill's
/// price here. A commission in any third asset cannot be valued without a
/// price source and is logged and left out of the digest.
pub fn trade_fill(response: &OrderResponse) -> Result<Option<TradeFill>, RouterError> {
    if response.status != OrderStatus::Filled {
        return Ok(None);
    }
    let pair = Pair::from_symbol(&response.symbol)
        .map_err(|_| RouterError::MalformedResponse(response.symbol.clone()))?;
    let price = response
        .fills
        .first()
        .map(|f| f.price)
        .unwrap_or(response.price);
    let mut fee = rust_decimal::Decimal::ZERO;
    for fill in &response.fills {
        if fill.commission_asset == pair.quote.as_str() {
            fee += fill.commission;
        } else if fill.commission_asset == pair.base.as_str() {
            fee += fill.commission * fill.price;
        } else {
            tracing::warn!(
                asset = %fill.commission_asset,
                commission = %fill.commission,
                "commission in an unpriced asset, not booked"
            );
        }
    }
    Ok(Some(TradeFill {
        pair,
        quantity: response.executed_qty,
        price,
        quote_amount: response.cummulative_quote_qty,
        fee,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_client::error::ApiError;
    use api_client::{Fill, SymbolFilters};
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use configuration::SimulationConfig;
    use core_types::{Interval, Kline, OrderKind, OrderSide};
    use rust_decimal_macros::dec;
    use std::sync::Mutex;
    use streams::StreamId;

    fn btc_usdt() -> Pair {
        Pair::new("BTC", "USDT")
    }

    fn rows(closes: &[f64]) -> Vec<Kline> {
        closes
            .iter()
            .enumerate()
            .map(|(i, close)| {
                let close = rust_decimal::Decimal::from_f64_retain(*close).unwrap();
                let open_time = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
                    + Duration::minutes(i as i64);
                Kline {
                    open_time,
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: dec!(1),
                    close_time: open_time + Duration::minutes(1),
                }
            })
            .collect()
    }

    fn history_router(closes: &[f64]) -> RequestRouter {
        let engine = MatchingEngine::new(&SimulationConfig::default());
        let mut replay = ReplaySession::new();
        replay.load(
            StreamId::new(btc_usdt(), Interval::OneMinute),
            rows(closes),
        );
        RequestRouter::simulate_history(engine, replay)
    }

    struct MockApi {
        placed: Mutex<Vec<OrderRequest>>,
    }

    impl MockApi {
        fn canned_response(order: &OrderRequest) -> OrderResponse {
            let quantity = order.quantity.unwrap_or_default();
            OrderResponse {
                symbol: order.pair.symbol(),
                kind: order.kind,
                side: order.side,
                status: OrderStatus::Filled,
                order_id: 7,
                client_order_id: order.client_order_id.to_string(),
                price: dec!(100),
                stop_price: dec!(0),
                orig_qty: quantity,
                executed_qty: quantity,
                cummulative_quote_qty: dec!(100) * quantity,
                time: 1_700_000_000_000,
                transact_time: 1_700_000_000_000,
                fills: vec![Fill {
                    price: dec!(100),
                    qty: quantity,
                    commission: dec!(0.001),
                    commission_asset: "BTC".into(),
                }],
            }
        }
    }

    #[async_trait]
    impl ExchangeApi for MockApi {
        async fn fetch_klines(
            &self,
            _pair: &Pair,
            _interval: &str,
            _start_time: DateTime<Utc>,
            _end_time: DateTime<Utc>,
        ) -> Result<Vec<Kline>, ApiError> {
            Ok(Vec::new())
        }

        async fn fetch_filters(&self) -> Result<Vec<SymbolFilters>, ApiError> {
            Ok(Vec::new())
        }

        async fn place_order(&self, order: &OrderRequest) -> Result<OrderResponse, ApiError> {
            self.placed.lock().unwrap().push(order.clone());
            Ok(Self::canned_response(order))
        }

        async fn cancel_order(
            &self,
            pair: &Pair,
            order_id: u64,
        ) -> Result<OrderResponse, ApiError> {
            let mut response =
                Self::canned_response(&OrderRequest::market(pair.clone(), OrderSide::Buy, dec!(1)));
            response.order_id = order_id;
            response.status = OrderStatus::Canceled;
            Ok(response)
        }
    }

    #[tokio::test]
    async fn live_mode_dispatches_to_the_exchange_api() {
        let api = Arc::new(MockApi {
            placed: Mutex::new(Vec::new()),
        });
        let mut router = RequestRouter::live(api.clone());
        assert_eq!(router.mode(), Mode::Live);

        let request = OrderRequest::market(btc_usdt(), OrderSide::Buy, dec!(1));
        let response = router.place_order(&request).await.unwrap();
        assert_eq!(response.order_id, 7);
        assert_eq!(api.placed.lock().unwrap().len(), 1);

        // The replay-only clock has no meaning against a live backend.
        assert!(matches!(
            router.step(),
            Err(RouterError::UnsupportedInMode { .. })
        ));
    }

    #[tokio::test]
    async fn history_mode_fills_a_resting_order_as_the_clock_advances() {
        let mut router = history_router(&[100.0, 99.0, 94.0, 97.0]);

        let request = OrderRequest::limit(btc_usdt(), OrderSide::Buy, dec!(1), dec!(95));
        let response = router.place_order(&request).await.unwrap();
        assert_eq!(response.status, OrderStatus::New);

        // close=99: still resting. close=94: crossed, maker fill at 95.
        assert!(router.step().unwrap().is_empty());
        let fills = router.step().unwrap();
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].fills[0].price, dec!(95));

        // Stepping to the last row works, then exhaustion is terminal.
        router.step().unwrap();
        assert!(matches!(
            router.step(),
            Err(RouterError::ReplayExhausted(_))
        ));
    }

    #[tokio::test]
    async fn replays_over_the_same_data_are_deterministic() {
        let closes = [100.0, 99.0, 94.0, 97.0, 92.0];
        let mut outcomes = Vec::new();
        for _ in 0..2 {
            let mut router = history_router(&closes);
            let request = OrderRequest::limit(btc_usdt(), OrderSide::Buy, dec!(2), dec!(95));
            router.place_order(&request).await.unwrap();

            let mut fills = Vec::new();
            loop {
                match router.step() {
                    Ok(completed) => fills.extend(completed),
                    Err(RouterError::ReplayExhausted(_)) => break,
                    Err(other) => panic!("unexpected error: {other}"),
                }
            }
            outcomes.push(
                fills
                    .iter()
                    .map(|f| (f.status, f.fills[0].price, f.executed_qty))
                    .collect::<Vec<_>>(),
            );
        }
        assert_eq!(outcomes[0], outcomes[1]);
        assert_eq!(outcomes[0].len(), 1);
    }

    #[tokio::test]
    async fn ordering_without_market_data_is_rejected() {
        let engine = MatchingEngine::new(&SimulationConfig::default());
        let mut router = RequestRouter::simulate_history(engine, ReplaySession::new());

        let request = OrderRequest::market(btc_usdt(), OrderSide::Buy, dec!(1));
        assert!(matches!(
            router.place_order(&request).await,
            Err(RouterError::NoMarketData(_))
        ));
    }

    #[tokio::test]
    async fn filled_responses_digest_into_ledger_fills() {
        let mut router = history_router(&[100.0, 100.0]);
        let request = OrderRequest::market(btc_usdt(), OrderSide::Buy, dec!(2));
        let response = router.place_order(&request).await.unwrap();

        let fill = trade_fill(&response).unwrap().unwrap();
        assert_eq!(fill.pair, btc_usdt());
        assert_eq!(fill.quantity, dec!(2));
        assert_eq!(fill.price, dec!(100));
        assert_eq!(fill.quote_amount, dec!(200));
        // The 0.002 BTC taker commission is booked as 0.2 USDT.
        assert_eq!(fill.fee, dec!(0.2));

        // Resting orders have nothing to book yet.
        let resting = OrderRequest::limit(btc_usdt(), OrderSide::Buy, dec!(1), dec!(50));
        let response = router.place_order(&resting).await.unwrap();
        assert!(trade_fill(&response).unwrap().is_none());
    }

    #[tokio::test]
    async fn roi_reflects_fees_valued_in_the_quote_asset() {
        use core_types::Asset;
        use ledger::Wallet;
        use std::collections::HashMap;

        let mut router = history_router(&[20000.0, 20000.0]);
        let mut wallet = Wallet::new(Asset::new("USDT"), dec!(100000), dec!(1));
        wallet.deposit(dec!(20000), dec!(0)).unwrap();

        let request = OrderRequest::market(btc_usdt(), OrderSide::Buy, dec!(1));
        let response = router.place_order(&request).await.unwrap();
        let fill = trade_fill(&response).unwrap().unwrap();
        // The 0.001 BTC taker commission is worth 20 USDT at the fill price.
        assert_eq!(fill.fee, dec!(20));
        wallet.buy(&fill).unwrap();

        // A flat market: the account is down by exactly the fee.
        let prices = HashMap::from([(Asset::new("BTC"), dec!(20000))]);
        assert_eq!(wallet.get_roi(&prices).unwrap(), dec!(-0.001));
    }
}
