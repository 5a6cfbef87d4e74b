use crate::auth::sign_request;
use crate::error::ApiError;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use configuration::ApiConfig;
use core_types::{Kline, OrderRequest, Pair};
use reqwest::header::{HeaderMap, HeaderValue};
use rust_decimal::Decimal;
use serde::{Deserialize, de::DeserializeOwned};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

mod auth;
pub mod error;
pub mod responses;

// --- Public API ---
pub use responses::{ApiErrorResponse, Fill, OrderResponse, SymbolFilters};

/// The generic, abstract interface for the exchange's REST surface.
/// This trait is the contract the request router uses, allowing the
/// underlying implementation (live or mock) to be swapped out.
#[async_trait]
pub trait ExchangeApi: Send + Sync {
    /// Fetches public historical kline data.
    async fn fetch_klines(
        &self,
        pair: &Pair,
        interval: &str,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Vec<Kline>, ApiError>;

    /// Fetches the venue's price/quantity filters for all traded pairs.
    async fn fetch_filters(&self) -> Result<Vec<SymbolFilters>, ApiError>;

    /// Places a new order on the exchange. (Authenticated)
    async fn place_order(&self, order: &OrderRequest) -> Result<OrderResponse, ApiError>;

    /// Cancels an open order. (Authenticated)
    async fn cancel_order(&self, pair: &Pair, order_id: u64) -> Result<OrderResponse, ApiError>;
}

/// A concrete implementation of `ExchangeApi` for the Binance spot API.
#[derive(Clone)]
pub struct BinanceClient {
    client: reqwest::Client,
    base_url: String,
    api_secret: String,
}

impl BinanceClient {
    pub fn new(api_config: &ApiConfig) -> Result<Self, ApiError> {
        let base_url = if api_config.live_trading {
            "https://api.binance.com".to_string()
        } else {
            "https://testnet.binance.vision".to_string()
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            "X-MBX-APIKEY",
            HeaderValue::from_str(&api_config.keys.key)
                .map_err(|e| ApiError::InvalidData(format!("Invalid API key header: {e}")))?,
        );

        Ok(Self {
            client: reqwest::Client::builder().default_headers(headers).build()?,
            base_url,
            api_secret: api_config.keys.secret.clone(),
        })
    }

    fn signed_url(&self, path: &str, params: &mut BTreeMap<&str, String>) -> Result<String, ApiError> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| ApiError::InvalidData(e.to_string()))?
            .as_millis();
        params.insert("timestamp", timestamp.to_string());

        let query_string = serde_qs::to_string(params)
            .map_err(|e| ApiError::InvalidData(format!("Failed to encode query: {e}")))?;
        let signature = sign_request(&self.api_secret, &query_string);

        Ok(format!(
            "{}{}?{}&signature={}",
            self.base_url, path, query_string, signature
        ))
    }

    async fn decode_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            serde_json::from_str::<T>(&text).map_err(|e| ApiError::Deserialization(e.to_string()))
        } else {
            let api_error: ApiErrorResponse = serde_json::from_str(&text).map_err(|e| {
                ApiError::Deserialization(format!(
                    "Failed to deserialize error response: {}. Original text: {}",
                    e, text
                ))
            })?;
            Err(ApiError::Exchange(api_error.code, api_error.msg))
        }
    }

    async fn _post_signed<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &mut BTreeMap<&str, String>,
    ) -> Result<T, ApiError> {
        let url = self.signed_url(path, params)?;
        let response = self.client.post(&url).send().await?;
        Self::decode_response(response).await
    }

    async fn _delete_signed<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &mut BTreeMap<&str, String>,
    ) -> Result<T, ApiError> {
        let url = self.signed_url(path, params)?;
        let response = self.client.delete(&url).send().await?;
        Self::decode_response(response).await
    }
}

// Intermediate struct for deserializing klines from the REST API.
// The payload is index-addressed, so field order matters.
#[derive(Deserialize)]
struct RawKline(
    i64,
    String,
    String,
    String,
    String,
    String,
    i64,
    serde_json::Value,
    serde_json::Value,
    serde_json::Value,
    serde_json::Value,
    serde_json::Value,
);

// Intermediate structs for the exchangeInfo filter payload.
#[derive(Deserialize)]
struct RawExchangeInfo {
    symbols: Vec<RawSymbolInfo>,
}

#[derive(Deserialize)]
struct RawSymbolInfo {
    symbol: String,
    filters: Vec<RawFilter>,
}

#[derive(Deserialize)]
#[serde(tag = "filterType")]
enum RawFilter {
    #[serde(rename = "PRICE_FILTER", rename_all = "camelCase")]
    Price {
        min_price: Decimal,
        max_price: Decimal,
        tick_size: Decimal,
    },
    #[serde(rename = "LOT_SIZE", rename_all = "camelCase")]
    LotSize {
        min_qty: Decimal,
        max_qty: Decimal,
        step_size: Decimal,
    },
    #[serde(other)]
    Other,
}

fn parse_decimal(raw: &str) -> Result<Decimal, ApiError> {
    Decimal::from_str(raw).map_err(|e| ApiError::Deserialization(e.to_string()))
}

#[async_trait]
impl ExchangeApi for BinanceClient {
    async fn fetch_klines(
        &self,
        pair: &Pair,
        interval: &str,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Vec<Kline>, ApiError> {
        let url = format!("{}/api/v3/klines", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("symbol", pair.symbol().as_str()),
                ("interval", interval),
                ("startTime", &start_time.timestamp_millis().to_string()),
                ("endTime", &end_time.timestamp_millis().to_string()),
                ("limit", "1000"),
            ])
            .send()
            .await?
            .json::<Vec<RawKline>>()
            .await?;

        let klines = response
            .into_iter()
            .map(|raw| {
                Ok(Kline {
                    open_time: Utc
                        .timestamp_millis_opt(raw.0)
                        .single()
                        .ok_or_else(|| ApiError::InvalidData(format!("Invalid open_time: {}", raw.0)))?,
                    open: parse_decimal(&raw.1)?,
                    high: parse_decimal(&raw.2)?,
                    low: parse_decimal(&raw.3)?,
                    close: parse_decimal(&raw.4)?,
                    volume: parse_decimal(&raw.5)?,
                    close_time: Utc
                        .timestamp_millis_opt(raw.6)
                        .single()
                        .ok_or_else(|| ApiError::InvalidData(format!("Invalid close_time: {}", raw.6)))?,
                })
            })
            .collect::<Result<Vec<Kline>, ApiError>>()?;

        Ok(klines)
    }

    async fn fetch_filters(&self) -> Result<Vec<SymbolFilters>, ApiError> {
        let url = format!("{}/api/v3/exchangeInfo", self.base_url);
        let info = self
            .client
            .get(&url)
            .send()
            .await?
            .json::<RawExchangeInfo>()
            .await?;

        let mut filters = Vec::with_capacity(info.symbols.len());
        for symbol_info in info.symbols {
            let mut combined = SymbolFilters {
                symbol: symbol_info.symbol,
                tick_size: Decimal::ZERO,
                step_size: Decimal::ZERO,
                min_qty: Decimal::ZERO,
                max_qty: Decimal::MAX,
                min_price: Decimal::ZERO,
                max_price: Decimal::MAX,
            };
            for filter in symbol_info.filters {
                match filter {
                    RawFilter::Price {
                        min_price,
                        max_price,
                        tick_size,
                    } => {
                        combined.min_price = min_price;
                        combined.max_price = max_price;
                        combined.tick_size = tick_size;
                    }
                    RawFilter::LotSize {
                        min_qty,
                        max_qty,
                        step_size,
                    } => {
                        combined.min_qty = min_qty;
                        combined.max_qty = max_qty;
                        combined.step_size = step_size;
                    }
                    RawFilter::Other => {}
                }
            }
            filters.push(combined);
        }
        Ok(filters)
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderResponse, ApiError> {
        let mut params = BTreeMap::new();
        params.insert("symbol", order.pair.symbol());
        params.insert("side", format!("{:?}", order.side).to_uppercase());
        params.insert(
            "type",
            serde_json::to_value(order.kind)
                .map_err(|e| ApiError::InvalidData(e.to_string()))?
                .as_str()
                .unwrap_or("MARKET")
                .to_string(),
        );
        if let Some(quantity) = order.quantity {
            params.insert("quantity", quantity.to_string());
        }
        if let Some(quote_quantity) = order.quote_quantity {
            params.insert("quoteOrderQty", quote_quantity.to_string());
        }
        params.insert("newClientOrderId", order.client_order_id.to_string());
        if let Some(price) = order.limit_price {
            params.insert("price", price.to_string());
            params.insert("timeInForce", "GTC".to_string());
        }
        if let Some(stop) = order.stop_price {
            params.insert("stopPrice", stop.to_string());
        }
        // FULL gives us the fills[] array in the acknowledgement.
        params.insert("newOrderRespType", "FULL".to_string());

        self._post_signed("/api/v3/order", &mut params).await
    }

    async fn cancel_order(&self, pair: &Pair, order_id: u64) -> Result<OrderResponse, ApiError> {
        let mut params = BTreeMap::new();
        params.insert("symbol", pair.symbol());
        params.insert("orderId", order_id.to_string());

        self._delete_signed("/api/v3/order", &mut params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{OrderKind, OrderSide, OrderStatus};
    use rust_decimal_macros::dec;

    #[test]
    fn order_response_wire_shape_round_trips() {
        let json = r#"{
            "symbol": "BTCUSDT",
            "type": "LIMIT",
            "side": "BUY",
            "status": "FILLED",
            "orderId": 42,
            "clientOrderId": "abc-123",
            "price": "100.5",
            "stopPrice": "0",
            "origQty": "1.5",
            "executedQty": "1.5",
            "cummulativeQuoteQty": "150.75",
            "time": 1700000000000,
            "transactTime": 1700000000000,
            "fills": [
                {"price": "100.5", "qty": "1.5", "commission": "0.0015", "commissionAsset": "BTC"}
            ]
        }"#;

        let response: OrderResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.kind, OrderKind::Limit);
        assert_eq!(response.side, OrderSide::Buy);
        assert_eq!(response.status, OrderStatus::Filled);
        assert_eq!(response.fills[0].commission, dec!(0.0015));

        // Re-serializing must preserve the exchange's field names, including
        // the misspelled cummulativeQuoteQty.
        let value = serde_json::to_value(&response).unwrap();
        assert!(value.get("cummulativeQuoteQty").is_some());
        assert!(value.get("stopPrice").is_some());
        assert_eq!(value.get("type").unwrap(), "LIMIT");
    }

    #[test]
    fn exchange_info_filters_combine() {
        let json = r#"{
            "symbols": [{
                "symbol": "BTCUSDT",
                "filters": [
                    {"filterType": "PRICE_FILTER", "minPrice": "0.01", "maxPrice": "1000000", "tickSize": "0.01"},
                    {"filterType": "LOT_SIZE", "minQty": "0.0001", "maxQty": "9000", "stepSize": "0.0001"},
                    {"filterType": "ICEBERG_PARTS", "limit": 10}
                ]
            }]
        }"#;

        let info: RawExchangeInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.symbols.len(), 1);
        assert_eq!(info.symbols[0].filters.len(), 3);
    }
}
