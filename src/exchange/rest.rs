//! # exchange::rest
//!
//! **RestExchange** — talks to an HTTP/JSON bridge in front of the venue.
//!
//! ## Bridge API Contract
//!
//! | Method | Path        | Body / Query        | Response                                  |
//! |--------|-------------|---------------------|-------------------------------------------|
//! | GET    | `/ticker`   | `?symbol=`          | `{ "symbol", "last" }`                    |
//! | GET    | `/position` | `?symbol=`          | `{ "size", "side", "entry_price" }`       |
//! | GET    | `/funding`  | `?symbol=`          | `{ "symbol", "rate" }`                    |
//! | GET    | `/market`   | `?symbol=`          | `{ "symbol", "size_step", "price_tick", "min_size" }` |
//! | POST   | `/order`    | [`OrderRequest`]    | `{ "ok", "order_id", "fill_price", "error" }` |
//!
//! Any 4xx on `/order` is an exchange rejection.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::error::ExchangeError;
use crate::exchange::Exchange;
use crate::models::{FundingRate, MarketInfo, OrderReceipt, OrderRequest, PositionSnapshot, Ticker};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Response of `POST /order`.
#[derive(Debug, Deserialize)]
struct BridgeOrderResponse {
    ok:         bool,
    order_id:   Option<String>,
    fill_price: Option<Decimal>,
    error:      Option<String>,
}

#[derive(Debug, Clone)]
pub struct RestExchange {
    client:     reqwest::Client,
    base_url:   String,
    api_key:    Option<String>,
    api_secret: Option<String>,
}

impl RestExchange {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        api_key: Option<String>,
        api_secret: Option<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            api_secret,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .request(method, format!("{}{path}", self.base_url))
            .timeout(REQUEST_TIMEOUT);
        if let Some(key) = &self.api_key {
            req = req.header("X-API-KEY", key);
        }
        if let Some(secret) = &self.api_secret {
            req = req.header("X-API-SECRET", secret);
        }
        req
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, symbol: &str) -> Result<T, ExchangeError> {
        let response = self
            .request(reqwest::Method::GET, path)
            .query(&[("symbol", symbol)])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!(path, status, body = %body, "Exchange bridge returned HTTP error");
            return Err(ExchangeError::Http { status, body });
        }

        response
            .json()
            .await
            .map_err(|e| ExchangeError::Decode(format!("{path}: {e}")))
    }
}

#[async_trait]
impl Exchange for RestExchange {
    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError> {
        self.get_json("/ticker", symbol).await
    }

    async fn fetch_position(&self, symbol: &str) -> Result<PositionSnapshot, ExchangeError> {
        self.get_json("/position", symbol).await
    }

    async fn create_market_order(&self, order: &OrderRequest) -> Result<OrderReceipt, ExchangeError> {
        info!(
            symbol      = %order.symbol,
            side        = %order.side,
            size        = %order.size,
            reduce_only = order.reduce_only,
            "🚀 [EXCHANGE] Sending market order"
        );

        let response = self
            .request(reqwest::Method::POST, "/order")
            .json(order)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Exchange bridge unreachable");
                ExchangeError::from(e)
            })?;

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExchangeError::Rejected { reason: format!("HTTP {status}: {body}") });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExchangeError::Http { status: status.as_u16(), body });
        }

        let resp: BridgeOrderResponse = response
            .json()
            .await
            .map_err(|e| ExchangeError::Decode(format!("/order: {e}")))?;

        match (resp.ok, resp.order_id) {
            (true, Some(order_id)) => {
                info!(%order_id, "✅ [EXCHANGE] Order filled");
                Ok(OrderReceipt { order_id, fill_price: resp.fill_price })
            }
            _ => Err(ExchangeError::Rejected {
                reason: resp.error.unwrap_or_else(|| "unknown".to_string()),
            }),
        }
    }

    async fn fetch_funding_rate(&self, symbol: &str) -> Result<FundingRate, ExchangeError> {
        self.get_json("/funding", symbol).await
    }

    async fn fetch_market(&self, symbol: &str) -> Result<MarketInfo, ExchangeError> {
        self.get_json("/market", symbol).await
    }
}
