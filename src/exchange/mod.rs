//! # exchange
//!
//! The exchange collaborator as the strategy loop sees it: one opaque
//! request/response API. Two adapters:
//!
//! * [`RestExchange`]  — JSON bridge in front of the real venue
//! * [`PaperExchange`] — simulated fills at the current price

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::{ExchangeConfig, ExchangeMode};
use crate::error::ExchangeError;
use crate::models::{FundingRate, MarketInfo, OrderReceipt, OrderRequest, PositionSnapshot, Ticker};

pub mod paper;
pub mod rest;

pub use paper::PaperExchange;
pub use rest::RestExchange;

#[async_trait]
pub trait Exchange: Send + Sync {
    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError>;

    /// Long position for `symbol`; flat when none is open.
    async fn fetch_position(&self, symbol: &str) -> Result<PositionSnapshot, ExchangeError>;

    /// Submits a market order. Rejections come back as
    /// [`ExchangeError::Rejected`].
    async fn create_market_order(&self, order: &OrderRequest) -> Result<OrderReceipt, ExchangeError>;

    async fn fetch_funding_rate(&self, symbol: &str) -> Result<FundingRate, ExchangeError>;

    /// Lot/tick metadata, loaded once at startup.
    async fn fetch_market(&self, symbol: &str) -> Result<MarketInfo, ExchangeError>;
}

pub type SharedExchange = Arc<dyn Exchange>;

/// Builds the adapter selected by `EXCHANGE_MODE`.
pub fn build_exchange(config: &ExchangeConfig, symbol: &str) -> SharedExchange {
    let client = reqwest::Client::new();
    let rest = config.base_url.as_ref().map(|url| {
        RestExchange::new(
            client.clone(),
            url,
            config.api_key.clone(),
            config.api_secret.clone(),
        )
    });

    match (config.mode.clone(), rest) {
        (ExchangeMode::Rest, Some(rest)) => {
            info!(base_url = ?config.base_url, "🔗 Exchange: REST bridge");
            Arc::new(rest)
        }
        (_, quotes) => {
            info!(
                live_quotes = quotes.is_some(),
                start_price = %config.paper_start_price,
                "🎭 Exchange: PAPER mode — orders are simulated"
            );
            let paper = PaperExchange::new(
                MarketInfo::conservative_default(symbol),
                config.paper_start_price,
            );
            Arc::new(match quotes {
                Some(rest) => paper.with_quotes(rest),
                None => paper,
            })
        }
    }
}
