//! # exchange::paper
//!
//! **PaperExchange** — in-memory venue. Market orders fill immediately at
//! the current price; the long position tracks size and volume-weighted
//! entry price. Quotes come from a [`RestExchange`] when one is attached,
//! otherwise from the last price set.
//!
//! Also used by tests to script rejections, quote outages and manual
//! position changes.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::Mutex;
use tracing::info;

use crate::error::ExchangeError;
use crate::exchange::{Exchange, RestExchange};
use crate::models::{
    FundingRate, MarketInfo, OrderReceipt, OrderRequest, PositionSnapshot, Side, Ticker,
};

/// How scripted quote failures surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuoteFault {
    Outage,
    Garbled,
}

#[derive(Debug)]
struct PaperBook {
    price:                Decimal,
    size:                 Decimal,
    entry_price:          Decimal,
    reject_remaining:     u32,
    quote_fail_remaining: u32,
    quote_fault:          QuoteFault,
    next_order:           u64,
    fills:                Vec<OrderRequest>,
}

pub struct PaperExchange {
    market: MarketInfo,
    quotes: Option<RestExchange>,
    book:   Mutex<PaperBook>,
}

impl PaperExchange {
    pub fn new(market: MarketInfo, start_price: Decimal) -> Self {
        Self {
            market,
            quotes: None,
            book: Mutex::new(PaperBook {
                price:                start_price,
                size:                 Decimal::ZERO,
                entry_price:          Decimal::ZERO,
                reject_remaining:     0,
                quote_fail_remaining: 0,
                quote_fault:          QuoteFault::Outage,
                next_order:           1,
                fills:                Vec::new(),
            }),
        }
    }

    /// Reads live quotes from `rest`; fills stay simulated.
    pub fn with_quotes(mut self, rest: RestExchange) -> Self {
        self.quotes = Some(rest);
        self
    }

    pub async fn set_price(&self, price: Decimal) {
        self.book.lock().await.price = price;
    }

    /// The next `n` orders are rejected.
    pub async fn reject_next_orders(&self, n: u32) {
        self.book.lock().await.reject_remaining = n;
    }

    /// The next `n` ticker/position calls fail with a network error.
    pub async fn fail_next_quotes(&self, n: u32) {
        let mut book = self.book.lock().await;
        book.quote_fail_remaining = n;
        book.quote_fault = QuoteFault::Outage;
    }

    /// The next `n` ticker/position calls return an undecodable body.
    pub async fn garble_next_quotes(&self, n: u32) {
        let mut book = self.book.lock().await;
        book.quote_fail_remaining = n;
        book.quote_fault = QuoteFault::Garbled;
    }

    /// Overrides the position, as a manual trade on the venue would.
    pub async fn set_position(&self, size: Decimal, entry_price: Decimal) {
        let mut book = self.book.lock().await;
        book.size = size;
        book.entry_price = if size.is_zero() { Decimal::ZERO } else { entry_price };
    }

    /// Every order that filled, oldest first.
    pub async fn fills(&self) -> Vec<OrderRequest> {
        self.book.lock().await.fills.clone()
    }

    fn take_quote_failure(book: &mut PaperBook) -> Result<(), ExchangeError> {
        if book.quote_fail_remaining > 0 {
            book.quote_fail_remaining -= 1;
            return Err(match book.quote_fault {
                QuoteFault::Outage => ExchangeError::Network("paper: simulated outage".to_string()),
                QuoteFault::Garbled => ExchangeError::Decode("paper: malformed quote".to_string()),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Exchange for PaperExchange {
    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError> {
        if let Some(rest) = &self.quotes {
            let ticker = rest.fetch_ticker(symbol).await?;
            self.book.lock().await.price = ticker.last;
            return Ok(ticker);
        }

        let mut book = self.book.lock().await;
        Self::take_quote_failure(&mut book)?;
        Ok(Ticker { symbol: symbol.to_string(), last: book.price, time: Utc::now() })
    }

    async fn fetch_position(&self, _symbol: &str) -> Result<PositionSnapshot, ExchangeError> {
        let mut book = self.book.lock().await;
        Self::take_quote_failure(&mut book)?;
        Ok(PositionSnapshot::long(book.size, book.entry_price))
    }

    async fn create_market_order(&self, order: &OrderRequest) -> Result<OrderReceipt, ExchangeError> {
        let mut book = self.book.lock().await;

        if book.reject_remaining > 0 {
            book.reject_remaining -= 1;
            return Err(ExchangeError::Rejected { reason: "paper: insufficient margin".to_string() });
        }
        if order.size < self.market.min_size {
            return Err(ExchangeError::Rejected {
                reason: format!("paper: size {} below minimum {}", order.size, self.market.min_size),
            });
        }

        let price = book.price;
        match order.side {
            Side::Buy => {
                let new_size = book.size + order.size;
                book.entry_price = (book.size * book.entry_price + order.size * price) / new_size;
                book.size = new_size;
            }
            Side::Sell => {
                let closed = order.size.min(book.size);
                book.size -= closed;
                if book.size.is_zero() {
                    book.entry_price = Decimal::ZERO;
                }
            }
        }

        let order_id = format!("PAPER-{}", book.next_order);
        book.next_order += 1;
        book.fills.push(order.clone());

        info!(
            %order_id,
            side  = %order.side,
            size  = %order.size,
            price = %price,
            "🎭 [PAPER] Order filled"
        );

        Ok(OrderReceipt { order_id, fill_price: Some(price) })
    }

    async fn fetch_funding_rate(&self, symbol: &str) -> Result<FundingRate, ExchangeError> {
        if let Some(rest) = &self.quotes {
            return rest.fetch_funding_rate(symbol).await;
        }
        Ok(FundingRate { symbol: symbol.to_string(), rate: dec!(0.0001) })
    }

    async fn fetch_market(&self, symbol: &str) -> Result<MarketInfo, ExchangeError> {
        if let Some(rest) = &self.quotes {
            return rest.fetch_market(symbol).await;
        }
        Ok(MarketInfo { symbol: symbol.to_string(), ..self.market.clone() })
    }
}
