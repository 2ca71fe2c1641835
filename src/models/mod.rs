//! # models
//!
//! Plain data types shared by the engine, the exchange adapters and the
//! HTTP layer.

pub mod market;
pub mod order;
pub mod status;
pub mod trade;

pub use market::{FundingRate, MarketInfo, PositionSide, PositionSnapshot, Ticker};
pub use order::{OrderReceipt, OrderRequest, Side};
pub use status::StatusSnapshot;
pub use trade::{HistoryPoint, TradeKind, TradeRecord};
