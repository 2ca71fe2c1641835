//! # models::order
//!
//! Market order request/response exchanged with the venue.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::PositionSide;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy  => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Payload of `createMarketOrder`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol:        String,
    pub side:          Side,
    pub size:          Decimal,
    pub position_side: PositionSide,
    pub reduce_only:   bool,
}

impl OrderRequest {
    /// Adds to the long position.
    pub fn open_long(symbol: &str, size: Decimal) -> Self {
        Self {
            symbol:        symbol.to_string(),
            side:          Side::Buy,
            size,
            position_side: PositionSide::Long,
            reduce_only:   false,
        }
    }

    /// Closes (part of) the long position.
    pub fn close_long(symbol: &str, size: Decimal) -> Self {
        Self {
            symbol:        symbol.to_string(),
            side:          Side::Sell,
            size,
            position_side: PositionSide::Long,
            reduce_only:   true,
        }
    }
}

/// Exchange acknowledgement of a filled market order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub order_id: String,
    /// Average fill price when the venue reports it.
    #[serde(default)]
    pub fill_price: Option<Decimal>,
}
