//! # models::status
//!
//! Read-only snapshot published by the strategy loop after every cycle.
//! HTTP handlers only ever see a clone of this.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::TradeRecord;

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub symbol:             String,
    pub price:              Decimal,
    /// Held size; aligned with the exchange position every cycle.
    pub position_size:      Decimal,
    pub average_price:      Decimal,
    pub total_cost:         Decimal,
    pub market_value:       Decimal,
    pub net_pnl:            Decimal,
    pub entry_count:        usize,
    pub last_grid_price:    Option<Decimal>,
    pub next_trigger_price: Option<Decimal>,
    pub peak_price:         Decimal,
    pub funding_rate:       Option<Decimal>,
    pub enabled:            bool,
    pub status:             String,
    pub cycle_count:        u64,
    /// Most recent trades, newest last.
    pub trade_log:          Vec<TradeRecord>,
    pub updated_at:         DateTime<Utc>,
}

impl StatusSnapshot {
    pub fn starting(symbol: &str) -> Self {
        Self {
            symbol:             symbol.to_string(),
            price:              Decimal::ZERO,
            position_size:      Decimal::ZERO,
            average_price:      Decimal::ZERO,
            total_cost:         Decimal::ZERO,
            market_value:       Decimal::ZERO,
            net_pnl:            Decimal::ZERO,
            entry_count:        0,
            last_grid_price:    None,
            next_trigger_price: None,
            peak_price:         Decimal::ZERO,
            funding_rate:       None,
            enabled:            true,
            status:             "starting".to_string(),
            cycle_count:        0,
            trade_log:          Vec::new(),
            updated_at:         Utc::now(),
        }
    }
}
