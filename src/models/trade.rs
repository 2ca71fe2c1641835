//! # models::trade
//!
//! Session trade log and the rolling price/P&L history shown on the
//! dashboard. Neither survives a restart.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeKind {
    /// Opening order or a grid add.
    Add,
    /// Profit-threshold exit.
    Exit,
    /// Exit requested by an operator.
    ForceExit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub trade_id:     Uuid,
    pub kind:         TradeKind,
    pub price:        Decimal,
    pub size:         Decimal,
    /// Grid level after the add (1 = opening entry). For exits, the number
    /// of levels that were closed.
    pub level:        usize,
    /// Set on exits only.
    pub realized_pnl: Option<Decimal>,
    pub order_id:     String,
    pub at:           DateTime<Utc>,
}

impl TradeRecord {
    pub fn add(price: Decimal, size: Decimal, level: usize, order_id: String) -> Self {
        Self {
            trade_id: Uuid::new_v4(),
            kind: TradeKind::Add,
            price,
            size,
            level,
            realized_pnl: None,
            order_id,
            at: Utc::now(),
        }
    }

    pub fn exit(
        kind: TradeKind,
        price: Decimal,
        size: Decimal,
        levels: usize,
        realized_pnl: Decimal,
        order_id: String,
    ) -> Self {
        Self {
            trade_id: Uuid::new_v4(),
            kind,
            price,
            size,
            level: levels,
            realized_pnl: Some(realized_pnl),
            order_id,
            at: Utc::now(),
        }
    }

    /// One-line description used in the history feed.
    pub fn describe(&self) -> String {
        match (self.kind, self.realized_pnl) {
            (TradeKind::Add, _) => format!("ADD L{} {} @ {}", self.level, self.size, self.price),
            (kind, Some(pnl)) => format!("{kind:?} {} @ {} pnl {pnl:+}", self.size, self.price),
            (kind, None) => format!("{kind:?} {} @ {}", self.size, self.price),
        }
    }
}

/// One sample of the dashboard chart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub time_ms: i64,
    pub price:   Decimal,
    pub size:    Decimal,
    pub net_pnl: Decimal,
    /// Trade that happened during this cycle, if any.
    pub action:  Option<String>,
}
