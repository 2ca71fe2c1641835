//! # events
//!
//! Defines [`WsEvent`] — everything the strategy loop broadcasts to
//! dashboard WebSocket clients.
//!
//! Events are serialized to JSON once and sent as `String` over a
//! `tokio::sync::broadcast` channel.

use serde::Serialize;

use crate::engine::drawdown::DrawdownAlert;
use crate::engine::exit::ClosedCycle;
use crate::engine::reconcile::ReconcileOutcome;
use crate::models::{StatusSnapshot, TradeRecord};
use crate::risk::BlockKind;
use crate::state::ControlCommand;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WsEvent {
    /// Published after every completed cycle.
    Status {
        status: Box<StatusSnapshot>,
    },

    /// Opening entry or grid add filled.
    GridAdded {
        record: Box<TradeRecord>,
    },

    /// Whole position closed (profit exit or force-close).
    PositionClosed {
        record: Box<TradeRecord>,
        closed: ClosedCycle,
    },

    /// The exchange declined an order; ledger unchanged.
    OrderRejected {
        action: String,
        reason: String,
    },

    /// Ledger was repaired against the exchange position.
    Reconciled {
        outcome: ReconcileOutcome,
    },

    DrawdownAlert {
        alert: DrawdownAlert,
    },

    /// A safety cap stopped a grid add.
    RiskBlocked {
        kind:   BlockKind,
        reason: String,
    },

    ControlApplied {
        command: ControlCommand,
        enabled: bool,
    },

    /// A cycle was skipped.
    CycleSkipped {
        reason: String,
    },
}

impl WsEvent {
    #[inline]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"event":"SERIALIZATION_ERROR"}"#.to_string())
    }
}
