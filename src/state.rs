//! # state
//!
//! Shared state between the strategy loop and the HTTP handlers.
//!
//! The loop is the only writer of the ledger and cycle state and keeps them
//! private. What the outside world sees here are copies it publishes after
//! each cycle. Operator commands travel the other way over an mpsc channel
//! and are applied by the loop at the start of its next iteration.

use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, RwLock};

use crate::error::AppError;
use crate::events::WsEvent;
use crate::models::{HistoryPoint, StatusSnapshot, TradeRecord};
use crate::risk::RiskStatus;

/// Bounded so a stuck loop cannot buffer commands without limit.
const COMMAND_QUEUE: usize = 32;

// ─── Commands ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ControlCommand {
    /// Stop grid adds and profit exits.
    Pause,
    Resume,
    /// Close the whole position regardless of the profit threshold.
    ForceClose,
}

impl FromStr for ControlCommand {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pause" => Ok(ControlCommand::Pause),
            "resume" => Ok(ControlCommand::Resume),
            "force-close" | "forceclose" => Ok(ControlCommand::ForceClose),
            other => Err(AppError::BadRequest(format!(
                "unknown command '{other}' (expected pause, resume or force-close)"
            ))),
        }
    }
}

// ─── AppState ─────────────────────────────────────────────────────────────────

pub struct AppState {
    /// Latest snapshot published by the loop.
    pub status: RwLock<StatusSnapshot>,

    /// Rolling chart history, newest last.
    pub history: RwLock<VecDeque<HistoryPoint>>,

    /// Every trade of this session.
    pub trades: RwLock<Vec<TradeRecord>>,

    pub risk: RwLock<Option<RiskStatus>>,

    /// Broadcast channel for WebSocket clients (pre-serialized JSON).
    pub broadcast_tx: broadcast::Sender<String>,

    pub cycle_count: AtomicU64,
    pub error_count: AtomicU64,

    commands:    mpsc::Sender<ControlCommand>,
    history_len: usize,
}

impl AppState {
    pub fn new(symbol: &str, history_len: usize) -> (Self, mpsc::Receiver<ControlCommand>) {
        let (broadcast_tx, _) = broadcast::channel(256);
        let (commands, command_rx) = mpsc::channel(COMMAND_QUEUE);

        let state = Self {
            status:       RwLock::new(StatusSnapshot::starting(symbol)),
            history:      RwLock::new(VecDeque::with_capacity(history_len)),
            trades:       RwLock::new(Vec::new()),
            risk:         RwLock::new(None),
            broadcast_tx,
            cycle_count:  AtomicU64::new(0),
            error_count:  AtomicU64::new(0),
            commands,
            history_len,
        };
        (state, command_rx)
    }

    // ── Helper Methods ────────────────────────────────────────────────────────

    /// No-op when nobody is subscribed.
    pub fn broadcast(&self, event: &WsEvent) {
        let _ = self.broadcast_tx.send(event.to_json());
    }

    /// Queues a command for the loop's next iteration.
    pub async fn send_command(&self, command: ControlCommand) -> Result<(), AppError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| AppError::LoopUnavailable)
    }

    pub async fn publish_status(&self, snapshot: StatusSnapshot) {
        *self.status.write().await = snapshot;
    }

    /// Shows a skipped cycle on the dashboard; numbers keep their last values.
    pub async fn mark_skipped(&self, reason: &str) {
        let mut status = self.status.write().await;
        status.status = format!("Error: {reason}");
        status.updated_at = Utc::now();
    }

    pub async fn status_snapshot(&self) -> StatusSnapshot {
        self.status.read().await.clone()
    }

    pub async fn publish_risk(&self, status: RiskStatus) {
        *self.risk.write().await = Some(status);
    }

    pub async fn push_history(&self, point: HistoryPoint) {
        let mut history = self.history.write().await;
        if history.len() >= self.history_len {
            history.pop_front();
        }
        history.push_back(point);
    }

    pub async fn push_trade(&self, record: TradeRecord) {
        self.trades.write().await.push(record);
    }

    /// Last `n` trades, newest last.
    pub async fn recent_trades(&self, n: usize) -> Vec<TradeRecord> {
        let trades = self.trades.read().await;
        trades[trades.len().saturating_sub(n)..].to_vec()
    }

    pub fn bump_cycle(&self) -> u64 {
        self.cycle_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn bump_error(&self) -> u64 {
        self.error_count.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Convenience type alias
pub type SharedState = Arc<AppState>;

pub fn build_state(symbol: &str, history_len: usize) -> (SharedState, mpsc::Receiver<ControlCommand>) {
    let (state, rx) = AppState::new(symbol, history_len);
    (Arc::new(state), rx)
}
