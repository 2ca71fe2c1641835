//! # routes::monitor
//!
//! Read-only dashboard endpoints.
//!
//! | Method    | Path           | Description                                  |
//! |-----------|----------------|----------------------------------------------|
//! | GET (WS)  | `/ws/monitor`  | Real-time event stream                       |
//! | GET       | `/api/status`  | Latest status snapshot                       |
//! | GET       | `/api/history` | Rolling price / P&L samples                  |
//! | GET       | `/api/trades`  | Session trade log                            |
//! | GET       | `/api/risk`    | Caps, failure streak, current block          |
//! | GET       | `/health`      | Liveness + loop counters                     |

use std::sync::atomic::Ordering;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
    Json,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::state::SharedState;

// ─── WebSocket Handler ────────────────────────────────────────────────────────

/// Sends the current status as a `SNAPSHOT` frame, then relays every
/// broadcast event as a JSON text frame.
pub async fn ws_monitor(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SharedState) {
    let mut rx = state.broadcast_tx.subscribe();
    let (mut sender, mut receiver) = socket.split();

    info!("🔌 WebSocket client connected");

    let status = state.status_snapshot().await;
    let risk = state.risk.read().await.clone();
    let snapshot = json!({
        "event":  "SNAPSHOT",
        "status": status,
        "risk":   risk,
    })
    .to_string();

    if sender.send(Message::Text(snapshot)).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(json_str) => {
                        if sender.send(Message::Text(json_str)).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        debug!("WS client lagged, skipped {n} events");
                    }
                    Err(_) => break,
                }
            }

            result = receiver.next() => {
                match result {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sender.send(Message::Pong(data)).await;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("🔌 WebSocket client disconnected");
}

// ─── REST ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

/// GET /api/status
pub async fn get_status(State(state): State<SharedState>) -> impl IntoResponse {
    let status = state.status_snapshot().await;
    Json(json!({ "ok": true, "status": status }))
}

/// GET /api/history?limit=N (newest last)
pub async fn get_history(
    State(state): State<SharedState>,
    Query(query): Query<LimitQuery>,
) -> impl IntoResponse {
    let history = state.history.read().await;
    let limit = query.limit.unwrap_or(history.len()).min(history.len());
    let points: Vec<_> = history.iter().skip(history.len() - limit).cloned().collect();

    Json(json!({
        "ok":     true,
        "count":  points.len(),
        "points": points,
    }))
}

/// GET /api/trades?limit=N (newest last)
pub async fn get_trades(
    State(state): State<SharedState>,
    Query(query): Query<LimitQuery>,
) -> impl IntoResponse {
    let records = match query.limit {
        Some(n) => state.recent_trades(n).await,
        None => state.trades.read().await.clone(),
    };

    Json(json!({
        "ok":      true,
        "count":   records.len(),
        "records": records,
    }))
}

/// GET /api/risk
pub async fn get_risk(State(state): State<SharedState>) -> impl IntoResponse {
    let risk = state.risk.read().await.clone();
    Json(json!({ "ok": true, "risk": risk }))
}

/// GET /health
pub async fn health_check(State(state): State<SharedState>) -> impl IntoResponse {
    let status = state.status_snapshot().await;
    Json(json!({
        "ok":          true,
        "symbol":      status.symbol,
        "enabled":     status.enabled,
        "cycle_count": state.cycle_count.load(Ordering::Relaxed),
        "error_count": state.error_count.load(Ordering::Relaxed),
        "updated_at":  status.updated_at,
    }))
}
