pub mod control;
pub mod dashboard;
pub mod monitor;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::{require_api_key, ApiKey};
use crate::state::SharedState;

use control::post_control;
use dashboard::dashboard;
use monitor::{get_history, get_risk, get_status, get_trades, health_check, ws_monitor};

pub fn router(state: SharedState, api_key: ApiKey) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // ── Monitor ───────────────────────────────────────────────────────────
        .route("/",                      get(dashboard))
        .route("/ws/monitor",            get(ws_monitor))
        .route("/api/status",            get(get_status))
        .route("/api/history",           get(get_history))
        .route("/api/trades",            get(get_trades))
        .route("/api/risk",              get(get_risk))
        .route("/health",                get(health_check))
        // ── Control ───────────────────────────────────────────────────────────
        .route("/api/control/:command",  post(post_control))
        // ── Middleware ────────────────────────────────────────────────────────
        .layer(axum::middleware::from_fn_with_state(api_key, require_api_key))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
