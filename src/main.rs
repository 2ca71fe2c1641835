//! # Martingrid — Martingale Grid Position Engine
//!
//! ```text
//!  ┌─────────────┐  ticker / position / orders  ┌──────────────────────────┐
//!  │  Exchange   │ ◀──────────────────────────▶ │ StrategyLoop             │
//!  │ (REST/Paper)│                               │ ├─ PositionLedger        │
//!  └─────────────┘                               │ ├─ Grid / Exit / Risk    │
//!                                                │ ├─ Reconciliation        │
//!  ┌─────────────┐  sendMessage                  │ └─ Drawdown alerts       │
//!  │  Telegram   │ ◀──────────────────────────── └───────────┬──────────────┘
//!  └─────────────┘                                           │ publish
//!                                                ┌───────────▼──────────────┐
//!  ┌─────────────┐  ws://host/ws/monitor         │ AppState                 │
//!  │  Dashboard  │ ◀───────────────────────────  │ ├─ status / history      │
//!  └─────────────┘  GET  /api/status|history     │ ├─ trades / risk         │
//!                   POST /api/control/*  ──────▶ │ └─ command queue ──▶ loop│
//!                                                └──────────────────────────┘
//! ```

use std::net::SocketAddr;

use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod auth;
mod config;
mod engine;
mod error;
mod events;
mod exchange;
mod models;
mod notify;
mod risk;
mod routes;
mod state;

use auth::ApiKey;
use config::Config;
use engine::StrategyLoop;
use exchange::build_exchange;
use models::MarketInfo;
use notify::Notifier;
use state::build_state;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Load .env ──────────────────────────────────────────────────────────
    dotenvy::dotenv().ok();

    // ── 2. Structured logging ─────────────────────────────────────────────────
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("martingrid=debug".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    info!(r#"

  ╔═══════════════════════════════════════════════════════╗
  ║            MARTINGRID — Grid Position Engine          ║
  ║   Ledger · Grid · Exit · Reconcile · Alerts · Risk    ║
  ╚═══════════════════════════════════════════════════════╝"#);

    // ── 3. Configuration ──────────────────────────────────────────────────────
    let config = Config::from_env()?;
    let strategy = &config.strategy;
    info!(
        symbol          = %strategy.symbol,
        base_size       = %strategy.base_size,
        multiplier      = %strategy.multiplier,
        profit_per_grid = %strategy.profit_per_grid,
        max_entries     = strategy.max_entries,
        mode            = ?config.exchange.mode,
        "⚙️ Configuration loaded"
    );

    // ── 4. Exchange + market precision ────────────────────────────────────────
    let exchange = build_exchange(&config.exchange, &strategy.symbol);
    let market = match exchange.fetch_market(&strategy.symbol).await {
        Ok(market) => market,
        Err(e) => {
            warn!(error = %e, "Market precision unavailable — using conservative defaults");
            MarketInfo::conservative_default(&strategy.symbol)
        }
    };
    info!(
        size_step  = %market.size_step,
        price_tick = %market.price_tick,
        min_size   = %market.min_size,
        "📐 Market precision"
    );

    // ── 5. Shared state + notifier ────────────────────────────────────────────
    let (state, commands) = build_state(&strategy.symbol, config.run.history_len);
    let notifier = Notifier::spawn(&config.telegram, reqwest::Client::new());
    notifier.notify(format!(
        "<b>Martingrid started</b>\nSymbol: <code>{}</code>",
        notify::escape_html(&strategy.symbol)
    ));

    // ── 6. Strategy loop ──────────────────────────────────────────────────────
    let runner = StrategyLoop::new(
        strategy,
        config.run.clone(),
        market,
        exchange,
        state.clone(),
        notifier,
        commands,
    );
    tokio::spawn(runner.run());

    // ── 7. Router ─────────────────────────────────────────────────────────────
    let api_key = ApiKey::from_env();
    if !api_key.is_enabled() {
        warn!("API_KEY not set — control endpoints are open");
    }
    let app = routes::router(state, api_key);

    // ── 8. Bind & Serve ───────────────────────────────────────────────────────
    let addr: SocketAddr = config.bind_addr.parse()?;
    info!(?addr, "🚀 Martingrid server starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
