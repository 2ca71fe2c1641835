//! # engine::runner
//!
//! **StrategyLoop** — the only writer of the ledger and cycle state.
//!
//! ## One cycle
//! ```text
//! 1. Apply queued operator commands (pause / resume / force-close)
//! 2. Fetch price + exchange position      ── failure → skip cycle, back off
//! 3. Reconcile ledger against the position
//! 4. Force-close if requested
//!    else (when enabled) exit check ── exit fired → skip grid
//!                        grid check ── open / add (risk-capped)
//! 5. Drawdown alert
//! 6. Funding rate (every N cycles)
//! 7. Publish status, history, WebSocket event
//! ```
//!
//! Nothing here is fatal. Exchange errors are logged, notified and retried
//! on the next cycle.

use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::{LoopConfig, StrategyConfig};
use crate::engine::drawdown::DrawdownAlertEngine;
use crate::engine::exit::{ExitEvaluator, ExitSignal};
use crate::engine::grid::{CycleState, GridController, GridDecision};
use crate::engine::ledger::PositionLedger;
use crate::engine::reconcile::{ReconcileOutcome, ReconciliationService};
use crate::error::ExchangeError;
use crate::events::WsEvent;
use crate::exchange::SharedExchange;
use crate::models::{
    HistoryPoint, MarketInfo, OrderRequest, PositionSide, PositionSnapshot, StatusSnapshot,
    TradeKind, TradeRecord,
};
use crate::notify::{escape_html, Notifier};
use crate::risk::{RiskDecision, RiskLimits, RiskManager};
use crate::state::{ControlCommand, SharedState};

// ─── Backoff ──────────────────────────────────────────────────────────────────

/// Doubling delay after consecutive skipped cycles, capped at `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    base:     Duration,
    max:      Duration,
    current:  Option<Duration>,
    failures: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max: max.max(base), current: None, failures: 0 }
    }

    pub fn next_delay(&mut self) -> Duration {
        let next = match self.current {
            None => self.base,
            Some(d) => (d * 2).min(self.max),
        };
        self.current = Some(next);
        self.failures += 1;
        next
    }

    pub fn reset(&mut self) {
        self.current = None;
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

// ─── Cycle Outcome ────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum CycleOutcome {
    /// Cycle ran to the end. `action` describes the trade made, if any.
    Completed { action: Option<String> },
    /// Market data could not be read; nothing was mutated.
    Skipped { error: ExchangeError },
}

// ─── Strategy Loop ────────────────────────────────────────────────────────────

pub struct StrategyLoop {
    symbol:   String,
    market:   MarketInfo,
    exchange: SharedExchange,
    state:    SharedState,
    notifier: Notifier,
    commands: mpsc::Receiver<ControlCommand>,
    run:      LoopConfig,

    ledger: PositionLedger,
    cycle:  CycleState,

    grid:       GridController,
    exit:       ExitEvaluator,
    reconciler: ReconciliationService,
    alerts:     DrawdownAlertEngine,
    risk:       RiskManager,
    backoff:    Backoff,

    force_close_requested: bool,
    funding_rate:          Option<Decimal>,
    cycles:                u64,
    /// Consecutive cycles skipped for missing market data, of any error kind.
    skipped_cycles:        u32,
}

impl StrategyLoop {
    pub fn new(
        strategy: &StrategyConfig,
        run: LoopConfig,
        market: MarketInfo,
        exchange: SharedExchange,
        state: SharedState,
        notifier: Notifier,
        commands: mpsc::Receiver<ControlCommand>,
    ) -> Self {
        Self {
            symbol: strategy.symbol.clone(),
            ledger: PositionLedger::new(&market),
            market,
            exchange,
            state,
            notifier,
            commands,
            cycle: CycleState::default(),
            grid: GridController::new(strategy),
            exit: ExitEvaluator::new(strategy),
            reconciler: ReconciliationService::new(strategy.reconcile_epsilon),
            alerts: DrawdownAlertEngine::new(strategy),
            risk: RiskManager::new(RiskLimits::from_config(strategy)),
            backoff: Backoff::new(run.poll_interval, run.backoff_max),
            run,
            force_close_requested: false,
            funding_rate: None,
            cycles: 0,
            skipped_cycles: 0,
        }
    }

    pub fn ledger(&self) -> &PositionLedger {
        &self.ledger
    }

    pub fn cycle_state(&self) -> &CycleState {
        &self.cycle
    }

    /// Runs forever: one cycle, then sleep for the poll interval, or for the
    /// backoff delay when the cycle was skipped.
    pub async fn run(mut self) {
        info!(
            symbol   = %self.symbol,
            interval = ?self.run.poll_interval,
            "🔁 Strategy loop started"
        );

        loop {
            let delay = match self.run_cycle().await {
                CycleOutcome::Completed { .. } => {
                    self.backoff.reset();
                    self.run.poll_interval
                }
                CycleOutcome::Skipped { error } => {
                    let delay = if error.is_transient() {
                        self.backoff.next_delay()
                    } else {
                        self.run.poll_interval
                    };
                    warn!(error = %error, ?delay, backoff_steps = self.backoff.failures(), "⏭️ Cycle skipped");
                    delay
                }
            };
            tokio::time::sleep(delay).await;
        }
    }

    /// One full cycle. Public so tests can step the loop.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.cycles = self.state.bump_cycle();

        // ── 1. Operator commands ─────────────────────────────────────────────
        self.apply_commands();

        // ── 2. Market data ───────────────────────────────────────────────────
        let (price, snapshot) = match self.fetch_market_data().await {
            Ok(data) => data,
            Err(error) => {
                self.on_skipped(&error).await;
                return CycleOutcome::Skipped { error };
            }
        };
        self.on_recovered();
        debug!(cycle = self.cycles, %price, exchange_size = %snapshot.size, "Tick");

        // ── 3. Reconcile ─────────────────────────────────────────────────────
        self.reconcile(&snapshot);

        // ── 4. Decide ────────────────────────────────────────────────────────
        let action = if self.force_close_requested {
            self.force_close_requested = false;
            self.force_close(price).await
        } else if self.cycle.trading_enabled {
            match self.exit.evaluate(&self.ledger, price) {
                ExitSignal::ExitAll { net_pnl, required } => {
                    info!(%net_pnl, %required, "💰 Profit target reached — exiting");
                    self.close_all(price, TradeKind::Exit).await
                }
                ExitSignal::Hold { .. } => self.evaluate_grid(price).await,
            }
        } else {
            None
        };

        // ── 5. Drawdown alert ────────────────────────────────────────────────
        self.check_drawdown(price);

        // ── 6. Funding ───────────────────────────────────────────────────────
        self.poll_funding().await;

        // ── 7. Publish ───────────────────────────────────────────────────────
        self.publish(price, action.clone()).await;

        CycleOutcome::Completed { action }
    }

    // ─── Commands ────────────────────────────────────────────────────────────

    fn apply_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                ControlCommand::Pause => {
                    self.cycle.trading_enabled = false;
                    warn!("⏸️ Trading paused by operator");
                    self.notifier.notify("<b>Paused</b>\nNo new adds or exits until resumed.");
                }
                ControlCommand::Resume => {
                    self.cycle.trading_enabled = true;
                    info!("▶️ Trading resumed by operator");
                    self.notifier.notify("<b>Resumed</b>\nGrid trading re-enabled.");
                }
                ControlCommand::ForceClose => {
                    warn!("⛔ Force-close requested by operator");
                    self.force_close_requested = true;
                }
            }
            self.state.broadcast(&WsEvent::ControlApplied {
                command,
                enabled: self.cycle.trading_enabled,
            });
        }
    }

    // ─── Market Data ─────────────────────────────────────────────────────────

    async fn fetch_market_data(&self) -> Result<(Decimal, PositionSnapshot), ExchangeError> {
        let ticker = self.exchange.fetch_ticker(&self.symbol).await?;
        let mut snapshot = self.exchange.fetch_position(&self.symbol).await?;

        // Only the long leg is managed.
        if snapshot.side == PositionSide::Short {
            if !snapshot.is_flat() {
                warn!(size = %snapshot.size, "Ignoring short position on the venue");
            }
            snapshot = PositionSnapshot::flat();
        }

        // Some venues omit the entry price right after a fill.
        if !snapshot.is_flat() && snapshot.entry_price <= Decimal::ZERO {
            snapshot.entry_price = ticker.last;
        }
        Ok((ticker.last, snapshot))
    }

    async fn on_skipped(&mut self, error: &ExchangeError) {
        self.skipped_cycles += 1;
        let errors = self.state.bump_error();
        error!(error = %error, errors, streak = self.skipped_cycles, "Market data fetch failed — no state change");

        if self.skipped_cycles == 1 {
            self.notifier.notify(format!(
                "<b>Loop error</b>\n<code>{}</code>",
                escape_html(&error.to_string())
            ));
        }
        self.state.mark_skipped(&error.to_string()).await;
        self.state.broadcast(&WsEvent::CycleSkipped { reason: error.to_string() });
    }

    fn on_recovered(&mut self) {
        if self.skipped_cycles == 0 {
            return;
        }
        info!(skipped = self.skipped_cycles, "Market data recovered");
        self.notifier.notify(format!(
            "<b>Recovered</b>\nMarket data is back after {} skipped cycle(s).",
            self.skipped_cycles
        ));
        self.skipped_cycles = 0;
    }

    // ─── Reconciliation ──────────────────────────────────────────────────────

    fn reconcile(&mut self, snapshot: &PositionSnapshot) {
        let outcome = self.reconciler.reconcile(&mut self.ledger, snapshot);
        if !outcome.is_repair() {
            return;
        }

        match &outcome {
            ReconcileOutcome::ExternalClose { .. } => self.cycle.reset_cycle(),
            ReconcileOutcome::Rebuilt { entry } => self.cycle.last_grid_price = Some(entry.price),
            _ => {}
        }

        warn!(%outcome, "🔧 Ledger reconciled against exchange position");
        self.notifier.notify(format!(
            "<b>Reconciliation</b>\n{}",
            escape_html(&outcome.to_string())
        ));
        self.state.broadcast(&WsEvent::Reconciled { outcome });
    }

    // ─── Grid ────────────────────────────────────────────────────────────────

    async fn evaluate_grid(&mut self, price: Decimal) -> Option<String> {
        match self.grid.evaluate(&self.ledger, &self.cycle, price) {
            GridDecision::Hold { trigger_price } => {
                debug!(%price, ?trigger_price, "Holding");
                None
            }
            GridDecision::Open { size } => self.submit_add(price, size).await,
            GridDecision::Add { size, level, trigger_price } => {
                info!(%price, %trigger_price, level, "📉 Grid trigger hit");
                self.submit_add(price, size).await
            }
        }
    }

    async fn submit_add(&mut self, price: Decimal, raw_size: Decimal) -> Option<String> {
        let size = self.market.order_size(raw_size);

        let previous_block = self.risk.block_kind();
        if let RiskDecision::Blocked { kind, reason } =
            self.risk.pre_trade_check(&self.ledger, price, size)
        {
            if previous_block != Some(kind) {
                self.notifier.notify(format!(
                    "<b>Grid capped</b>\n{}",
                    escape_html(&reason)
                ));
                self.state.broadcast(&WsEvent::RiskBlocked { kind, reason });
            }
            return None;
        }

        let order = OrderRequest::open_long(&self.symbol, size);
        let receipt = match self.exchange.create_market_order(&order).await {
            Ok(receipt) => receipt,
            Err(e) => {
                self.on_order_failed("add", &e);
                return None;
            }
        };
        self.risk.record_success();

        if !self.grid.record_fill(&mut self.ledger, &mut self.cycle, price, size) {
            // Filled on the venue but below the ledger floor; the next
            // reconciliation picks the size up.
            warn!(%size, order_id = %receipt.order_id, "Fill below ledger floor — left to reconciliation");
            return None;
        }

        let level = self.ledger.entry_count();
        let record = TradeRecord::add(price, size, level, receipt.order_id.clone());
        let description = record.describe();

        info!(level, %price, %size, fill_price = ?receipt.fill_price, order_id = %receipt.order_id, "✅ Grid level filled");
        self.notifier.notify(format!(
            "<b>Grid add #{level}</b>\nPrice: <code>{}</code>\nSize: <code>{size}</code>\nOrder: <code>{}</code>",
            price.round_dp(2),
            escape_html(&receipt.order_id),
        ));
        self.state.push_trade(record.clone()).await;
        self.state.broadcast(&WsEvent::GridAdded { record: Box::new(record) });

        Some(description)
    }

    // ─── Exit ────────────────────────────────────────────────────────────────

    async fn force_close(&mut self, price: Decimal) -> Option<String> {
        if self.ledger.is_empty() {
            info!("Force-close requested but no position is open");
            self.notifier.notify("<b>Force-close</b>\nNo open position.");
            return None;
        }
        self.close_all(price, TradeKind::ForceExit).await
    }

    async fn close_all(&mut self, price: Decimal, kind: TradeKind) -> Option<String> {
        let order = OrderRequest::close_long(&self.symbol, self.ledger.total_size());
        let receipt = match self.exchange.create_market_order(&order).await {
            Ok(receipt) => receipt,
            Err(e) => {
                self.on_order_failed("close", &e);
                return None;
            }
        };
        self.risk.record_success();

        let closed = self.exit.settle(&mut self.ledger, &mut self.cycle, price);
        let record = TradeRecord::exit(
            kind,
            price,
            closed.size,
            closed.levels,
            closed.realized_pnl,
            receipt.order_id.clone(),
        );
        let description = record.describe();

        info!(
            ?kind,
            levels       = closed.levels,
            size         = %closed.size,
            realized_pnl = %closed.realized_pnl,
            order_id     = %receipt.order_id,
            "🏁 Position closed"
        );
        let title = match kind {
            TradeKind::ForceExit => "Force-closed",
            _ => "Profit taken — full exit",
        };
        self.notifier.notify(format!(
            "<b>{title}</b>\nLevels: <code>{}</code>\nNet: <code>{:+}</code>\nOrder: <code>{}</code>",
            closed.levels,
            closed.realized_pnl.round_dp(4),
            escape_html(&receipt.order_id),
        ));
        self.state.push_trade(record.clone()).await;
        self.state.broadcast(&WsEvent::PositionClosed { record: Box::new(record), closed });

        Some(description)
    }

    fn on_order_failed(&mut self, action: &str, e: &ExchangeError) {
        let failures = self.risk.record_failure();
        error!(action, error = %e, failures, "❌ Order failed — ledger unchanged");
        self.notifier.notify(format!(
            "<b>Order failed ({action})</b>\n<code>{}</code>\nConsecutive failures: {failures}",
            escape_html(&e.to_string())
        ));
        self.state.broadcast(&WsEvent::OrderRejected {
            action: action.to_string(),
            reason: e.to_string(),
        });
    }

    // ─── Alerts / Funding ────────────────────────────────────────────────────

    fn check_drawdown(&mut self, price: Decimal) {
        let has_position = !self.ledger.is_empty();
        if let Some(alert) = self.alerts.on_price(&mut self.cycle, price, has_position) {
            let pct = (alert.drawdown * Decimal::ONE_HUNDRED).round_dp(2);
            warn!(peak = %alert.peak_price, %price, drawdown_pct = %pct, "📉 Drawdown alert");
            self.notifier.notify(format!(
                "<b>Drawdown warning</b>\nPeak: <code>{}</code>\nNow: <code>{}</code> (-{pct}%)\nLevels held: {}",
                alert.peak_price.round_dp(2),
                price.round_dp(2),
                self.ledger.entry_count(),
            ));
            self.state.broadcast(&WsEvent::DrawdownAlert { alert });
        }
    }

    async fn poll_funding(&mut self) {
        let every = self.run.funding_every_cycles;
        if every == 0 || (self.cycles - 1) % every != 0 {
            return;
        }
        match self.exchange.fetch_funding_rate(&self.symbol).await {
            Ok(funding) => {
                info!(rate = %funding.rate, "Funding rate");
                self.funding_rate = Some(funding.rate);
            }
            Err(e) => warn!(error = %e, "Funding rate unavailable"),
        }
    }

    // ─── Publish ─────────────────────────────────────────────────────────────

    async fn publish(&self, price: Decimal, action: Option<String>) {
        let pnl = self.ledger.pnl(price, self.exit.fee_rate());
        let size = self.ledger.total_size();

        let status = if !self.cycle.trading_enabled {
            format!("Paused | size {size} | net {:+}", pnl.net.round_dp(4))
        } else if self.ledger.is_empty() {
            "Flat".to_string()
        } else {
            format!("Holding {size} | net {:+}", pnl.net.round_dp(4))
        };

        let snapshot = StatusSnapshot {
            symbol:             self.symbol.clone(),
            price,
            position_size:      size,
            average_price:      self.ledger.average_price(),
            total_cost:         self.ledger.total_cost(),
            market_value:       pnl.market_value,
            net_pnl:            pnl.net,
            entry_count:        self.ledger.entry_count(),
            last_grid_price:    self.cycle.last_grid_price,
            next_trigger_price: self
                .grid
                .next_trigger(&self.ledger, &self.cycle)
                .map(|p| self.market.quantize_price(p)),
            peak_price:         self.cycle.peak_price,
            funding_rate:       self.funding_rate,
            enabled:            self.cycle.trading_enabled,
            status,
            cycle_count:        self.cycles,
            trade_log:          self.state.recent_trades(self.run.trade_log_len).await,
            updated_at:         Utc::now(),
        };

        self.state
            .push_history(HistoryPoint {
                time_ms: snapshot.updated_at.timestamp_millis(),
                price,
                size,
                net_pnl: pnl.net,
                action,
            })
            .await;
        self.state.publish_risk(self.risk.status()).await;
        self.state.broadcast(&WsEvent::Status { status: Box::new(snapshot.clone()) });
        self.state.publish_status(snapshot).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use rust_decimal_macros::dec;
    use tokio::sync::mpsc::UnboundedReceiver;

    use crate::exchange::{Exchange, PaperExchange};
    use crate::models::Side;
    use crate::state::{build_state, SharedState};

    struct Harness {
        runner:   StrategyLoop,
        paper:    Arc<PaperExchange>,
        state:    SharedState,
        notes:    UnboundedReceiver<String>,
    }

    fn market() -> MarketInfo {
        MarketInfo {
            symbol:     "ETH/USDT:USDT".into(),
            size_step:  dec!(0.000001),
            price_tick: dec!(0.01),
            min_size:   dec!(0.0001),
        }
    }

    fn strategy() -> StrategyConfig {
        StrategyConfig {
            symbol:          "ETH/USDT:USDT".into(),
            base_size:       dec!(0.0005),
            multiplier:      dec!(1.33),
            grid_pct_fine:   dec!(0.0005),
            grid_pct_coarse: dec!(0.001),
            tier_boundary:   12,
            profit_per_grid: dec!(0.005),
            fee_rate:        dec!(0.001),
            max_entries:     4,
            max_notional:    dec!(100),
            ..StrategyConfig::default()
        }
    }

    fn harness_with(strategy: StrategyConfig) -> Harness {
        let paper = Arc::new(PaperExchange::new(market(), dec!(2000)));
        let exchange: SharedExchange = paper.clone();
        let (state, commands) = build_state(&strategy.symbol, 300);
        let (notifier, notes) = Notifier::detached();
        let runner = StrategyLoop::new(
            &strategy,
            LoopConfig::default(),
            market(),
            exchange,
            state.clone(),
            notifier,
            commands,
        );
        Harness { runner, paper, state, notes }
    }

    fn harness() -> Harness {
        harness_with(strategy())
    }

    fn drain(notes: &mut UnboundedReceiver<String>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(n) = notes.try_recv() {
            out.push(n);
        }
        out
    }

    #[tokio::test]
    async fn first_cycle_opens_base_position() {
        let mut h = harness();
        let outcome = h.runner.run_cycle().await;

        assert!(matches!(outcome, CycleOutcome::Completed { action: Some(_) }));
        assert_eq!(h.runner.ledger().entry_count(), 1);
        assert_eq!(h.runner.ledger().total_size(), dec!(0.0005));
        assert_eq!(h.runner.cycle_state().last_grid_price, Some(dec!(2000)));
        assert_eq!(h.paper.fetch_position("X").await.unwrap().size, dec!(0.0005));
    }

    #[tokio::test]
    async fn drop_to_trigger_adds_geometric_level() {
        let mut h = harness();
        h.runner.run_cycle().await;

        h.paper.set_price(dec!(1999.0)).await;
        h.runner.run_cycle().await;

        let fills = h.paper.fills().await;
        assert_eq!(fills.len(), 2);
        assert_eq!(fills[1].size, dec!(0.000665));
        assert_eq!(h.runner.ledger().total_cost(), dec!(2.329335));
        assert_eq!(h.runner.cycle_state().last_grid_price, Some(dec!(1999.0)));
    }

    #[tokio::test]
    async fn price_above_trigger_holds() {
        let mut h = harness();
        h.runner.run_cycle().await;
        h.paper.set_price(dec!(1999.5)).await;

        let outcome = h.runner.run_cycle().await;
        assert!(matches!(outcome, CycleOutcome::Completed { action: None }));
        assert_eq!(h.paper.fills().await.len(), 1);
    }

    #[tokio::test]
    async fn rejected_add_retries_from_same_reference() {
        let mut h = harness();
        h.runner.run_cycle().await;
        drain(&mut h.notes);

        h.paper.set_price(dec!(1999.0)).await;
        h.paper.reject_next_orders(1).await;
        h.runner.run_cycle().await;

        assert_eq!(h.runner.ledger().entry_count(), 1);
        assert_eq!(h.runner.cycle_state().last_grid_price, Some(dec!(2000)));
        assert!(drain(&mut h.notes).iter().any(|n| n.contains("Order failed")));

        h.runner.run_cycle().await;
        assert_eq!(h.runner.ledger().entry_count(), 2);
    }

    #[tokio::test]
    async fn profit_exit_closes_everything() {
        let mut h = harness();
        h.runner.run_cycle().await;
        h.paper.set_price(dec!(1999.0)).await;
        h.runner.run_cycle().await;

        // 2010 nets 0.00997335, just short of 0.005 × 2
        h.paper.set_price(dec!(2010)).await;
        h.runner.run_cycle().await;
        assert_eq!(h.runner.ledger().entry_count(), 2);

        h.paper.set_price(dec!(2015)).await;
        h.runner.run_cycle().await;

        assert!(h.runner.ledger().is_empty());
        assert_eq!(h.runner.cycle_state().last_grid_price, None);
        let fills = h.paper.fills().await;
        let close = fills.last().unwrap();
        assert_eq!(close.side, Side::Sell);
        assert!(close.reduce_only);
        assert_eq!(close.size, dec!(0.001165));

        let trades = h.state.trades.read().await;
        let exit = trades.last().unwrap();
        assert_eq!(exit.kind, TradeKind::Exit);
        assert_eq!(exit.realized_pnl, Some(dec!(0.015792525)));
    }

    #[tokio::test]
    async fn exit_and_add_are_exclusive_within_a_cycle() {
        let mut h = harness();
        h.runner.run_cycle().await;
        h.paper.set_price(dec!(2100)).await;
        h.runner.run_cycle().await;

        // exited; the fresh cycle opens on the next tick, not this one
        assert!(h.runner.ledger().is_empty());
        assert_eq!(h.paper.fills().await.len(), 2);
        h.runner.run_cycle().await;
        assert_eq!(h.runner.ledger().entry_count(), 1);
    }

    #[tokio::test]
    async fn pause_blocks_trading_until_resume() {
        let mut h = harness();
        h.state.send_command(ControlCommand::Pause).await.unwrap();
        h.runner.run_cycle().await;
        assert!(h.runner.ledger().is_empty());
        assert!(!h.state.status_snapshot().await.enabled);

        h.state.send_command(ControlCommand::Resume).await.unwrap();
        h.runner.run_cycle().await;
        assert_eq!(h.runner.ledger().entry_count(), 1);
        assert!(h.state.status_snapshot().await.enabled);
    }

    #[tokio::test]
    async fn force_close_ignores_threshold() {
        let mut h = harness();
        h.runner.run_cycle().await;
        h.paper.set_price(dec!(1999.9)).await;

        h.state.send_command(ControlCommand::ForceClose).await.unwrap();
        h.runner.run_cycle().await;

        assert!(h.runner.ledger().is_empty());
        assert!(h.paper.fetch_position("X").await.unwrap().is_flat());
        let trades = h.state.trades.read().await;
        assert_eq!(trades.last().unwrap().kind, TradeKind::ForceExit);
    }

    #[tokio::test]
    async fn force_close_works_while_paused() {
        let mut h = harness();
        h.runner.run_cycle().await;
        h.state.send_command(ControlCommand::Pause).await.unwrap();
        h.state.send_command(ControlCommand::ForceClose).await.unwrap();
        h.runner.run_cycle().await;

        assert!(h.runner.ledger().is_empty());
        // still paused: no reopening
        h.runner.run_cycle().await;
        assert!(h.runner.ledger().is_empty());
    }

    #[tokio::test]
    async fn manual_liquidation_clears_ledger() {
        let mut h = harness();
        h.runner.run_cycle().await;
        h.paper.set_price(dec!(1999.0)).await;
        h.runner.run_cycle().await;
        drain(&mut h.notes);

        h.paper.set_position(Decimal::ZERO, Decimal::ZERO).await;
        h.paper.set_price(dec!(1990)).await;
        h.state.send_command(ControlCommand::Pause).await.unwrap();
        h.runner.run_cycle().await;

        assert!(h.runner.ledger().is_empty());
        assert_eq!(h.runner.cycle_state().last_grid_price, None);
        assert!(drain(&mut h.notes).iter().any(|n| n.contains("Reconciliation")));
    }

    #[tokio::test]
    async fn restart_rebuilds_from_exchange_position() {
        let mut h = harness();
        h.paper.set_position(dec!(0.002), dec!(1995)).await;
        h.paper.set_price(dec!(1995)).await;

        h.runner.run_cycle().await;

        assert_eq!(h.runner.ledger().entry_count(), 1);
        assert_eq!(h.runner.ledger().entries()[0].price, dec!(1995));
        assert_eq!(h.runner.ledger().entries()[0].size, dec!(0.002));
        assert_eq!(h.runner.cycle_state().last_grid_price, Some(dec!(1995)));
        assert!(h.paper.fills().await.is_empty());
    }

    #[tokio::test]
    async fn quote_outage_skips_without_mutation() {
        let mut h = harness();
        h.runner.run_cycle().await;
        let before = h.runner.ledger().entries().to_vec();

        h.paper.fail_next_quotes(1).await;
        let outcome = h.runner.run_cycle().await;

        assert!(matches!(outcome, CycleOutcome::Skipped { ref error } if error.is_transient()));
        assert_eq!(h.runner.ledger().entries(), before.as_slice());
        assert!(drain(&mut h.notes).iter().any(|n| n.contains("Loop error")));
    }

    #[tokio::test]
    async fn persistent_bad_quotes_notify_once_then_recover() {
        let mut h = harness();
        h.runner.run_cycle().await;
        drain(&mut h.notes);

        h.paper.garble_next_quotes(2).await;
        for _ in 0..2 {
            let outcome = h.runner.run_cycle().await;
            assert!(matches!(outcome, CycleOutcome::Skipped { ref error } if !error.is_transient()));
        }

        let notes = drain(&mut h.notes);
        assert_eq!(notes.iter().filter(|n| n.contains("Loop error")).count(), 1);
        assert!(h.state.status_snapshot().await.status.starts_with("Error: decode error"));

        h.runner.run_cycle().await;
        let notes = drain(&mut h.notes);
        assert_eq!(notes.iter().filter(|n| n.contains("Recovered")).count(), 1);
        assert!(!h.state.status_snapshot().await.status.starts_with("Error"));
    }

    #[tokio::test]
    async fn notional_cap_notifies_once_while_price_falls() {
        let mut h = harness_with(StrategyConfig { max_notional: dec!(1.5), ..strategy() });
        h.runner.run_cycle().await;
        drain(&mut h.notes);

        for price in [dec!(1990), dec!(1989), dec!(1988), dec!(1987), dec!(1986)] {
            h.paper.set_price(price).await;
            h.runner.run_cycle().await;
        }

        assert_eq!(h.runner.ledger().entry_count(), 1);
        let notes = drain(&mut h.notes);
        assert_eq!(notes.iter().filter(|n| n.contains("Grid capped")).count(), 1);
        let risk = h.state.risk.read().await.clone().unwrap();
        assert_eq!(risk.block_kind, Some(crate::risk::BlockKind::MaxNotional));
    }

    #[tokio::test]
    async fn max_entries_caps_the_grid() {
        let mut h = harness_with(StrategyConfig { max_entries: 2, ..strategy() });
        h.runner.run_cycle().await;
        h.paper.set_price(dec!(1999.0)).await;
        h.runner.run_cycle().await;
        drain(&mut h.notes);

        h.paper.set_price(dec!(1990)).await;
        h.runner.run_cycle().await;
        h.runner.run_cycle().await;

        assert_eq!(h.runner.ledger().entry_count(), 2);
        let notes = drain(&mut h.notes);
        assert_eq!(notes.iter().filter(|n| n.contains("Grid capped")).count(), 1);
    }

    #[tokio::test]
    async fn status_reflects_ledger() {
        let mut h = harness();
        h.runner.run_cycle().await;

        let status = h.state.status_snapshot().await;
        assert_eq!(status.entry_count, 1);
        assert_eq!(status.position_size, dec!(0.0005));
        assert_eq!(status.average_price, dec!(2000));
        assert_eq!(status.next_trigger_price, Some(dec!(1999.0)));
        assert_eq!(status.trade_log.len(), 1);
        assert_eq!(status.funding_rate, Some(dec!(0.0001)));
        assert_eq!(h.state.history.read().await.len(), 1);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let mut backoff = Backoff::new(Duration::from_secs(10), Duration::from_secs(35));
        assert_eq!(backoff.next_delay(), Duration::from_secs(10));
        assert_eq!(backoff.next_delay(), Duration::from_secs(20));
        assert_eq!(backoff.next_delay(), Duration::from_secs(35));
        assert_eq!(backoff.failures(), 3);
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(10));
    }
}
