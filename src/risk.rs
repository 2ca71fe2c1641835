//! # risk — safety caps on martingale sizing
//!
//! Geometric sizing commits exponentially more capital per level, so every
//! add must pass these checks before an order is sent:
//!
//! 1. **Max entries**  — the grid never grows past `max_entries` levels
//! 2. **Max notional** — committed cost plus the new add stays within `max_notional`
//!
//! Consecutive order failures are counted for the status page and for
//! escalating notifications. They never halt the loop.

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::StrategyConfig;
use crate::engine::ledger::PositionLedger;

// ─── Config ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct RiskLimits {
    pub max_entries:  usize,
    pub max_notional: Decimal,
}

impl RiskLimits {
    pub fn from_config(config: &StrategyConfig) -> Self {
        Self {
            max_entries:  config.max_entries,
            max_notional: config.max_notional,
        }
    }
}

// ─── Decision ─────────────────────────────────────────────────────────────────

/// Which cap stopped an add. Stable across cycles, unlike the reason text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockKind {
    MaxEntries,
    MaxNotional,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RiskDecision {
    Approved,
    Blocked { kind: BlockKind, reason: String },
}

// ─── Status (for Dashboard / API) ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct RiskStatus {
    pub limits:               RiskLimits,
    pub consecutive_failures: u32,
    pub block_kind:           Option<BlockKind>,
    pub last_block:           Option<String>,
}

// ─── Risk Manager ─────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct RiskManager {
    limits:               RiskLimits,
    consecutive_failures: u32,
    last_block:           Option<(BlockKind, String)>,
}

impl RiskManager {
    pub fn new(limits: RiskLimits) -> Self {
        Self { limits, consecutive_failures: 0, last_block: None }
    }

    /// Checks a prospective add of `size` at `price` against the caps.
    pub fn pre_trade_check(
        &mut self,
        ledger: &PositionLedger,
        price: Decimal,
        size: Decimal,
    ) -> RiskDecision {
        if ledger.entry_count() >= self.limits.max_entries {
            return self.block(BlockKind::MaxEntries, format!(
                "Max entries reached: {}/{}",
                ledger.entry_count(),
                self.limits.max_entries
            ));
        }

        let projected = ledger.total_cost() + price * size;
        if projected > self.limits.max_notional {
            return self.block(BlockKind::MaxNotional, format!(
                "Max notional exceeded: {projected} > {}",
                self.limits.max_notional
            ));
        }

        self.last_block = None;
        RiskDecision::Approved
    }

    fn block(&mut self, kind: BlockKind, reason: String) -> RiskDecision {
        if self.block_kind() != Some(kind) {
            warn!(?kind, %reason, "🛡️ Risk cap blocked grid add");
        }
        self.last_block = Some((kind, reason.clone()));
        RiskDecision::Blocked { kind, reason }
    }

    /// Cap that blocked the most recent check; `None` once an add passes.
    pub fn block_kind(&self) -> Option<BlockKind> {
        self.last_block.as_ref().map(|(kind, _)| *kind)
    }

    // ─── Order Result Recording ──────────────────────────────────────────────

    pub fn record_success(&mut self) {
        let prev = self.consecutive_failures;
        self.consecutive_failures = 0;
        if prev > 0 {
            info!("Risk: consecutive_failures reset (was {prev})");
        }
    }

    /// Returns the new consecutive failure count.
    pub fn record_failure(&mut self) -> u32 {
        self.consecutive_failures += 1;
        warn!(consecutive = self.consecutive_failures, "⚠️ Risk: order failure recorded");
        self.consecutive_failures
    }

    pub fn status(&self) -> RiskStatus {
        RiskStatus {
            limits:               self.limits.clone(),
            consecutive_failures: self.consecutive_failures,
            block_kind:           self.block_kind(),
            last_block:           self.last_block.as_ref().map(|(_, reason)| reason.clone()),
        }
    }
}
