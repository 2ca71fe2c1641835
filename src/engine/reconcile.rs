//! # engine::reconcile
//!
//! **ReconciliationService** — keeps the ledger's aggregate size equal to
//! the exchange-reported position.
//!
//! | exchange | ledger    | action                                          |
//! |----------|-----------|-------------------------------------------------|
//! | 0        | non-empty | clear (closed outside the bot)                  |
//! | > 0      | empty     | rebuild as one synthetic entry at entry price   |
//! | > 0      | non-empty | absorb the size difference into the newest level|
//!
//! Only aggregate size is repaired. Per-level prices are never invented.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::engine::ledger::{Entry, PositionLedger};
use crate::models::PositionSnapshot;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconcileOutcome {
    /// Ledger already matches (including both flat).
    InSync,
    /// Exchange is flat but the ledger was not.
    ExternalClose { cleared_size: Decimal, cleared_levels: usize },
    /// Ledger was empty and got one synthetic entry.
    Rebuilt { entry: Entry },
    /// Sizes differed by more than epsilon; the newest levels absorbed it.
    Adjusted {
        local_size:     Decimal,
        exchange_size:  Decimal,
        delta:          Decimal,
        dropped_levels: usize,
    },
}

impl ReconcileOutcome {
    pub fn is_repair(&self) -> bool {
        !matches!(self, ReconcileOutcome::InSync)
    }
}

impl std::fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconcileOutcome::InSync => write!(f, "in sync"),
            ReconcileOutcome::ExternalClose { cleared_size, cleared_levels } => write!(
                f,
                "exchange flat; cleared {cleared_levels} level(s), size {cleared_size}"
            ),
            ReconcileOutcome::Rebuilt { entry } => write!(
                f,
                "rebuilt ledger from exchange: {} @ {}",
                entry.size, entry.price
            ),
            ReconcileOutcome::Adjusted { local_size, exchange_size, delta, dropped_levels } => {
                write!(
                    f,
                    "size {local_size} -> {exchange_size} (delta {delta:+}, dropped {dropped_levels} level(s))"
                )
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReconciliationService {
    epsilon: Decimal,
}

impl ReconciliationService {
    pub fn new(epsilon: Decimal) -> Self {
        Self { epsilon: epsilon.abs() }
    }

    /// Aligns `ledger` with `snapshot`. Applying the same snapshot twice is
    /// the same as applying it once.
    pub fn reconcile(
        &self,
        ledger: &mut PositionLedger,
        snapshot: &PositionSnapshot,
    ) -> ReconcileOutcome {
        match (snapshot.is_flat(), ledger.is_empty()) {
            (true, true) => ReconcileOutcome::InSync,

            (true, false) => {
                let outcome = ReconcileOutcome::ExternalClose {
                    cleared_size:   ledger.total_size(),
                    cleared_levels: ledger.entry_count(),
                };
                ledger.clear();
                outcome
            }

            (false, true) => {
                let entry = Entry { price: snapshot.entry_price, size: snapshot.size };
                ledger.reset_to(entry);
                ReconcileOutcome::Rebuilt { entry }
            }

            (false, false) => {
                let local_size = ledger.total_size();
                let delta = snapshot.size - local_size;
                if delta.abs() <= self.epsilon {
                    return ReconcileOutcome::InSync;
                }
                let dropped_levels = absorb(ledger, delta);
                ReconcileOutcome::Adjusted {
                    local_size,
                    exchange_size: snapshot.size,
                    delta,
                    dropped_levels,
                }
            }
        }
    }
}

/// Applies a signed size difference to the newest entry. A shrink larger
/// than the newest entry removes it and carries the rest to the one before.
fn absorb(ledger: &mut PositionLedger, delta: Decimal) -> usize {
    if delta > Decimal::ZERO {
        if let Some(last) = ledger.last_mut() {
            last.size += delta;
        }
        return 0;
    }

    let mut deficit = -delta;
    let mut dropped = 0;
    while deficit > Decimal::ZERO {
        let Some(last) = ledger.last_mut() else { break };
        if last.size > deficit {
            last.size -= deficit;
            break;
        }
        deficit -= last.size;
        ledger.pop();
        dropped += 1;
    }
    dropped
}
