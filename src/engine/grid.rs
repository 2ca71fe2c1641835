//! # engine::grid
//!
//! **GridController** — decides whether to open or add, and how much.
//!
//! ```text
//!   EMPTY ──(first tick: open base_size)──▶ ARMED
//!   ARMED ──(price ≤ last_grid_price × (1 − pct)): add base × mult^n ──▶ ARMED
//!   ARMED ──(exit / external close)──▶ EMPTY
//! ```
//!
//! The controller only computes decisions. The runner submits the order and
//! calls [`GridController::record_fill`] on success, so a rejected order
//! leaves both the ledger and `last_grid_price` untouched.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::config::StrategyConfig;
use crate::engine::ledger::PositionLedger;

// ─── Cycle State ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleState {
    /// Reference price for the next add trigger. `None` while EMPTY.
    pub last_grid_price: Option<Decimal>,
    /// Highest price seen since the alert window was last reset.
    pub peak_price:      Decimal,
    /// At most one drawdown alert per peak.
    pub alert_sent:      bool,
    pub trading_enabled: bool,
}

impl Default for CycleState {
    fn default() -> Self {
        Self {
            last_grid_price: None,
            peak_price:      Decimal::ZERO,
            alert_sent:      false,
            trading_enabled: true,
        }
    }
}

impl CycleState {
    /// Back to EMPTY after a full close. `trading_enabled` is an operator
    /// setting and survives.
    pub fn reset_cycle(&mut self) {
        self.last_grid_price = None;
        self.peak_price = Decimal::ZERO;
        self.alert_sent = false;
    }
}

// ─── Decision ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum GridDecision {
    /// Ledger is empty: open the cycle.
    Open { size: Decimal },
    /// Price reached the trigger: add the next level.
    Add { size: Decimal, level: usize, trigger_price: Decimal },
    /// Nothing to do this tick.
    Hold { trigger_price: Option<Decimal> },
}

// ─── Controller ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct GridController {
    base_size:       Decimal,
    multiplier:      Decimal,
    grid_pct_fine:   Decimal,
    grid_pct_coarse: Decimal,
    tier_boundary:   usize,
}

impl GridController {
    pub fn new(config: &StrategyConfig) -> Self {
        Self {
            base_size:       config.base_size,
            multiplier:      config.multiplier,
            grid_pct_fine:   config.grid_pct_fine,
            grid_pct_coarse: config.grid_pct_coarse,
            tier_boundary:   config.tier_boundary,
        }
    }

    /// Spacing for the next add, coarser once `entry_count` reaches the tier
    /// boundary.
    pub fn grid_pct(&self, entry_count: usize) -> Decimal {
        if entry_count < self.tier_boundary {
            self.grid_pct_fine
        } else {
            self.grid_pct_coarse
        }
    }

    pub fn trigger_price(&self, last_grid_price: Decimal, entry_count: usize) -> Decimal {
        last_grid_price * (Decimal::ONE - self.grid_pct(entry_count))
    }

    /// `base_size × multiplier^entry_count`, unquantized.
    pub fn size_for_level(&self, entry_count: usize) -> Decimal {
        (0..entry_count).fold(self.base_size, |size, _| size * self.multiplier)
    }

    pub fn next_trigger(&self, ledger: &PositionLedger, cycle: &CycleState) -> Option<Decimal> {
        if ledger.is_empty() {
            return None;
        }
        cycle
            .last_grid_price
            .map(|p| self.trigger_price(p, ledger.entry_count()))
    }

    pub fn evaluate(
        &self,
        ledger: &PositionLedger,
        cycle: &CycleState,
        current_price: Decimal,
    ) -> GridDecision {
        if ledger.is_empty() {
            return GridDecision::Open { size: self.base_size };
        }

        let Some(trigger_price) = self.next_trigger(ledger, cycle) else {
            return GridDecision::Hold { trigger_price: None };
        };

        if current_price <= trigger_price {
            let level = ledger.entry_count();
            GridDecision::Add {
                size: self.size_for_level(level),
                level,
                trigger_price,
            }
        } else {
            GridDecision::Hold { trigger_price: Some(trigger_price) }
        }
    }

    /// Records a successful fill. `last_grid_price` ratchets to the fill
    /// price, not to the trigger.
    pub fn record_fill(
        &self,
        ledger: &mut PositionLedger,
        cycle: &mut CycleState,
        fill_price: Decimal,
        size: Decimal,
    ) -> bool {
        if !ledger.add_entry(fill_price, size) {
            return false;
        }
        cycle.last_grid_price = Some(fill_price);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MarketInfo;
    use rust_decimal_macros::dec;

    fn config() -> StrategyConfig {
        StrategyConfig {
            base_size:       dec!(0.0005),
            multiplier:      dec!(1.33),
            grid_pct_fine:   dec!(0.0005),
            grid_pct_coarse: dec!(0.001),
            tier_boundary:   12,
            ..StrategyConfig::default()
        }
    }

    fn market() -> MarketInfo {
        MarketInfo {
            symbol:     "ETH/USDT:USDT".into(),
            size_step:  dec!(0.000001),
            price_tick: dec!(0.01),
            min_size:   dec!(0.0001),
        }
    }

    fn armed_at(price: Decimal) -> (GridController, PositionLedger, CycleState) {
        let grid = GridController::new(&config());
        let mut ledger = PositionLedger::new(&market());
        let mut cycle = CycleState::default();
        assert!(grid.record_fill(&mut ledger, &mut cycle, price, dec!(0.0005)));
        (grid, ledger, cycle)
    }

    #[test]
    fn empty_ledger_opens_with_base_size() {
        let grid = GridController::new(&config());
        let ledger = PositionLedger::new(&market());
        let decision = grid.evaluate(&ledger, &CycleState::default(), dec!(2000));
        assert_eq!(decision, GridDecision::Open { size: dec!(0.0005) });
    }

    #[test]
    fn no_add_above_trigger() {
        let (grid, ledger, cycle) = armed_at(dec!(2000));
        let decision = grid.evaluate(&ledger, &cycle, dec!(1999.01));
        assert_eq!(decision, GridDecision::Hold { trigger_price: Some(dec!(1999.0)) });
    }

    #[test]
    fn add_exactly_at_trigger() {
        let (grid, ledger, cycle) = armed_at(dec!(2000));
        match grid.evaluate(&ledger, &cycle, dec!(1999.0)) {
            GridDecision::Add { size, level, trigger_price } => {
                assert_eq!(size, dec!(0.0006650));
                assert_eq!(level, 1);
                assert_eq!(trigger_price, dec!(1999.0));
            }
            other => panic!("expected add, got {other:?}"),
        }
    }

    #[test]
    fn sizing_is_geometric() {
        let grid = GridController::new(&config());
        assert_eq!(grid.size_for_level(0), dec!(0.0005));
        assert_eq!(grid.size_for_level(1), dec!(0.000665));
        assert_eq!(grid.size_for_level(2), dec!(0.00088445));
    }

    #[test]
    fn spacing_widens_at_tier_boundary() {
        let grid = GridController::new(&config());
        assert_eq!(grid.grid_pct(11), dec!(0.0005));
        assert_eq!(grid.grid_pct(12), dec!(0.001));
        assert_eq!(grid.trigger_price(dec!(2000), 12), dec!(1998));
    }

    #[test]
    fn fill_ratchets_reference_to_fill_price() {
        let (grid, mut ledger, mut cycle) = armed_at(dec!(2000));
        assert!(grid.record_fill(&mut ledger, &mut cycle, dec!(1998.5), dec!(0.000665)));
        assert_eq!(cycle.last_grid_price, Some(dec!(1998.5)));
        assert_eq!(ledger.entry_count(), 2);
    }

    #[test]
    fn rejected_fill_leaves_state_untouched() {
        let (grid, mut ledger, mut cycle) = armed_at(dec!(2000));
        let before = cycle.clone();
        assert!(!grid.record_fill(&mut ledger, &mut cycle, dec!(1990), dec!(0.00000001)));
        assert_eq!(cycle, before);
        assert_eq!(ledger.entry_count(), 1);
    }

    #[test]
    fn reset_keeps_operator_switch() {
        let mut cycle = CycleState {
            last_grid_price: Some(dec!(1)),
            peak_price:      dec!(2),
            alert_sent:      true,
            trading_enabled: false,
        };
        cycle.reset_cycle();
        assert_eq!(cycle.last_grid_price, None);
        assert_eq!(cycle.peak_price, Decimal::ZERO);
        assert!(!cycle.alert_sent);
        assert!(!cycle.trading_enabled);
    }
}
