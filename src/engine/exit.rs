//! # engine::exit
//!
//! **ExitEvaluator** — closes the whole position once net P&L covers
//! `profit_per_grid × entry_count`. The boundary is inclusive.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::config::StrategyConfig;
use crate::engine::grid::CycleState;
use crate::engine::ledger::PositionLedger;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExitSignal {
    ExitAll { net_pnl: Decimal, required: Decimal },
    Hold { net_pnl: Decimal, required: Decimal },
}

/// Summary of a closed cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClosedCycle {
    pub size:          Decimal,
    pub levels:        usize,
    pub average_price: Decimal,
    pub close_price:   Decimal,
    pub realized_pnl:  Decimal,
}

#[derive(Debug, Clone)]
pub struct ExitEvaluator {
    profit_per_grid: Decimal,
    fee_rate:        Decimal,
}

impl ExitEvaluator {
    pub fn new(config: &StrategyConfig) -> Self {
        Self {
            profit_per_grid: config.profit_per_grid,
            fee_rate:        config.fee_rate,
        }
    }

    pub fn fee_rate(&self) -> Decimal {
        self.fee_rate
    }

    pub fn required_profit(&self, entry_count: usize) -> Decimal {
        self.profit_per_grid * Decimal::from(entry_count)
    }

    pub fn evaluate(&self, ledger: &PositionLedger, current_price: Decimal) -> ExitSignal {
        let required = self.required_profit(ledger.entry_count());
        if ledger.is_empty() {
            return ExitSignal::Hold { net_pnl: Decimal::ZERO, required };
        }

        let net_pnl = ledger.net_pnl(current_price, self.fee_rate);
        if net_pnl >= required {
            ExitSignal::ExitAll { net_pnl, required }
        } else {
            ExitSignal::Hold { net_pnl, required }
        }
    }

    /// Books the close at `close_price`, then clears the ledger and returns
    /// the cycle to EMPTY. Call only after the close order succeeded.
    pub fn settle(
        &self,
        ledger: &mut PositionLedger,
        cycle: &mut CycleState,
        close_price: Decimal,
    ) -> ClosedCycle {
        let closed = ClosedCycle {
            size:          ledger.total_size(),
            levels:        ledger.entry_count(),
            average_price: ledger.average_price(),
            close_price,
            realized_pnl:  ledger.net_pnl(close_price, self.fee_rate),
        };
        ledger.clear();
        cycle.reset_cycle();
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MarketInfo;
    use rust_decimal_macros::dec;

    fn evaluator(profit_per_grid: Decimal) -> ExitEvaluator {
        ExitEvaluator::new(&StrategyConfig {
            profit_per_grid,
            fee_rate: dec!(0.001),
            ..StrategyConfig::default()
        })
    }

    fn ledger() -> PositionLedger {
        let mut ledger = PositionLedger::new(&MarketInfo {
            symbol:     "ETH/USDT:USDT".into(),
            size_step:  dec!(0.000001),
            price_tick: dec!(0.01),
            min_size:   dec!(0.0001),
        });
        ledger.add_entry(dec!(2000), dec!(0.0005));
        ledger.add_entry(dec!(1999), dec!(0.000665));
        ledger
    }

    #[test]
    fn required_profit_scales_with_levels() {
        let exit = evaluator(dec!(0.1));
        assert_eq!(exit.required_profit(0), Decimal::ZERO);
        assert_eq!(exit.required_profit(3), dec!(0.3));
    }

    #[test]
    fn exits_when_net_equals_required() {
        // net at 2010 is 0.00997335 over 2 levels
        let exit = evaluator(dec!(0.004986675));
        assert_eq!(
            exit.evaluate(&ledger(), dec!(2010)),
            ExitSignal::ExitAll { net_pnl: dec!(0.00997335), required: dec!(0.00997335) }
        );
    }

    #[test]
    fn holds_just_below_required() {
        let exit = evaluator(dec!(0.004986676));
        assert!(matches!(exit.evaluate(&ledger(), dec!(2010)), ExitSignal::Hold { .. }));
    }

    #[test]
    fn empty_ledger_never_exits() {
        let exit = evaluator(Decimal::ZERO);
        let empty = PositionLedger::new(&MarketInfo::conservative_default("X"));
        assert!(matches!(exit.evaluate(&empty, dec!(1)), ExitSignal::Hold { .. }));
    }

    #[test]
    fn settle_clears_and_resets() {
        let exit = evaluator(dec!(0.001));
        let mut ledger = ledger();
        let mut cycle = CycleState {
            last_grid_price: Some(dec!(1999)),
            peak_price:      dec!(2010),
            alert_sent:      true,
            trading_enabled: true,
        };

        let closed = exit.settle(&mut ledger, &mut cycle, dec!(2010));

        assert_eq!(closed.size, dec!(0.001165));
        assert_eq!(closed.levels, 2);
        assert_eq!(closed.realized_pnl, dec!(0.00997335));
        assert!(ledger.is_empty());
        assert_eq!(cycle.last_grid_price, None);
        assert!(!cycle.alert_sent);
    }
}
