//! # engine::drawdown
//!
//! **DrawdownAlertEngine** — one warning per drawdown episode.
//!
//! A new peak re-arms the alert. The alert fires the first time the
//! retracement from that peak lands inside `(lower, upper]` while a position
//! is held.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::config::StrategyConfig;
use crate::engine::grid::CycleState;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DrawdownAlert {
    pub peak_price: Decimal,
    pub price:      Decimal,
    pub drawdown:   Decimal,
}

#[derive(Debug, Clone)]
pub struct DrawdownAlertEngine {
    lower: Decimal,
    upper: Decimal,
}

impl DrawdownAlertEngine {
    pub fn new(config: &StrategyConfig) -> Self {
        Self::with_band(config.drawdown_lower, config.drawdown_upper)
    }

    pub fn with_band(lower: Decimal, upper: Decimal) -> Self {
        Self { lower, upper }
    }

    /// Fractional decline from `peak`. Zero when there is no peak yet.
    pub fn drawdown(peak: Decimal, price: Decimal) -> Decimal {
        if peak <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        (peak - price) / peak
    }

    pub fn in_band(&self, drawdown: Decimal) -> bool {
        drawdown > self.lower && drawdown <= self.upper
    }

    pub fn on_price(
        &self,
        cycle: &mut CycleState,
        price: Decimal,
        has_position: bool,
    ) -> Option<DrawdownAlert> {
        if price > cycle.peak_price {
            cycle.peak_price = price;
            cycle.alert_sent = false;
        }

        let drawdown = Self::drawdown(cycle.peak_price, price);
        if !self.in_band(drawdown) || cycle.alert_sent || !has_position {
            return None;
        }

        cycle.alert_sent = true;
        Some(DrawdownAlert { peak_price: cycle.peak_price, price, drawdown })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn engine() -> DrawdownAlertEngine {
        DrawdownAlertEngine::with_band(dec!(0.010), dec!(0.013))
    }

    fn run(prices: &[Decimal], has_position: bool) -> Vec<DrawdownAlert> {
        let engine = engine();
        let mut cycle = CycleState::default();
        prices
            .iter()
            .filter_map(|p| engine.on_price(&mut cycle, *p, has_position))
            .collect()
    }

    #[test]
    fn fires_once_per_decline() {
        let alerts = run(&[dec!(100), dec!(99), dec!(98.9), dec!(99.5), dec!(98.8)], true);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].price, dec!(98.9));
        assert_eq!(alerts[0].drawdown, dec!(0.011));
    }

    #[test]
    fn lower_bound_is_exclusive_upper_inclusive() {
        let engine = engine();
        assert!(!engine.in_band(dec!(0.010)));
        assert!(engine.in_band(dec!(0.013)));
        assert!(!engine.in_band(dec!(0.0131)));
    }

    #[test]
    fn new_peak_rearms() {
        let alerts = run(&[dec!(100), dec!(98.9), dec!(101), dec!(99.8)], true);
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[1].peak_price, dec!(101));
    }

    #[test]
    fn gap_past_band_does_not_fire() {
        assert!(run(&[dec!(100), dec!(98)], true).is_empty());
    }

    #[test]
    fn silent_without_position() {
        assert!(run(&[dec!(100), dec!(98.9)], false).is_empty());
    }

    #[test]
    fn zero_peak_has_no_drawdown() {
        assert_eq!(DrawdownAlertEngine::drawdown(Decimal::ZERO, dec!(5)), Decimal::ZERO);
    }
}
