//! # engine::ledger
//!
//! **PositionLedger** — the entries of the current cycle, in grid order.
//!
//! Entries are immutable once appended; only reconciliation may resize the
//! newest one. All aggregates are recomputed from the entries so they can
//! never drift from them.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::MarketInfo;

/// One fill added to the current cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub price: Decimal,
    pub size:  Decimal,
}

impl Entry {
    #[inline]
    pub fn cost(&self) -> Decimal {
        self.price * self.size
    }
}

/// Valuation of the ledger at a given price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pnl {
    pub market_value: Decimal,
    pub gross:        Decimal,
    pub fee:          Decimal,
    pub net:          Decimal,
}

#[derive(Debug, Clone)]
pub struct PositionLedger {
    entries:   Vec<Entry>,
    size_step: Decimal,
    min_size:  Decimal,
}

impl PositionLedger {
    pub fn new(market: &MarketInfo) -> Self {
        Self {
            entries:   Vec::new(),
            size_step: market.size_step,
            min_size:  market.min_size,
        }
    }

    /// Appends an entry after quantizing `size` to the lot step.
    ///
    /// Returns `false` (and changes nothing) when the quantized size is zero
    /// or below the minimum tradable size.
    pub fn add_entry(&mut self, price: Decimal, size: Decimal) -> bool {
        let size = self.quantize(size);
        if size <= Decimal::ZERO || size < self.min_size {
            return false;
        }
        self.entries.push(Entry { price, size });
        true
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    #[inline]
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_size(&self) -> Decimal {
        self.entries.iter().map(|e| e.size).sum()
    }

    pub fn total_cost(&self) -> Decimal {
        self.entries.iter().map(Entry::cost).sum()
    }

    /// Zero when the ledger is empty.
    pub fn average_price(&self) -> Decimal {
        let size = self.total_size();
        if size.is_zero() {
            return Decimal::ZERO;
        }
        self.total_cost() / size
    }

    pub fn market_value(&self, current_price: Decimal) -> Decimal {
        self.total_size() * current_price
    }

    /// `gross = value - cost`, `fee = value * fee_rate` (one-way),
    /// `net = gross - fee`.
    pub fn pnl(&self, current_price: Decimal, fee_rate: Decimal) -> Pnl {
        let market_value = self.market_value(current_price);
        let gross = market_value - self.total_cost();
        let fee = market_value * fee_rate;
        Pnl { market_value, gross, fee, net: gross - fee }
    }

    pub fn net_pnl(&self, current_price: Decimal, fee_rate: Decimal) -> Decimal {
        self.pnl(current_price, fee_rate).net
    }

    // ── Reconciliation hooks ─────────────────────────────────────────────────

    /// Replaces the whole ledger with a single entry, bypassing the size floor.
    pub(super) fn reset_to(&mut self, entry: Entry) {
        self.entries.clear();
        self.entries.push(entry);
    }

    pub(super) fn last_mut(&mut self) -> Option<&mut Entry> {
        self.entries.last_mut()
    }

    pub(super) fn pop(&mut self) -> Option<Entry> {
        self.entries.pop()
    }

    fn quantize(&self, size: Decimal) -> Decimal {
        if self.size_step <= Decimal::ZERO {
            return size;
        }
        (size / self.size_step).trunc() * self.size_step
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn market() -> MarketInfo {
        MarketInfo {
            symbol:     "ETH/USDT:USDT".into(),
            size_step:  dec!(0.000001),
            price_tick: dec!(0.01),
            min_size:   dec!(0.0001),
        }
    }

    fn two_level_ledger() -> PositionLedger {
        let mut ledger = PositionLedger::new(&market());
        assert!(ledger.add_entry(dec!(2000), dec!(0.0005)));
        assert!(ledger.add_entry(dec!(1999), dec!(0.000665)));
        ledger
    }

    #[test]
    fn size_exactly_at_minimum_is_accepted() {
        let mut ledger = PositionLedger::new(&market());
        // exchange minimum is itself tradable; orders are clamped up to it
        assert!(ledger.add_entry(dec!(2000), dec!(0.0001)));
        assert!(!ledger.add_entry(dec!(2000), dec!(0.0000999)));
        assert!(!ledger.add_entry(dec!(2000), dec!(0.0000004)));
        assert_eq!(ledger.entry_count(), 1);
    }

    #[test]
    fn empty_ledger_aggregates_are_zero() {
        let ledger = PositionLedger::new(&market());
        assert!(ledger.is_empty());
        assert_eq!(ledger.total_size(), Decimal::ZERO);
        assert_eq!(ledger.total_cost(), Decimal::ZERO);
        assert_eq!(ledger.average_price(), Decimal::ZERO);
        assert_eq!(ledger.net_pnl(dec!(2000), dec!(0.001)), Decimal::ZERO);
    }

    #[test]
    fn two_level_pnl_is_exact() {
        let ledger = two_level_ledger();
        assert_eq!(ledger.total_cost(), dec!(2.329335));
        assert_eq!(ledger.total_size(), dec!(0.001165));

        let pnl = ledger.pnl(dec!(2010), dec!(0.001));
        assert_eq!(pnl.market_value, dec!(2.34165));
        assert_eq!(pnl.gross, dec!(0.012315));
        assert_eq!(pnl.fee, dec!(0.00234165));
        assert_eq!(pnl.net, dec!(0.00997335));
    }

    #[test]
    fn average_is_cost_over_size() {
        let ledger = two_level_ledger();
        assert_eq!(ledger.average_price(), ledger.total_cost() / ledger.total_size());
    }

    #[test]
    fn size_is_quantized_on_add() {
        let mut ledger = PositionLedger::new(&market());
        assert!(ledger.add_entry(dec!(2000), dec!(0.00066549)));
        assert_eq!(ledger.entries()[0].size, dec!(0.000665));
    }

    #[test]
    fn dust_add_is_a_no_op() {
        let mut ledger = PositionLedger::new(&market());
        assert!(!ledger.add_entry(dec!(2000), dec!(0.0000004)));
        assert!(!ledger.add_entry(dec!(2000), dec!(0.00005)));
        assert!(!ledger.add_entry(dec!(2000), Decimal::ZERO));
        assert!(ledger.is_empty());
    }

    #[test]
    fn clear_empties_everything() {
        let mut ledger = two_level_ledger();
        ledger.clear();
        assert_eq!(ledger.entry_count(), 0);
        assert_eq!(ledger.total_size(), Decimal::ZERO);
    }

    proptest! {
        #[test]
        fn cost_is_order_independent(
            fills in prop::collection::vec((1_000u32..5_000, 100u32..10_000), 1..20),
            seed in any::<u64>(),
        ) {
            let fills: Vec<(Decimal, Decimal)> = fills
                .into_iter()
                .map(|(p, s)| (Decimal::from(p), Decimal::new(s as i64, 6)))
                .collect();

            let mut forward = PositionLedger::new(&market());
            for (p, s) in &fills {
                forward.add_entry(*p, *s);
            }

            let mut shuffled = fills.clone();
            let len = shuffled.len();
            shuffled.rotate_left((seed as usize) % len);
            shuffled.reverse();

            let mut backward = PositionLedger::new(&market());
            for (p, s) in &shuffled {
                backward.add_entry(*p, *s);
            }

            prop_assert_eq!(forward.total_cost(), backward.total_cost());
            prop_assert_eq!(forward.total_size(), backward.total_size());
            prop_assert_eq!(
                forward.average_price(),
                forward.total_cost() / forward.total_size()
            );
        }
    }
}
