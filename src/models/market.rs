//! # models::market
//!
//! Market-side snapshots pulled from the exchange every cycle, plus the
//! lot/tick metadata used to quantize everything we submit.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

// ─── Ticker ───────────────────────────────────────────────────────────────────

/// Last traded price for the configured symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    pub last:   Decimal,
    #[serde(default = "Utc::now")]
    pub time:   DateTime<Utc>,
}

// ─── Position ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Long,
    Short,
}

/// Exchange-reported position. Reconciliation treats it as the truth.
///
/// `size == 0` means flat. `entry_price` may be zero when the exchange does
/// not report one (some venues omit it right after a fill).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub size:        Decimal,
    pub side:        PositionSide,
    pub entry_price: Decimal,
}

impl PositionSnapshot {
    pub fn flat() -> Self {
        Self { size: Decimal::ZERO, side: PositionSide::Long, entry_price: Decimal::ZERO }
    }

    pub fn long(size: Decimal, entry_price: Decimal) -> Self {
        Self { size, side: PositionSide::Long, entry_price }
    }

    #[inline]
    pub fn is_flat(&self) -> bool {
        self.size <= Decimal::ZERO
    }
}

// ─── Funding ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingRate {
    pub symbol: String,
    pub rate:   Decimal,
}

// ─── Market Metadata ──────────────────────────────────────────────────────────

/// Lot and tick rules for the traded contract, loaded once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketInfo {
    pub symbol:     String,
    /// Size increment (lot step).
    pub size_step:  Decimal,
    /// Price increment (tick size).
    pub price_tick: Decimal,
    /// Smallest order size the exchange accepts.
    pub min_size:   Decimal,
}

impl MarketInfo {
    /// Used when the exchange does not expose market metadata yet.
    pub fn conservative_default(symbol: &str) -> Self {
        Self {
            symbol:     symbol.to_string(),
            size_step:  dec!(0.0001),
            price_tick: dec!(0.01),
            min_size:   dec!(0.0001),
        }
    }

    /// Rounds a size down to the lot step. Never rounds up, so an order is
    /// never larger than what the grid asked for.
    pub fn quantize_size(&self, size: Decimal) -> Decimal {
        quantize(size, self.size_step, RoundingStrategy::ToZero)
    }

    pub fn quantize_price(&self, price: Decimal) -> Decimal {
        quantize(price, self.price_tick, RoundingStrategy::MidpointNearestEven)
    }

    /// Quantized size raised to the exchange minimum.
    pub fn order_size(&self, size: Decimal) -> Decimal {
        self.quantize_size(size).max(self.min_size)
    }
}

fn quantize(value: Decimal, step: Decimal, strategy: RoundingStrategy) -> Decimal {
    if step <= Decimal::ZERO {
        return value;
    }
    ((value / step).round_dp_with_strategy(0, strategy) * step).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fine() -> MarketInfo {
        MarketInfo {
            symbol:     "ETH/USDT:USDT".into(),
            size_step:  dec!(0.000001),
            price_tick: dec!(0.01),
            min_size:   dec!(0.0001),
        }
    }

    #[test]
    fn size_is_truncated_to_step() {
        assert_eq!(fine().quantize_size(dec!(0.0006650)), dec!(0.000665));
        assert_eq!(fine().quantize_size(dec!(0.00088445)), dec!(0.000884));
    }

    #[test]
    fn price_rounds_to_tick() {
        assert_eq!(fine().quantize_price(dec!(1999.005)), dec!(1999.00));
        assert_eq!(fine().quantize_price(dec!(1999.016)), dec!(1999.02));
    }

    #[test]
    fn order_size_is_clamped_to_minimum() {
        assert_eq!(fine().order_size(dec!(0.00002)), dec!(0.0001));
        assert_eq!(fine().order_size(dec!(0.002)), dec!(0.002));
    }

    #[test]
    fn zero_step_leaves_value_untouched() {
        let mut info = fine();
        info.size_step = Decimal::ZERO;
        assert_eq!(info.quantize_size(dec!(0.123456789)), dec!(0.123456789));
    }
}
