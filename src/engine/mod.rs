//! Strategy engine: pure position/grid logic plus the loop that drives it.

pub mod drawdown;
pub mod exit;
pub mod grid;
pub mod ledger;
pub mod reconcile;
pub mod runner;

pub use runner::StrategyLoop;
