//! # config — settings read from environment variables
//!
//! Every key has a default so the bot starts in paper mode with nothing set.
//! Malformed values are a startup error.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, ensure, Context};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ─── Strategy ─────────────────────────────────────────────────────────────────

/// Grid, exit, alert and safety parameters.
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    pub symbol:             String,
    /// Size of the opening entry.
    pub base_size:          Decimal,
    /// Geometric growth per grid level.
    pub multiplier:         Decimal,
    /// Spacing while `entry_count < tier_boundary`.
    pub grid_pct_fine:      Decimal,
    /// Spacing from `tier_boundary` onwards.
    pub grid_pct_coarse:    Decimal,
    pub tier_boundary:      usize,
    /// Required net profit per held level before exiting.
    pub profit_per_grid:    Decimal,
    pub fee_rate:           Decimal,
    pub max_entries:        usize,
    /// Cap on total committed cost (quote currency).
    pub max_notional:       Decimal,
    pub drawdown_lower:     Decimal,
    pub drawdown_upper:     Decimal,
    pub reconcile_epsilon:  Decimal,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            symbol:            "XAUT/USDT:USDT".to_string(),
            base_size:         dec!(0.002),
            multiplier:        dec!(1.365),
            grid_pct_fine:     dec!(0.003),
            grid_pct_coarse:   dec!(0.006),
            tier_boundary:     12,
            profit_per_grid:   dec!(0.1),
            fee_rate:          dec!(0.001),
            max_entries:       15,
            max_notional:      dec!(5000),
            drawdown_lower:    dec!(0.010),
            drawdown_upper:    dec!(0.013),
            reconcile_epsilon: dec!(0.000001),
        }
    }
}

impl StrategyConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let d = Self::default();
        let cfg = Self {
            symbol:            env_or("SYMBOL", &d.symbol),
            base_size:         env_parse("BASE_SIZE", d.base_size)?,
            multiplier:        env_parse("MULTIPLIER", d.multiplier)?,
            grid_pct_fine:     env_parse("GRID_PCT_FINE", d.grid_pct_fine)?,
            grid_pct_coarse:   env_parse("GRID_PCT_COARSE", d.grid_pct_coarse)?,
            tier_boundary:     env_parse("GRID_TIER_BOUNDARY", d.tier_boundary)?,
            profit_per_grid:   env_parse("PROFIT_PER_GRID", d.profit_per_grid)?,
            fee_rate:          env_parse("FEE_RATE", d.fee_rate)?,
            max_entries:       env_parse("MAX_ENTRIES", d.max_entries)?,
            max_notional:      env_parse("MAX_NOTIONAL", d.max_notional)?,
            drawdown_lower:    env_parse("DRAWDOWN_ALERT_LOWER", d.drawdown_lower)?,
            drawdown_upper:    env_parse("DRAWDOWN_ALERT_UPPER", d.drawdown_upper)?,
            reconcile_epsilon: env_parse("RECONCILE_EPSILON", d.reconcile_epsilon)?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.base_size > Decimal::ZERO, "BASE_SIZE must be > 0");
        ensure!(self.multiplier >= Decimal::ONE, "MULTIPLIER must be >= 1");
        ensure!(
            self.grid_pct_fine > Decimal::ZERO && self.grid_pct_fine < Decimal::ONE,
            "GRID_PCT_FINE must be in (0, 1)"
        );
        ensure!(
            self.grid_pct_coarse > Decimal::ZERO && self.grid_pct_coarse < Decimal::ONE,
            "GRID_PCT_COARSE must be in (0, 1)"
        );
        ensure!(self.max_entries > 0, "MAX_ENTRIES must be > 0");
        ensure!(self.max_notional > Decimal::ZERO, "MAX_NOTIONAL must be > 0");
        ensure!(
            self.drawdown_lower < self.drawdown_upper,
            "DRAWDOWN_ALERT_LOWER must be below DRAWDOWN_ALERT_UPPER"
        );
        ensure!(self.fee_rate >= Decimal::ZERO, "FEE_RATE must be >= 0");
        Ok(())
    }
}

// ─── Exchange ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum ExchangeMode {
    /// Simulated fills, no real orders.
    Paper,
    /// JSON bridge in front of the real venue.
    Rest,
}

#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    pub mode:              ExchangeMode,
    /// Base URL of the exchange bridge. In paper mode, when set, quotes are
    /// read from it while fills stay simulated.
    pub base_url:          Option<String>,
    pub api_key:           Option<String>,
    pub api_secret:        Option<String>,
    pub paper_start_price: Decimal,
}

impl ExchangeConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let mode = match env_or("EXCHANGE_MODE", "paper").to_lowercase().as_str() {
            "paper" => ExchangeMode::Paper,
            "rest" => ExchangeMode::Rest,
            other => bail!("Unknown EXCHANGE_MODE: '{other}'. Use 'paper' or 'rest'"),
        };
        let base_url = env_opt("EXCHANGE_BASE_URL");
        if mode == ExchangeMode::Rest && base_url.is_none() {
            bail!("EXCHANGE_BASE_URL is required when EXCHANGE_MODE=rest");
        }

        Ok(Self {
            mode,
            base_url,
            api_key:           env_opt("EXCHANGE_API_KEY"),
            api_secret:        env_opt("EXCHANGE_API_SECRET"),
            paper_start_price: env_parse("PAPER_START_PRICE", dec!(2000))?,
        })
    }
}

// ─── Notifier ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct TelegramConfig {
    pub token:   Option<String>,
    pub chat_id: Option<String>,
}

impl TelegramConfig {
    pub fn from_env() -> Self {
        Self {
            token:   env_opt("TELEGRAM_TOKEN"),
            chat_id: env_opt("TELEGRAM_CHAT_ID"),
        }
    }
}

// ─── Loop ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub poll_interval:        Duration,
    pub backoff_max:          Duration,
    /// Poll funding every N cycles (0 = never).
    pub funding_every_cycles: u64,
    pub trade_log_len:        usize,
    pub history_len:          usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            poll_interval:        Duration::from_secs(10),
            backoff_max:          Duration::from_secs(120),
            funding_every_cycles: 30,
            trade_log_len:        10,
            history_len:          300,
        }
    }
}

impl LoopConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let d = Self::default();
        let poll: u64 = env_parse("POLL_INTERVAL_SECS", d.poll_interval.as_secs())?;
        let backoff: u64 = env_parse("BACKOFF_MAX_SECS", d.backoff_max.as_secs())?;
        ensure!(poll > 0, "POLL_INTERVAL_SECS must be > 0");

        Ok(Self {
            poll_interval:        Duration::from_secs(poll),
            backoff_max:          Duration::from_secs(backoff.max(poll)),
            funding_every_cycles: env_parse("FUNDING_EVERY_CYCLES", d.funding_every_cycles)?,
            trade_log_len:        env_parse("TRADE_LOG_LEN", d.trade_log_len)?,
            history_len:          env_parse("HISTORY_LEN", d.history_len)?,
        })
    }
}

// ─── Top Level ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Config {
    pub strategy:  StrategyConfig,
    pub exchange:  ExchangeConfig,
    pub telegram:  TelegramConfig,
    pub run:       LoopConfig,
    pub bind_addr: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            strategy:  StrategyConfig::from_env().context("invalid strategy settings")?,
            exchange:  ExchangeConfig::from_env().context("invalid exchange settings")?,
            telegram:  TelegramConfig::from_env(),
            run:       LoopConfig::from_env().context("invalid loop settings")?,
            bind_addr: env_or("BIND_ADDR", "0.0.0.0:3000"),
        })
    }
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_opt(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{key}={raw:?} is not valid: {e}")),
    }
}
