//! Price sources consumed by the engine.
//!
//! Prices are USD per whole token in 18-decimal fixed point. The engine
//! only sees the [`PriceOracle`] trait. A node serves prices from
//! [`price_feed::OracleManager`], which aggregates reporter quotes;
//! [`StaticOracle`] serves fixed quotes to tests and simulations.

pub mod price_feed;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub use price_feed::{OracleManager, PriceFeed, PriceReport};

/// Quotes older than this are reported as not fresh.
pub const DEFAULT_MAX_AGE_SECS: u64 = 3600;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceQuote {
    pub price: u128,
    pub updated_at: u64,
    pub is_fresh: bool,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("price unavailable for {0}")]
    PriceUnavailable(String),
    #[error("stale price for {symbol}: last update at {updated_at}")]
    PriceStale { symbol: String, updated_at: u64 },
    #[error("insufficient price sources for {symbol}: {have} of {need}")]
    InsufficientSources { symbol: String, have: usize, need: usize },
    #[error("reporter {0} is not authorized")]
    UnknownReporter(String),
    #[error("price must be greater than 0")]
    InvalidPrice,
}

pub trait PriceOracle: Send + Sync {
    /// Latest quote for `symbol` (e.g. `"CORE-USD"`) as seen at `now`.
    ///
    /// A quote past its freshness window is still returned with
    /// `is_fresh == false`; callers decide whether to accept it.
    fn get_price(&self, symbol: &str, now: u64) -> Result<PriceQuote, OracleError>;
}

/// Fixed quotes set by the host.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StaticOracle {
    prices: BTreeMap<String, (u128, u64)>,
    max_age: u64,
}

impl Default for StaticOracle {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_AGE_SECS)
    }
}

impl StaticOracle {
    pub fn new(max_age: u64) -> Self {
        Self {
            prices: BTreeMap::new(),
            max_age,
        }
    }

    pub fn set_price(&mut self, symbol: &str, price: u128, updated_at: u64) {
        self.prices.insert(symbol.to_string(), (price, updated_at));
    }

    pub fn with_price(mut self, symbol: &str, price: u128, updated_at: u64) -> Self {
        self.set_price(symbol, price, updated_at);
        self
    }

    pub fn remove(&mut self, symbol: &str) {
        self.prices.remove(symbol);
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.prices.keys().map(String::as_str)
    }
}

impl PriceOracle for StaticOracle {
    fn get_price(&self, symbol: &str, now: u64) -> Result<PriceQuote, OracleError> {
        let (price, updated_at) = self
            .prices
            .get(symbol)
            .copied()
            .ok_or_else(|| OracleError::PriceUnavailable(symbol.to_string()))?;
        Ok(PriceQuote {
            price,
            updated_at,
            is_fresh: now.saturating_sub(updated_at) <= self.max_age,
        })
    }
}
