//! Reporter-driven price feeds.
//!
//! Each authorized reporter posts its latest quote per symbol. A quote is
//! aggregated from the latest report of every reporter: median, then MAD
//! outlier rejection, then the mean of the survivors.

use crate::{OracleError, PriceOracle, PriceQuote, DEFAULT_MAX_AGE_SECS};
use corestake_types::AccountId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

pub const MIN_SOURCES: usize = 3;

/// Reports further than this many MADs from the median are discarded.
const MAD_MULTIPLIER: u128 = 3;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceReport {
    pub reporter: AccountId,
    pub price: u128,
    pub timestamp: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PriceFeed {
    symbol: String,
    reports: BTreeMap<AccountId, PriceReport>,
    min_sources: usize,
    max_age: u64,
}

impl PriceFeed {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            reports: BTreeMap::new(),
            min_sources: MIN_SOURCES,
            max_age: DEFAULT_MAX_AGE_SECS,
        }
    }

    pub fn with_limits(mut self, min_sources: usize, max_age: u64) -> Self {
        self.min_sources = min_sources.max(1);
        self.max_age = max_age;
        self
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn report_count(&self) -> usize {
        self.reports.len()
    }

    /// Replaces the reporter's previous quote. Older timestamps are ignored.
    pub fn submit(&mut self, report: PriceReport) -> Result<(), OracleError> {
        if report.price == 0 {
            return Err(OracleError::InvalidPrice);
        }
        match self.reports.get(&report.reporter) {
            Some(existing) if existing.timestamp > report.timestamp => {
                debug!(symbol = %self.symbol, reporter = %report.reporter, "ignoring out-of-order report");
            }
            _ => {
                self.reports.insert(report.reporter, report);
            }
        }
        Ok(())
    }

    pub fn remove_reporter(&mut self, reporter: &AccountId) {
        self.reports.remove(reporter);
    }

    /// Aggregates fresh reports when enough exist; otherwise falls back to
    /// every report and flags the quote as stale.
    pub fn aggregate(&self, now: u64) -> Result<PriceQuote, OracleError> {
        if self.reports.len() < self.min_sources {
            return Err(OracleError::InsufficientSources {
                symbol: self.symbol.clone(),
                have: self.reports.len(),
                need: self.min_sources,
            });
        }

        let fresh: Vec<&PriceReport> = self
            .reports
            .values()
            .filter(|r| now.saturating_sub(r.timestamp) <= self.max_age)
            .collect();
        let is_fresh = fresh.len() >= self.min_sources;
        let used: Vec<&PriceReport> = if is_fresh {
            fresh
        } else {
            warn!(symbol = %self.symbol, fresh = fresh.len(), "not enough fresh reports");
            self.reports.values().collect()
        };

        let prices: Vec<u128> = used.iter().map(|r| r.price).collect();
        let price = robust_mean(&prices).ok_or_else(|| OracleError::PriceUnavailable(self.symbol.clone()))?;
        let updated_at = used.iter().map(|r| r.timestamp).min().unwrap_or(0);

        Ok(PriceQuote {
            price,
            updated_at,
            is_fresh,
        })
    }
}

fn median(sorted: &[u128]) -> u128 {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        sorted[mid - 1] / 2 + sorted[mid] / 2 + (sorted[mid - 1] % 2 + sorted[mid] % 2) / 2
    } else {
        sorted[mid]
    }
}

/// Mean of the values within `MAD_MULTIPLIER` median absolute deviations
/// of the median.
fn robust_mean(prices: &[u128]) -> Option<u128> {
    if prices.is_empty() {
        return None;
    }
    let mut sorted = prices.to_vec();
    sorted.sort_unstable();
    let mid = median(&sorted);

    let mut deviations: Vec<u128> = sorted.iter().map(|p| p.abs_diff(mid)).collect();
    deviations.sort_unstable();
    let band = median(&deviations).saturating_mul(MAD_MULTIPLIER);

    let kept: Vec<u128> = sorted.into_iter().filter(|p| p.abs_diff(mid) <= band).collect();
    if kept.is_empty() {
        return Some(mid);
    }
    let count = kept.len() as u128;
    let (sum, rem) = kept
        .iter()
        .fold((0u128, 0u128), |(q, r), p| (q + p / count, r + p % count));
    Some(sum + rem / count)
}

/// Feeds per symbol plus the set of reporters allowed to post.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OracleManager {
    pub reporters: BTreeSet<AccountId>,
    feeds: BTreeMap<String, PriceFeed>,
    /// Limits for feeds opened by a first report.
    min_sources: usize,
    max_age: u64,
}

impl Default for OracleManager {
    fn default() -> Self {
        Self::new(MIN_SOURCES, DEFAULT_MAX_AGE_SECS)
    }
}

impl OracleManager {
    pub fn new(min_sources: usize, max_age: u64) -> Self {
        Self {
            reporters: BTreeSet::new(),
            feeds: BTreeMap::new(),
            min_sources,
            max_age,
        }
    }

    pub fn authorize(&mut self, reporter: AccountId) {
        self.reporters.insert(reporter);
    }

    pub fn revoke(&mut self, reporter: &AccountId) {
        self.reporters.remove(reporter);
        for feed in self.feeds.values_mut() {
            feed.remove_reporter(reporter);
        }
    }

    pub fn feed(&self, symbol: &str) -> Option<&PriceFeed> {
        self.feeds.get(symbol)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.feeds.keys().map(String::as_str)
    }

    pub fn submit(&mut self, symbol: &str, report: PriceReport) -> Result<(), OracleError> {
        if !self.reporters.contains(&report.reporter) {
            return Err(OracleError::UnknownReporter(report.reporter.to_string()));
        }
        let (min_sources, max_age) = (self.min_sources, self.max_age);
        let feed = self
            .feeds
            .entry(symbol.to_string())
            .or_insert_with(|| PriceFeed::new(symbol).with_limits(min_sources, max_age));
        feed.submit(report)?;
        debug!(symbol, reporter = %report.reporter, price = report.price, "price reported");
        Ok(())
    }
}

impl PriceOracle for OracleManager {
    fn get_price(&self, symbol: &str, now: u64) -> Result<PriceQuote, OracleError> {
        self.feeds
            .get(symbol)
            .ok_or_else(|| OracleError::PriceUnavailable(symbol.to_string()))?
            .aggregate(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(byte: u8, price: u128, timestamp: u64) -> PriceReport {
        PriceReport {
            reporter: AccountId::from_byte(byte),
            price,
            timestamp,
        }
    }

    #[test]
    fn outlier_is_rejected() {
        let mut feed = PriceFeed::new("BTC-USD");
        feed.submit(report(1, 100, 10)).unwrap();
        feed.submit(report(2, 102, 10)).unwrap();
        feed.submit(report(3, 98, 10)).unwrap();
        feed.submit(report(4, 1_000, 10)).unwrap();

        let quote = feed.aggregate(20).unwrap();
        assert_eq!(quote.price, 100);
        assert!(quote.is_fresh);
        assert_eq!(quote.updated_at, 10);
    }

    #[test]
    fn too_few_reporters() {
        let mut feed = PriceFeed::new("CORE-USD");
        feed.submit(report(1, 100, 0)).unwrap();
        assert!(matches!(
            feed.aggregate(0),
            Err(OracleError::InsufficientSources { have: 1, need: 3, .. })
        ));
    }

    #[test]
    fn stale_reports_flag_the_quote() {
        let mut feed = PriceFeed::new("CORE-USD").with_limits(3, 100);
        for b in 1..=3 {
            feed.submit(report(b, 50, 0)).unwrap();
        }
        assert!(feed.aggregate(100).unwrap().is_fresh);
        let late = feed.aggregate(101).unwrap();
        assert!(!late.is_fresh);
        assert_eq!(late.price, 50);
    }

    #[test]
    fn out_of_order_report_is_ignored() {
        let mut feed = PriceFeed::new("CORE-USD").with_limits(1, 100);
        feed.submit(report(1, 50, 10)).unwrap();
        feed.submit(report(1, 70, 5)).unwrap();
        assert_eq!(feed.aggregate(10).unwrap().price, 50);
        assert_eq!(feed.submit(report(1, 0, 11)), Err(OracleError::InvalidPrice));
    }

    #[test]
    fn manager_requires_authorized_reporters() {
        let mut manager = OracleManager::default();
        let err = manager.submit("CORE-USD", report(1, 10, 0)).unwrap_err();
        assert!(matches!(err, OracleError::UnknownReporter(_)));

        for b in 1..=3 {
            manager.authorize(AccountId::from_byte(b));
            manager.submit("CORE-USD", report(b, 10, 0)).unwrap();
        }
        assert_eq!(manager.get_price("CORE-USD", 0).unwrap().price, 10);
        assert!(matches!(
            manager.get_price("BTC-USD", 0),
            Err(OracleError::PriceUnavailable(_))
        ));

        manager.revoke(&AccountId::from_byte(3));
        assert!(manager.get_price("CORE-USD", 0).is_err());
        assert_eq!(manager.feed("CORE-USD").map(PriceFeed::report_count), Some(2));
    }

    #[test]
    fn new_feeds_take_manager_limits() {
        let mut manager = OracleManager::new(1, 60);
        manager.authorize(AccountId::from_byte(1));
        manager.submit("CORE-USD", report(1, 70, 100)).unwrap();

        assert_eq!(manager.symbols().collect::<Vec<_>>(), vec!["CORE-USD"]);
        assert!(manager.get_price("CORE-USD", 160).unwrap().is_fresh);
        assert!(!manager.get_price("CORE-USD", 161).unwrap().is_fresh);
    }
}
