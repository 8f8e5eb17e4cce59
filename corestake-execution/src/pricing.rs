use crate::error::{EngineError, OrOverflow, Result};
use corestake_oracles::PriceOracle;
use corestake_types::fixed::to_usd;
use corestake_types::{AssetKind, EngineConfig, EngineState};

/// Oracle reads with the engine's freshness policy applied.
pub struct Pricer<'a> {
    oracle: &'a dyn PriceOracle,
    now: u64,
    staleness_check: bool,
}

impl<'a> Pricer<'a> {
    pub fn new(oracle: &'a dyn PriceOracle, config: &EngineConfig, now: u64) -> Self {
        Self {
            oracle,
            now,
            staleness_check: config.staleness_check,
        }
    }

    /// USD per whole token, 18 decimals.
    pub fn price(&self, asset: AssetKind) -> Result<u128> {
        let symbol = asset.price_symbol();
        let quote = self.oracle.get_price(symbol, self.now)?;
        if quote.price == 0 {
            return Err(EngineError::PriceUnavailable(symbol.to_string()));
        }
        if self.staleness_check && !quote.is_fresh {
            return Err(EngineError::PriceStale {
                symbol: symbol.to_string(),
                updated_at: quote.updated_at,
            });
        }
        Ok(quote.price)
    }

    /// USD value of `amount` base units. Zero amounts are not priced.
    pub fn usd(&self, asset: AssetKind, amount: u128) -> Result<u128> {
        if amount == 0 {
            return Ok(0);
        }
        to_usd(amount, asset.decimals(), self.price(asset)?).or_overflow()
    }

    /// Marked-to-market value of everything held for share holders.
    pub fn pool_value(&self, state: &EngineState) -> Result<u128> {
        let core = self.usd(AssetKind::Core, state.holdings(AssetKind::Core))?;
        let btc = self.usd(AssetKind::Btc, state.holdings(AssetKind::Btc))?;
        core.checked_add(btc).or_overflow()
    }
}
