//! Read-only views. None of these mutate state.

use crate::error::Result;
use crate::pricing::Pricer;
use crate::scorer;
use crate::shares::share_price;
use crate::tiers::classify;
use corestake_oracles::PriceOracle;
use corestake_types::{AssetKind, Classification, EngineState, PoolInfo, ValidatorReport};

pub use crate::planner::{optimal_distribution, should_rebalance};
pub use crate::withdrawals::{can_pay_instantly, queue_position, total_queued};

/// Pool totals at current prices. The tier is the one the basket's own
/// CORE:BTC mix would qualify for.
pub fn pool_info(state: &EngineState, oracle: &dyn PriceOracle, now: u64) -> Result<PoolInfo> {
    let pricer = Pricer::new(oracle, &state.config, now);
    let total_core = state.holdings(AssetKind::Core);
    let total_btc = state.holdings(AssetKind::Btc);
    let total_value = pricer.pool_value(state)?;
    let mix = classify(&pricer, &state.config, total_core, total_btc)?;

    Ok(PoolInfo {
        total_core,
        total_btc,
        total_shares: state.pool.total_shares,
        share_price: share_price(total_value, state.pool.total_shares)?,
        total_value,
        tier: mix.tier.filter(|_| mix.valid),
        core_liquid: state.pool.core_liquid,
        total_delegated: state.validators.total_delegated(),
    })
}

pub fn classify_deposit(
    state: &EngineState,
    oracle: &dyn PriceOracle,
    now: u64,
    core_amount: u128,
    btc_amount: u128,
) -> Result<Classification> {
    let pricer = Pricer::new(oracle, &state.config, now);
    classify(&pricer, &state.config, core_amount, btc_amount)
}

pub fn validator_reports(state: &EngineState) -> Vec<ValidatorReport> {
    state
        .validators
        .iter()
        .map(|v| scorer::report(v, &state.config))
        .collect()
}
