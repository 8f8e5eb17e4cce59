//! Dual-asset (CORE + BTC) deposit tiers.

use crate::auth::ensure_not_paused;
use crate::error::{EngineError, OrOverflow, Result};
use crate::pricing::Pricer;
use crate::shares::mint;
use crate::ExecutionContext;
use corestake_types::config::TierConfig;
use corestake_types::fixed::{mul_div, pow10, BTC_DECIMALS};
use corestake_types::{AccountId, AssetKind, Classification, EngineConfig, OperationOutcome};
use std::collections::BTreeMap;
use tracing::debug;

/// Whole CORE per whole BTC, 18 decimals. `None` without BTC.
pub fn core_btc_ratio(core_amount: u128, btc_amount: u128) -> Option<u128> {
    if btc_amount == 0 {
        return None;
    }
    // core / 1e18 per btc / 1e8, scaled by 1e18
    mul_div(core_amount, pow10(BTC_DECIMALS), btc_amount)
}

fn ratio_verdict(tier: &TierConfig, ratio: Option<u128>) -> Option<&'static str> {
    match ratio {
        Some(r) if r < tier.min_ratio => Some("insufficient CORE"),
        Some(r) if tier.max_ratio.is_some_and(|max| r > max) => Some("insufficient BTC"),
        None if tier.max_ratio.is_some() => Some("insufficient BTC"),
        _ => None,
    }
}

/// Highest tier whose USD minimum is met, then its ratio band.
///
/// A failing ratio reports the tier that was reached with `valid == false`
/// rather than falling back to a lower tier.
pub fn classify(pricer: &Pricer, config: &EngineConfig, core_amount: u128, btc_amount: u128) -> Result<Classification> {
    let core_usd = pricer.usd(AssetKind::Core, core_amount)?;
    let btc_usd = pricer.usd(AssetKind::Btc, btc_amount)?;
    let total_usd = core_usd.checked_add(btc_usd).or_overflow()?;
    let ratio = if btc_amount == 0 {
        None
    } else {
        Some(core_btc_ratio(core_amount, btc_amount).or_overflow()?)
    };

    let reached = config
        .tiers_descending()
        .into_iter()
        .find(|t| total_usd >= t.minimum_usd);

    let (tier, valid, reason) = match reached {
        None => (None, false, "insufficient USD value for any tier".to_string()),
        Some(t) => match ratio_verdict(t, ratio) {
            Some(reason) => (Some(t.tier), false, reason.to_string()),
            None => (Some(t.tier), true, String::new()),
        },
    };

    debug!(?tier, valid, total_usd, "dual deposit classified");
    Ok(Classification {
        tier,
        valid,
        reason,
        core_usd,
        btc_usd,
        total_usd,
        ratio,
    })
}

pub fn deposit_dual(
    ctx: &mut ExecutionContext,
    caller: &AccountId,
    core_amount: u128,
    btc_amount: u128,
) -> Result<OperationOutcome> {
    ensure_not_paused(ctx.state)?;
    if core_amount == 0 || btc_amount == 0 {
        return Err(EngineError::InvalidAmount);
    }
    let config = &ctx.state.config;
    if core_amount < config.min_core_deposit {
        return Err(EngineError::BelowMinimum {
            what: "CORE deposit",
            amount: core_amount,
            minimum: config.min_core_deposit,
        });
    }
    if btc_amount < config.min_btc_deposit {
        return Err(EngineError::BelowMinimum {
            what: "BTC deposit",
            amount: btc_amount,
            minimum: config.min_btc_deposit,
        });
    }

    let classification = classify(&ctx.pricer(), config, core_amount, btc_amount)?;
    if classification.total_usd < config.min_usd_value {
        return Err(EngineError::BelowMinimum {
            what: "USD value",
            amount: classification.total_usd,
            minimum: config.min_usd_value,
        });
    }
    if !classification.valid {
        return Err(EngineError::TierRejected(classification.reason));
    }

    let deposits = BTreeMap::from([(AssetKind::Core, core_amount), (AssetKind::Btc, btc_amount)]);
    mint(ctx, caller, &deposits, classification.total_usd, classification.tier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use corestake_types::fixed::{units, CORE_DECIMALS, WAD};

    #[test]
    fn ratio_is_whole_core_per_whole_btc() {
        // 100 CORE for 0.001 BTC
        let ratio = core_btc_ratio(units(100, CORE_DECIMALS), 100_000).unwrap();
        assert_eq!(ratio, 100_000 * WAD);
        assert_eq!(core_btc_ratio(1, 0), None);
    }
}
