//! Share minting, burning and reward accrual against the marked-to-market
//! pool value.
//!
//! Every conversion rounds toward the pool: minted shares and paid-out
//! assets are floored, so the share price never drops for the holders
//! who stay.

use crate::auth::ensure_not_paused;
use crate::error::{EngineError, OrOverflow, Result};
use crate::ledger::{Transfer, POOL_ACCOUNT, REWARD_SOURCE};
use crate::planner::{allocate, optimal_distribution};
use crate::ExecutionContext;
use corestake_types::config::Tier;
use corestake_types::fixed::{bps_of, mul_div, WAD};
use corestake_types::{AccountId, AssetAmount, AssetKind, EngineState, OperationOutcome, Redemption};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// USD per share, 18 decimals. One dollar before the first mint.
pub fn share_price(total_pooled_value: u128, total_shares: u128) -> Result<u128> {
    if total_shares == 0 {
        return Ok(WAD);
    }
    mul_div(total_pooled_value, WAD, total_shares).or_overflow()
}

/// Merges duplicate entries; every amount must be non-zero.
pub(crate) fn merge_assets(assets: &[AssetAmount]) -> Result<BTreeMap<AssetKind, u128>> {
    if assets.is_empty() {
        return Err(EngineError::InvalidAmount);
    }
    let mut merged = BTreeMap::new();
    for a in assets {
        if a.amount == 0 {
            return Err(EngineError::InvalidAmount);
        }
        let sum: &mut u128 = merged.entry(a.asset).or_default();
        *sum = sum.checked_add(a.amount).or_overflow()?;
    }
    Ok(merged)
}

pub fn deposit(ctx: &mut ExecutionContext, caller: &AccountId, assets: &[AssetAmount]) -> Result<OperationOutcome> {
    ensure_not_paused(ctx.state)?;
    let deposits = merge_assets(assets)?;
    let pricer = ctx.pricer();
    let mut usd_value = 0u128;
    for (asset, amount) in &deposits {
        usd_value = usd_value.checked_add(pricer.usd(*asset, *amount)?).or_overflow()?;
    }
    mint(ctx, caller, &deposits, usd_value, None)
}

/// Issues shares for `usd_value` at the pre-deposit share price and takes
/// custody of the deposited assets.
pub(crate) fn mint(
    ctx: &mut ExecutionContext,
    caller: &AccountId,
    deposits: &BTreeMap<AssetKind, u128>,
    usd_value: u128,
    tier: Option<Tier>,
) -> Result<OperationOutcome> {
    let pricer = ctx.pricer();
    let state = &mut *ctx.state;

    let total_shares = state.pool.total_shares;
    let shares = if total_shares == 0 {
        usd_value
    } else {
        let pooled = pricer.pool_value(state)?;
        if pooled == 0 {
            usd_value
        } else {
            mul_div(usd_value, total_shares, pooled).or_overflow()?
        }
    };
    if shares == 0 {
        return Err(EngineError::DepositTooSmall);
    }

    for (asset, amount) in deposits {
        match asset {
            AssetKind::Core => {
                let reserve = bps_of(*amount, state.config.liquidity_reserve_bps as u128).or_overflow()?;
                state.pool.core_liquid = state.pool.core_liquid.checked_add(*amount).or_overflow()?;
                delegate_liquid(state, amount - reserve)?;
            }
            AssetKind::Btc => {
                state.pool.btc_holdings = state.pool.btc_holdings.checked_add(*amount).or_overflow()?;
            }
        }
        ctx.transfers.push(Transfer {
            asset: *asset,
            from: *caller,
            to: POOL_ACCOUNT,
            amount: *amount,
        });
    }

    state.pool.total_shares = total_shares.checked_add(shares).or_overflow()?;
    let account = state.accounts.entry(*caller).or_default();
    account.shares = account.shares.checked_add(shares).or_overflow()?;
    account.deposited_usd = account.deposited_usd.saturating_add(usd_value);

    info!(account = %caller, shares, usd = usd_value, ?tier, "shares minted");
    Ok(OperationOutcome::Minted { shares, usd_value, tier })
}

/// Moves up to `amount` of liquid CORE onto the optimal distribution.
/// Returns what was delegated; nothing moves when no validator qualifies.
pub(crate) fn delegate_liquid(state: &mut EngineState, amount: u128) -> Result<u128> {
    let amount = amount.min(state.pool.core_liquid);
    let targets = optimal_distribution(state);
    if targets.is_empty() || amount == 0 {
        debug!(amount, "CORE left liquid");
        return Ok(0);
    }
    for (validator, slice) in allocate(&targets, amount) {
        state.validators.credit(&validator, slice).or_overflow()?;
        debug!(validator = %validator, amount = slice, "delegated");
    }
    state.pool.core_liquid -= amount;
    Ok(amount)
}

pub(crate) struct Payout {
    pub asset: AssetKind,
    pub gross: u128,
    pub fee: u128,
}

impl Payout {
    pub fn net(&self) -> u128 {
        self.gross - self.fee
    }
}

/// Pro-rata share of every holding for `shares`, with the protocol fee split off.
pub(crate) fn payouts(state: &EngineState, shares: u128) -> Result<Vec<Payout>> {
    let total_shares = state.pool.total_shares;
    let mut out = Vec::new();
    for asset in AssetKind::ALL {
        let gross = mul_div(state.holdings(asset), shares, total_shares).or_overflow()?;
        if gross == 0 {
            continue;
        }
        let fee = bps_of(gross, state.config.protocol_fee_bps as u128).or_overflow()?;
        out.push(Payout { asset, gross, fee });
    }
    Ok(out)
}

pub(crate) fn check_shares(state: &EngineState, caller: &AccountId, shares: u128) -> Result<()> {
    if shares == 0 {
        return Err(EngineError::InvalidAmount);
    }
    let available = state.shares_of(caller);
    if shares > available {
        return Err(EngineError::InsufficientShares {
            requested: shares,
            available,
        });
    }
    Ok(())
}

/// Burns `shares` from `caller`, returning their USD value at the current
/// share price.
pub(crate) fn burn(ctx: &mut ExecutionContext, caller: &AccountId, shares: u128) -> Result<u128> {
    check_shares(ctx.state, caller, shares)?;
    let pooled = ctx.pricer().pool_value(ctx.state)?;
    let state = &mut *ctx.state;
    let usd_value = mul_div(shares, pooled, state.pool.total_shares).or_overflow()?;

    state.pool.total_shares -= shares;
    let account = state.accounts.entry(*caller).or_default();
    account.shares -= shares;
    account.redeemed_usd = account.redeemed_usd.saturating_add(usd_value);
    Ok(usd_value)
}

pub(crate) fn credit_fee(state: &mut EngineState, asset: AssetKind, fee: u128) -> Result<()> {
    if fee == 0 {
        return Ok(());
    }
    let vault = state.fee_vault.entry(asset).or_default();
    *vault = vault.checked_add(fee).or_overflow()?;
    Ok(())
}

/// Instant redemption, paid in kind from the liquid buffer.
pub fn redeem(ctx: &mut ExecutionContext, caller: &AccountId, shares: u128) -> Result<OperationOutcome> {
    ensure_not_paused(ctx.state)?;
    check_shares(ctx.state, caller, shares)?;
    let split = payouts(ctx.state, shares)?;
    if let Some(core) = split.iter().find(|p| p.asset == AssetKind::Core) {
        if core.gross > ctx.state.pool.core_liquid {
            return Err(EngineError::InsufficientLiquidity {
                asset: AssetKind::Core,
                requested: core.gross,
                available: ctx.state.pool.core_liquid,
            });
        }
    }
    let usd_value = burn(ctx, caller, shares)?;

    let mut assets = Vec::new();
    let mut fees = Vec::new();
    for payout in split {
        let state = &mut *ctx.state;
        match payout.asset {
            AssetKind::Core => state.pool.core_liquid -= payout.gross,
            AssetKind::Btc => state.pool.btc_holdings -= payout.gross,
        }
        credit_fee(state, payout.asset, payout.fee)?;
        if payout.net() > 0 {
            ctx.transfers.push(Transfer {
                asset: payout.asset,
                from: POOL_ACCOUNT,
                to: *caller,
                amount: payout.net(),
            });
        }
        assets.push(AssetAmount::new(payout.asset, payout.net()));
        fees.push(AssetAmount::new(payout.asset, payout.fee));
    }

    info!(account = %caller, shares, usd = usd_value, "shares redeemed");
    Ok(OperationOutcome::Redeemed(Redemption {
        shares_burned: shares,
        usd_value,
        assets,
        fees,
    }))
}

/// Applies the growth of a cumulative reward counter and takes custody of
/// the delta. Reporting the same total twice changes nothing; a lower
/// total is rejected.
pub fn accrue_rewards(ctx: &mut ExecutionContext, asset: AssetKind, cumulative: u128) -> Result<OperationOutcome> {
    let state = &mut *ctx.state;
    let last = state.reward_cursor.get(&asset).copied().unwrap_or(0);
    if cumulative < last {
        return Err(EngineError::RewardRegression {
            asset,
            last,
            reported: cumulative,
        });
    }
    let delta = cumulative - last;
    if delta == 0 {
        return Ok(OperationOutcome::RewardsAccrued { asset, delta: 0, fee: 0 });
    }

    let fee = bps_of(delta, state.config.performance_fee_bps as u128).or_overflow()?;
    let net = delta - fee;
    match asset {
        AssetKind::Core => state.pool.core_liquid = state.pool.core_liquid.checked_add(net).or_overflow()?,
        AssetKind::Btc => state.pool.btc_holdings = state.pool.btc_holdings.checked_add(net).or_overflow()?,
    }
    credit_fee(state, asset, fee)?;
    state.reward_cursor.insert(asset, cumulative);
    ctx.transfers.push(Transfer {
        asset,
        from: REWARD_SOURCE,
        to: POOL_ACCOUNT,
        amount: delta,
    });

    info!(%asset, delta, fee, "rewards accrued");
    Ok(OperationOutcome::RewardsAccrued { asset, delta, fee })
}

/// Delegates liquid CORE above the reserve target.
pub fn compound(state: &mut EngineState) -> Result<OperationOutcome> {
    let target = bps_of(
        state.holdings(AssetKind::Core),
        state.config.liquidity_reserve_bps as u128,
    )
    .or_overflow()?;
    let surplus = state.pool.core_liquid.saturating_sub(target);
    let amount = delegate_liquid(state, surplus)?;
    if amount > 0 {
        info!(amount, "liquid CORE compounded");
    }
    Ok(OperationOutcome::Delegated { amount })
}
