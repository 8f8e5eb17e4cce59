use crate::auth::ensure_not_paused;
use crate::error::{EngineError, OrOverflow, Result};
use crate::ledger::{Transfer, POOL_ACCOUNT};
use crate::shares::{burn, check_shares, credit_fee, payouts};
use crate::ExecutionContext;
use corestake_types::withdrawal::WithdrawalRequest;
use corestake_types::{AccountId, AssetAmount, AssetKind, EngineState, OperationOutcome, Redemption, ValidatorId};
use std::cmp::Reverse;
use tracing::{debug, info};

/// Takes `amount` CORE out of the pool: the liquid buffer first, then the
/// largest delegations.
fn release_core(state: &mut EngineState, amount: u128) -> Result<()> {
    let from_liquid = amount.min(state.pool.core_liquid);
    state.pool.core_liquid -= from_liquid;
    let mut remaining = amount - from_liquid;

    let mut holders: Vec<(ValidatorId, u128)> = state
        .validators
        .iter_delegated()
        .map(|v| (v.id, v.delegated_amount))
        .collect();
    holders.sort_by_key(|(id, delegated)| (Reverse(*delegated), *id));

    for (validator, delegated) in holders {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(delegated);
        state.validators.debit(&validator, take).ok_or_else(|| {
            EngineError::InvariantViolation(format!("undelegation from {} failed", validator))
        })?;
        debug!(validator = %validator, amount = take, "undelegated for withdrawal");
        remaining -= take;
    }

    if remaining > 0 {
        return Err(EngineError::InvariantViolation(format!(
            "pool short of {} CORE owed to share holders",
            remaining
        )));
    }
    Ok(())
}

/// Burns shares now and queues the pro-rata assets until they unbond.
pub fn request_withdrawal(ctx: &mut ExecutionContext, caller: &AccountId, shares: u128) -> Result<OperationOutcome> {
    ensure_not_paused(ctx.state)?;
    check_shares(ctx.state, caller, shares)?;
    let split = payouts(ctx.state, shares)?;
    let usd_value = burn(ctx, caller, shares)?;

    let now = ctx.timestamp;
    let state = &mut *ctx.state;
    let mut request_ids = Vec::new();
    let mut assets = Vec::new();
    let mut fees = Vec::new();
    for payout in split {
        match payout.asset {
            AssetKind::Core => release_core(state, payout.gross)?,
            AssetKind::Btc => state.pool.btc_holdings -= payout.gross,
        }
        credit_fee(state, payout.asset, payout.fee)?;
        if payout.net() > 0 {
            let unlock = now.saturating_add(state.config.unbonding_delay(payout.asset));
            let id = state
                .withdrawals
                .enqueue(*caller, payout.asset, payout.net(), now, unlock)
                .or_overflow()?;
            info!(id, account = %caller, asset = %payout.asset, amount = payout.net(), unlock, "withdrawal queued");
            request_ids.push(id);
        }
        assets.push(AssetAmount::new(payout.asset, payout.net()));
        fees.push(AssetAmount::new(payout.asset, payout.fee));
    }

    Ok(OperationOutcome::WithdrawalRequested {
        redemption: Redemption {
            shares_burned: shares,
            usd_value,
            assets,
            fees,
        },
        request_ids,
    })
}

fn pay(ctx: &mut ExecutionContext, request: &WithdrawalRequest) {
    ctx.transfers.push(Transfer {
        asset: request.asset,
        from: POOL_ACCOUNT,
        to: request.requester,
        amount: request.amount,
    });
    info!(id = request.id, account = %request.requester, amount = request.amount, "withdrawal paid");
}

pub fn claim_withdrawal(ctx: &mut ExecutionContext, caller: &AccountId, id: u64) -> Result<OperationOutcome> {
    let request = ctx
        .state
        .withdrawals
        .get(id)
        .filter(|r| !r.processed)
        .ok_or(EngineError::WithdrawalNotFound(id))?;
    if request.requester != *caller {
        return Err(EngineError::Unauthorized {
            caller: *caller,
            role: "requester",
        });
    }
    if !request.is_unlocked(ctx.timestamp) {
        return Err(EngineError::WithdrawalLocked {
            id,
            unlock_time: request.unlock_time,
        });
    }
    let paid = ctx
        .state
        .withdrawals
        .mark_processed(id)
        .ok_or(EngineError::WithdrawalNotFound(id))?;
    pay(ctx, &paid);
    Ok(OperationOutcome::WithdrawalsPaid { request_ids: vec![id] })
}

/// Pays up to `batch_size` matured requests in queue order.
pub fn process_withdrawals(ctx: &mut ExecutionContext, batch_size: u32) -> Result<OperationOutcome> {
    if batch_size == 0 {
        return Err(EngineError::InvalidAmount);
    }
    let due: Vec<u64> = ctx
        .state
        .withdrawals
        .matured(ctx.timestamp)
        .into_iter()
        .take(batch_size as usize)
        .collect();
    let mut request_ids = Vec::with_capacity(due.len());
    for id in due {
        if let Some(paid) = ctx.state.withdrawals.mark_processed(id) {
            pay(ctx, &paid);
            request_ids.push(id);
        }
    }
    Ok(OperationOutcome::WithdrawalsPaid { request_ids })
}

/// Requests ahead of `id` for the same asset.
pub fn queue_position(state: &EngineState, id: u64) -> Option<usize> {
    state.withdrawals.position(id)
}

pub fn total_queued(state: &EngineState, asset: AssetKind) -> u128 {
    state.withdrawals.total_queued(asset)
}

/// Whether `amount` could leave the pool without unbonding.
pub fn can_pay_instantly(state: &EngineState, asset: AssetKind, amount: u128) -> bool {
    match asset {
        AssetKind::Core => amount <= state.pool.core_liquid,
        AssetKind::Btc => amount <= state.pool.btc_holdings,
    }
}
