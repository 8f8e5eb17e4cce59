use crate::error::{EngineError, Result};
use crate::ledger::{Transfer, POOL_ACCOUNT};
use crate::ExecutionContext;
use corestake_types::config::validate_fees;
use corestake_types::{AccountId, AssetAmount, AssetKind, EngineConfig, EngineState, OperationOutcome};
use tracing::{info, warn};

pub fn update_config(state: &mut EngineState, config: EngineConfig) -> Result<()> {
    config.validate()?;
    state.config = config;
    info!("engine config updated");
    Ok(())
}

pub fn set_fees(state: &mut EngineState, protocol_fee_bps: u16, performance_fee_bps: u16) -> Result<()> {
    validate_fees(protocol_fee_bps, performance_fee_bps)?;
    state.config.protocol_fee_bps = protocol_fee_bps;
    state.config.performance_fee_bps = performance_fee_bps;
    info!(protocol_fee_bps, performance_fee_bps, "fees updated");
    Ok(())
}

pub fn add_operator(state: &mut EngineState, account: AccountId) {
    if state.roles.operators.insert(account) {
        info!(%account, "operator added");
    }
}

pub fn remove_operator(state: &mut EngineState, account: &AccountId) {
    if state.roles.operators.remove(account) {
        info!(%account, "operator removed");
    }
}

pub fn transfer_ownership(state: &mut EngineState, new_owner: AccountId) {
    info!(from = %state.roles.owner, to = %new_owner, "ownership transferred");
    state.roles.owner = new_owner;
}

pub fn set_paused(state: &mut EngineState, paused: bool) {
    if paused {
        warn!("engine paused");
    } else {
        info!("engine resumed");
    }
    state.paused = paused;
}

/// Pays the accumulated fees for `asset` to the caller.
pub fn collect_fees(ctx: &mut ExecutionContext, caller: &AccountId, asset: AssetKind) -> Result<OperationOutcome> {
    let amount = ctx.state.fees_accrued(asset);
    if amount == 0 {
        return Err(EngineError::InvalidAmount);
    }
    ctx.state.fee_vault.remove(&asset);
    ctx.transfers.push(Transfer {
        asset,
        from: POOL_ACCOUNT,
        to: *caller,
        amount,
    });
    info!(%asset, amount, to = %caller, "fees collected");
    Ok(OperationOutcome::FeesCollected(AssetAmount::new(asset, amount)))
}
