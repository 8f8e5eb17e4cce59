pub mod admin;
pub mod auth;
pub mod error;
pub mod ledger;
pub mod planner;
pub mod pricing;
pub mod queries;
pub mod rebalance;
pub mod registry;
pub mod scorer;
pub mod shares;
pub mod tiers;
pub mod withdrawals;

use auth::{authorize, Role};
use corestake_oracles::PriceOracle;
use corestake_types::allocation::RebalancePlan;
use corestake_types::{AccountId, EngineOperation, EngineState, OperationOutcome, OperationRequest};
use ledger::{TokenLedger, Transfer};
use pricing::Pricer;
use tracing::{debug, warn};

pub use error::{EngineError, Result};

pub struct ExecutionContext<'a> {
    pub state: &'a mut EngineState,
    pub oracle: &'a dyn PriceOracle,
    pub timestamp: u64,
    /// Custody moves queued by the operation, settled after it succeeds.
    pub transfers: Vec<Transfer>,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(state: &'a mut EngineState, oracle: &'a dyn PriceOracle, timestamp: u64) -> Self {
        Self {
            state,
            oracle,
            timestamp,
            transfers: Vec::new(),
        }
    }

    pub fn pricer(&self) -> Pricer<'a> {
        Pricer::new(self.oracle, &self.state.config, self.timestamp)
    }
}

/// Runs one request as a transaction: the operation is applied to a copy
/// of the state, its transfers are settled on the ledger, and only then is
/// the copy swapped in. Any error leaves `state` and `ledger` untouched.
pub fn execute_operation(
    request: &OperationRequest,
    state: &mut EngineState,
    oracle: &dyn PriceOracle,
    ledger: &mut dyn TokenLedger,
) -> Result<OperationOutcome> {
    let mut staged = state.clone();
    let (outcome, transfers) = {
        let mut ctx = ExecutionContext::new(&mut staged, oracle, request.timestamp);
        let outcome = execute_op(&request.operation, &request.caller, &mut ctx);
        (outcome, ctx.transfers)
    };
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!(op = request.operation.name(), caller = %request.caller, error = %err, "operation rejected");
            return Err(err);
        }
    };

    if let Err(err) = ledger.transfer(&transfers) {
        warn!(op = request.operation.name(), error = %err, "settlement failed");
        return Err(err.into());
    }

    staged.sequence += 1;
    *state = staged;
    debug!(op = request.operation.name(), sequence = state.sequence, "operation committed");
    Ok(outcome)
}

/// Dispatches one operation against the context without any rollback.
pub fn execute_op(op: &EngineOperation, caller: &AccountId, ctx: &mut ExecutionContext) -> Result<OperationOutcome> {
    let now = ctx.timestamp;
    match op {
        // === Deposits & Redemptions ===
        EngineOperation::Deposit { assets } => shares::deposit(ctx, caller, assets),
        EngineOperation::DepositDual { core_amount, btc_amount } => {
            tiers::deposit_dual(ctx, caller, *core_amount, *btc_amount)
        }
        EngineOperation::Redeem { shares: amount } => shares::redeem(ctx, caller, *amount),
        EngineOperation::RequestWithdrawal { shares: amount } => {
            withdrawals::request_withdrawal(ctx, caller, *amount)
        }
        EngineOperation::ClaimWithdrawal { request_id } => withdrawals::claim_withdrawal(ctx, caller, *request_id),
        EngineOperation::ProcessWithdrawals { batch_size } => withdrawals::process_withdrawals(ctx, *batch_size),

        // === Validator Registry ===
        EngineOperation::AddValidator {
            validator,
            commission_bps,
            hybrid_score,
        } => {
            authorize(ctx.state, caller, Role::Operator)?;
            registry::add_validator(ctx.state, *validator, *commission_bps, *hybrid_score, now)?;
            Ok(OperationOutcome::Updated)
        }
        EngineOperation::RemoveValidator { validator } => {
            authorize(ctx.state, caller, Role::Operator)?;
            registry::remove_validator(ctx.state, validator)?;
            Ok(OperationOutcome::Updated)
        }
        EngineOperation::SetValidatorStatus { validator, active } => {
            authorize(ctx.state, caller, Role::Operator)?;
            registry::set_status(ctx.state, validator, *active)?;
            Ok(OperationOutcome::Updated)
        }
        EngineOperation::SetCommission {
            validator,
            commission_bps,
        } => {
            authorize(ctx.state, caller, Role::Operator)?;
            registry::set_commission(ctx.state, validator, *commission_bps)?;
            Ok(OperationOutcome::Updated)
        }
        EngineOperation::SetHybridScore { validator, hybrid_score } => {
            authorize(ctx.state, caller, Role::Operator)?;
            registry::set_hybrid_score(ctx.state, validator, *hybrid_score)?;
            Ok(OperationOutcome::Updated)
        }

        // === Allocation & Rebalancing ===
        EngineOperation::Rebalance {
            from,
            from_amounts,
            to,
            to_amounts,
        } => {
            authorize(ctx.state, caller, Role::Operator)?;
            let plan = RebalancePlan {
                from: from.clone(),
                from_amounts: from_amounts.clone(),
                to: to.clone(),
                to_amounts: to_amounts.clone(),
            };
            rebalance::rebalance(ctx.state, &plan, now)
        }
        EngineOperation::ManualRebalance { from, to, amount } => {
            authorize(ctx.state, caller, Role::Operator)?;
            rebalance::manual_rebalance(ctx.state, *from, *to, *amount, now)
        }
        EngineOperation::AutoRebalance => {
            authorize(ctx.state, caller, Role::Operator)?;
            rebalance::auto_rebalance(ctx.state, now)
        }
        EngineOperation::Compound => {
            authorize(ctx.state, caller, Role::Operator)?;
            shares::compound(ctx.state)
        }

        // === Rewards & Fees ===
        EngineOperation::AccrueRewards {
            asset,
            cumulative_amount,
        } => {
            authorize(ctx.state, caller, Role::Operator)?;
            shares::accrue_rewards(ctx, *asset, *cumulative_amount)
        }
        EngineOperation::CollectFees { asset } => {
            authorize(ctx.state, caller, Role::Owner)?;
            admin::collect_fees(ctx, caller, *asset)
        }

        // === Administration ===
        EngineOperation::UpdateConfig { config } => {
            authorize(ctx.state, caller, Role::Owner)?;
            admin::update_config(ctx.state, config.clone())?;
            Ok(OperationOutcome::Updated)
        }
        EngineOperation::SetFees {
            protocol_fee_bps,
            performance_fee_bps,
        } => {
            authorize(ctx.state, caller, Role::Owner)?;
            admin::set_fees(ctx.state, *protocol_fee_bps, *performance_fee_bps)?;
            Ok(OperationOutcome::Updated)
        }
        EngineOperation::AddOperator { account } => {
            authorize(ctx.state, caller, Role::Owner)?;
            admin::add_operator(ctx.state, *account);
            Ok(OperationOutcome::Updated)
        }
        EngineOperation::RemoveOperator { account } => {
            authorize(ctx.state, caller, Role::Owner)?;
            admin::remove_operator(ctx.state, account);
            Ok(OperationOutcome::Updated)
        }
        EngineOperation::TransferOwnership { new_owner } => {
            authorize(ctx.state, caller, Role::Owner)?;
            admin::transfer_ownership(ctx.state, *new_owner);
            Ok(OperationOutcome::Updated)
        }
        EngineOperation::SetPaused { paused } => {
            authorize(ctx.state, caller, Role::Owner)?;
            admin::set_paused(ctx.state, *paused);
            Ok(OperationOutcome::Updated)
        }
    }
}

/// Structural invariants that must hold after every committed operation.
pub fn check_invariants(state: &EngineState) -> Result<()> {
    if !state.validators.is_consistent() {
        return Err(EngineError::InvariantViolation(
            "validator totals disagree with records".to_string(),
        ));
    }
    let held: u128 = state.accounts.values().map(|a| a.shares).sum();
    if held != state.pool.total_shares {
        return Err(EngineError::InvariantViolation(format!(
            "accounts hold {} shares, pool issued {}",
            held, state.pool.total_shares
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests;
