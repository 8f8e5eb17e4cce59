use crate::error::{EngineError, OrOverflow, Result};
use crate::planner::{optimal_distribution, plan_rebalance, should_rebalance};
use corestake_types::allocation::{RebalanceEvent, RebalanceLeg, RebalancePlan};
use corestake_types::{EngineState, OperationOutcome, ValidatorId};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Checks a plan against the registry without touching it.
///
/// Undelegations are summed per validator, so one validator may appear
/// in several legs as long as the total fits its delegation.
pub fn validate_plan(state: &EngineState, plan: &RebalancePlan) -> Result<u128> {
    if !plan.has_matching_lengths() {
        return Err(EngineError::MismatchedArrays);
    }
    if plan.is_empty() {
        return Err(EngineError::EmptyPlan);
    }

    let mut undelegating: BTreeMap<ValidatorId, u128> = BTreeMap::new();
    let (mut total_from, mut total_to) = (0u128, 0u128);
    for leg in plan.legs() {
        if leg.from_amount == 0 || leg.to_amount == 0 {
            return Err(EngineError::InvalidAmount);
        }
        if !state.validators.contains(&leg.from) {
            return Err(EngineError::ValidatorNotFound(leg.from));
        }
        let to = state
            .validators
            .get(&leg.to)
            .ok_or(EngineError::ValidatorNotFound(leg.to))?;
        if !to.active {
            return Err(EngineError::InactiveValidator(leg.to));
        }
        let sum = undelegating.entry(leg.from).or_default();
        *sum = sum.checked_add(leg.from_amount).or_overflow()?;
        total_from = total_from.checked_add(leg.from_amount).or_overflow()?;
        total_to = total_to.checked_add(leg.to_amount).or_overflow()?;
    }

    for (validator, requested) in &undelegating {
        let available = state.validators.delegated(validator);
        if *requested > available {
            return Err(EngineError::InsufficientDelegation {
                validator: *validator,
                requested: *requested,
                available,
            });
        }
    }

    if total_from != total_to {
        return Err(EngineError::UnbalancedPlan {
            undelegated: total_from,
            delegated: total_to,
        });
    }
    Ok(total_from)
}

/// Applies a validated plan leg by leg on a staged registry and commits
/// it only if every leg succeeded.
pub fn rebalance(state: &mut EngineState, plan: &RebalancePlan, now: u64) -> Result<OperationOutcome> {
    let moved = validate_plan(state, plan)?;

    let mut registry = state.validators.clone();
    for leg in plan.legs() {
        registry.debit(&leg.from, leg.from_amount).ok_or_else(|| {
            EngineError::InvariantViolation(format!("debit of validated leg from {} failed", leg.from))
        })?;
        registry.credit(&leg.to, leg.to_amount).or_overflow()?;
    }
    state.validators = registry;

    for leg in plan.legs() {
        debug!(from = %leg.from, to = %leg.to, amount = leg.from_amount, "rebalance leg");
        state.record_rebalance(RebalanceEvent {
            from: leg.from,
            from_amount: leg.from_amount,
            to: leg.to,
            to_amount: leg.to_amount,
            timestamp: now,
        });
    }
    state.last_rebalance_at = Some(now);
    info!(legs = plan.len(), moved, "rebalance applied");

    Ok(OperationOutcome::Rebalanced {
        legs: plan.len(),
        moved,
    })
}

pub fn manual_rebalance(
    state: &mut EngineState,
    from: ValidatorId,
    to: ValidatorId,
    amount: u128,
    now: u64,
) -> Result<OperationOutcome> {
    let mut plan = RebalancePlan::default();
    plan.push(RebalanceLeg {
        from,
        from_amount: amount,
        to,
        to_amount: amount,
    });
    rebalance(state, &plan, now)
}

fn skipped(reason: &str) -> Result<OperationOutcome> {
    debug!(reason, "auto rebalance skipped");
    Ok(OperationOutcome::RebalanceSkipped {
        reason: reason.to_string(),
    })
}

/// Rebalances onto the optimal distribution when a trigger fires and the
/// minimum interval since the last rebalance has passed.
pub fn auto_rebalance(state: &mut EngineState, now: u64) -> Result<OperationOutcome> {
    let check = should_rebalance(state);
    if !check.needed {
        return skipped("no rebalance needed");
    }
    if let Some(last) = state.last_rebalance_at {
        if now < last.saturating_add(state.config.min_rebalance_interval_secs) {
            return skipped("rebalance interval not elapsed");
        }
    }
    let targets = optimal_distribution(state);
    if targets.is_empty() {
        return skipped("no validator meets the minimum hybrid score");
    }
    let plan = plan_rebalance(state, &targets);
    if plan.is_empty() {
        return skipped("allocation already optimal");
    }
    info!(reason = %check.reason, "auto rebalance triggered");
    rebalance(state, &plan, now)
}
