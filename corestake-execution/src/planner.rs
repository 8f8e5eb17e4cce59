//! Target allocation of delegated CORE and the rebalance trigger.

use crate::scorer::{effective_apy_bps, risk_score};
use corestake_types::allocation::{AllocationTarget, RebalanceLeg, RebalancePlan};
use corestake_types::fixed::BPS_DENOMINATOR;
use corestake_types::validator::MAX_HYBRID_SCORE;
use corestake_types::{EngineState, RebalanceCheck, ValidatorId};
use std::cmp::Reverse;
use std::collections::BTreeMap;

/// Ranked targets whose weights sum to exactly 10_000 bps.
///
/// Candidates are active validators at or above `min_hybrid_score`, ranked
/// by effective APY (desc), then risk (asc), then id. Empty when nobody
/// qualifies.
pub fn optimal_distribution(state: &EngineState) -> Vec<AllocationTarget> {
    let config = &state.config;
    let mut candidates: Vec<AllocationTarget> = state
        .validators
        .iter_active()
        .filter(|v| v.hybrid_score >= config.min_hybrid_score)
        .map(|v| AllocationTarget {
            validator: v.id,
            weight_bps: 0,
            effective_apy_bps: effective_apy_bps(v, config.base_apy_bps),
            risk_score: risk_score(v),
        })
        .collect();
    candidates.sort_by_key(|t| (Reverse(t.effective_apy_bps), t.risk_score, t.validator));
    candidates.truncate(config.max_validators as usize);
    if candidates.is_empty() {
        return candidates;
    }

    let blends: Vec<u128> = candidates
        .iter()
        .map(|t| t.effective_apy_bps as u128 * (MAX_HYBRID_SCORE as u128 + 1 - t.risk_score as u128))
        .collect();
    let total: u128 = blends.iter().sum();

    let mut assigned = 0u128;
    for (target, blend) in candidates.iter_mut().zip(&blends) {
        let weight = if total == 0 {
            BPS_DENOMINATOR / blends.len() as u128
        } else {
            blend * BPS_DENOMINATOR / total
        };
        target.weight_bps = weight as u16;
        assigned += weight;
    }
    candidates[0].weight_bps += (BPS_DENOMINATOR - assigned) as u16;
    candidates
}

/// Splits `amount` by the target weights. Rounding dust goes to the
/// top-ranked validator; zero slices are dropped.
pub fn allocate(targets: &[AllocationTarget], amount: u128) -> Vec<(ValidatorId, u128)> {
    if targets.is_empty() || amount == 0 {
        return Vec::new();
    }
    let mut slices: Vec<(ValidatorId, u128)> = targets
        .iter()
        .map(|t| {
            let share = amount / BPS_DENOMINATOR * t.weight_bps as u128
                + amount % BPS_DENOMINATOR * t.weight_bps as u128 / BPS_DENOMINATOR;
            (t.validator, share)
        })
        .collect();
    let assigned: u128 = slices.iter().map(|(_, a)| a).sum();
    slices[0].1 += amount - assigned;
    slices.retain(|(_, a)| *a > 0);
    slices
}

/// Delegation-weighted APY of the live allocation, in bps.
pub fn current_apy_bps(state: &EngineState) -> u32 {
    let total = state.validators.total_delegated();
    if total == 0 {
        return 0;
    }
    let weighted: u128 = state
        .validators
        .iter_delegated()
        .map(|v| {
            let apy = effective_apy_bps(v, state.config.base_apy_bps) as u128;
            apy * (v.delegated_amount / total * BPS_DENOMINATOR + v.delegated_amount % total * BPS_DENOMINATOR / total)
        })
        .sum();
    (weighted / BPS_DENOMINATOR) as u32
}

pub fn distribution_apy_bps(targets: &[AllocationTarget]) -> u32 {
    let weighted: u128 = targets
        .iter()
        .map(|t| t.effective_apy_bps as u128 * t.weight_bps as u128)
        .sum();
    (weighted / BPS_DENOMINATOR) as u32
}

pub fn should_rebalance(state: &EngineState) -> RebalanceCheck {
    let config = &state.config;

    if let Some(v) = state.validators.iter_delegated().find(|v| !v.active) {
        return RebalanceCheck {
            needed: true,
            reason: format!("validator {} is inactive", v.id),
        };
    }

    if let Some(v) = state
        .validators
        .iter_delegated()
        .find(|v| risk_score(v) > config.rebalance_threshold_risk)
    {
        return RebalanceCheck {
            needed: true,
            reason: format!(
                "validator {} risk {} exceeds threshold {}",
                v.id,
                risk_score(v),
                config.rebalance_threshold_risk
            ),
        };
    }

    if state.validators.total_delegated() > 0 {
        let current = current_apy_bps(state);
        let optimal = distribution_apy_bps(&optimal_distribution(state));
        if optimal.saturating_sub(current) > config.rebalance_threshold_apy_bps {
            return RebalanceCheck {
                needed: true,
                reason: format!(
                    "allocation APY {} bps trails optimal {} bps by more than {} bps",
                    current, optimal, config.rebalance_threshold_apy_bps
                ),
            };
        }
    }

    RebalanceCheck {
        needed: false,
        reason: String::new(),
    }
}

/// Moves the current `total_delegated` onto the optimal targets by pairing
/// each over-weight validator with under-weight ones, in id order.
pub fn plan_rebalance(state: &EngineState, targets: &[AllocationTarget]) -> RebalancePlan {
    let goal: BTreeMap<ValidatorId, u128> = allocate(targets, state.validators.total_delegated())
        .into_iter()
        .collect();

    let mut excess: Vec<(ValidatorId, u128)> = state
        .validators
        .iter_delegated()
        .filter_map(|v| {
            let want = goal.get(&v.id).copied().unwrap_or(0);
            (v.delegated_amount > want).then(|| (v.id, v.delegated_amount - want))
        })
        .collect();
    let mut deficit: Vec<(ValidatorId, u128)> = goal
        .iter()
        .filter_map(|(id, want)| {
            let have = state.validators.delegated(id);
            (*want > have).then(|| (*id, want - have))
        })
        .collect();

    let mut plan = RebalancePlan::default();
    let (mut i, mut j) = (0, 0);
    while i < excess.len() && j < deficit.len() {
        let amount = excess[i].1.min(deficit[j].1);
        plan.push(RebalanceLeg {
            from: excess[i].0,
            from_amount: amount,
            to: deficit[j].0,
            to_amount: amount,
        });
        excess[i].1 -= amount;
        deficit[j].1 -= amount;
        if excess[i].1 == 0 {
            i += 1;
        }
        if deficit[j].1 == 0 {
            j += 1;
        }
    }
    plan
}
