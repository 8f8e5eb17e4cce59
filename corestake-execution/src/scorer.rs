//! Validator yield and risk scoring.

use corestake_types::fixed::BPS_DENOMINATOR;
use corestake_types::validator::{Validator, MAX_HYBRID_SCORE};
use corestake_types::{EngineConfig, ValidatorReport};

/// Staking APY after commission, discounted by the hybrid score.
pub fn effective_apy_bps(validator: &Validator, base_apy_bps: u32) -> u32 {
    let commission = (validator.commission_bps as u128).min(BPS_DENOMINATOR);
    let after_commission = base_apy_bps as u128 * (BPS_DENOMINATOR - commission) / BPS_DENOMINATOR;
    let score = (validator.hybrid_score as u128).min(MAX_HYBRID_SCORE as u128);
    (after_commission * score / MAX_HYBRID_SCORE as u128) as u32
}

/// 0 is safest. Inactive validators always score the maximum.
pub fn risk_score(validator: &Validator) -> u16 {
    if !validator.active {
        return MAX_HYBRID_SCORE;
    }
    MAX_HYBRID_SCORE.saturating_sub(validator.hybrid_score)
}

pub fn report(validator: &Validator, config: &EngineConfig) -> ValidatorReport {
    ValidatorReport {
        id: validator.id,
        delegated_amount: validator.delegated_amount,
        commission_bps: validator.commission_bps,
        hybrid_score: validator.hybrid_score,
        active: validator.active,
        effective_apy_bps: effective_apy_bps(validator, config.base_apy_bps),
        risk_score: risk_score(validator),
    }
}
