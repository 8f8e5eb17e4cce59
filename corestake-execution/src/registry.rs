use crate::error::{EngineError, Result};
use corestake_types::validator::{Validator, MAX_COMMISSION_BPS, MAX_HYBRID_SCORE};
use corestake_types::{EngineState, ValidatorId};
use tracing::info;

fn check_commission(commission_bps: u16) -> Result<()> {
    if commission_bps > MAX_COMMISSION_BPS {
        return Err(EngineError::InvalidCommission(commission_bps));
    }
    Ok(())
}

fn check_hybrid_score(hybrid_score: u16) -> Result<()> {
    if hybrid_score > MAX_HYBRID_SCORE {
        return Err(EngineError::InvalidHybridScore(hybrid_score));
    }
    Ok(())
}

pub fn add_validator(
    state: &mut EngineState,
    id: ValidatorId,
    commission_bps: u16,
    hybrid_score: u16,
    now: u64,
) -> Result<()> {
    check_commission(commission_bps)?;
    check_hybrid_score(hybrid_score)?;
    if !state.validators.insert(Validator::new(id, commission_bps, hybrid_score, now)) {
        return Err(EngineError::ValidatorExists(id));
    }
    info!(validator = %id, commission_bps, hybrid_score, "validator added");
    Ok(())
}

pub fn remove_validator(state: &mut EngineState, id: &ValidatorId) -> Result<()> {
    let validator = state
        .validators
        .get(id)
        .ok_or(EngineError::ValidatorNotFound(*id))?;
    if validator.delegated_amount > 0 {
        return Err(EngineError::ValidatorHasDelegation {
            validator: *id,
            delegated: validator.delegated_amount,
        });
    }
    state.validators.remove(id);
    info!(validator = %id, "validator removed");
    Ok(())
}

pub fn set_status(state: &mut EngineState, id: &ValidatorId, active: bool) -> Result<()> {
    if !state.validators.set_active(id, active) {
        return Err(EngineError::ValidatorNotFound(*id));
    }
    info!(validator = %id, active, "validator status changed");
    Ok(())
}

pub fn set_commission(state: &mut EngineState, id: &ValidatorId, commission_bps: u16) -> Result<()> {
    check_commission(commission_bps)?;
    if !state.validators.set_commission(id, commission_bps) {
        return Err(EngineError::ValidatorNotFound(*id));
    }
    info!(validator = %id, commission_bps, "commission updated");
    Ok(())
}

pub fn set_hybrid_score(state: &mut EngineState, id: &ValidatorId, hybrid_score: u16) -> Result<()> {
    check_hybrid_score(hybrid_score)?;
    if !state.validators.set_hybrid_score(id, hybrid_score) {
        return Err(EngineError::ValidatorNotFound(*id));
    }
    info!(validator = %id, hybrid_score, "hybrid score updated");
    Ok(())
}
