use crate::address::ValidatorId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Upper bound of `hybrid_score` and of derived risk scores.
pub const MAX_HYBRID_SCORE: u16 = 1000;
pub const MAX_COMMISSION_BPS: u16 = 10_000;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Validator {
    pub id: ValidatorId,
    /// CORE base units currently delegated by the pool.
    pub delegated_amount: u128,
    pub commission_bps: u16,
    /// Composite uptime/performance score, 0-1000, higher is better.
    pub hybrid_score: u16,
    pub active: bool,
    pub registered_at: u64,
}

impl Validator {
    pub fn new(id: ValidatorId, commission_bps: u16, hybrid_score: u16, registered_at: u64) -> Self {
        Self {
            id,
            delegated_amount: 0,
            commission_bps,
            hybrid_score,
            active: true,
            registered_at,
        }
    }
}

/// Validator table plus a secondary index of active entries.
///
/// All mutation goes through these methods so that the active index and
/// `total_delegated` always agree with the records.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatorRegistry {
    validators: BTreeMap<ValidatorId, Validator>,
    active: BTreeSet<ValidatorId>,
    total_delegated: u128,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn contains(&self, id: &ValidatorId) -> bool {
        self.validators.contains_key(id)
    }

    pub fn get(&self, id: &ValidatorId) -> Option<&Validator> {
        self.validators.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Validator> {
        self.validators.values()
    }

    /// Active validators only, without scanning inactive records.
    pub fn iter_active(&self) -> impl Iterator<Item = &Validator> {
        self.active.iter().filter_map(|id| self.validators.get(id))
    }

    /// Validators currently holding stake, active or not.
    pub fn iter_delegated(&self) -> impl Iterator<Item = &Validator> {
        self.validators.values().filter(|v| v.delegated_amount > 0)
    }

    pub fn total_delegated(&self) -> u128 {
        self.total_delegated
    }

    pub fn delegated(&self, id: &ValidatorId) -> u128 {
        self.validators
            .get(id)
            .map(|v| v.delegated_amount)
            .unwrap_or(0)
    }

    /// Returns false if the id is already registered.
    pub fn insert(&mut self, validator: Validator) -> bool {
        if self.validators.contains_key(&validator.id) {
            return false;
        }
        if validator.active {
            self.active.insert(validator.id);
        }
        self.total_delegated = self.total_delegated.saturating_add(validator.delegated_amount);
        self.validators.insert(validator.id, validator);
        true
    }

    pub fn remove(&mut self, id: &ValidatorId) -> Option<Validator> {
        let removed = self.validators.remove(id)?;
        self.active.remove(id);
        self.total_delegated = self.total_delegated.saturating_sub(removed.delegated_amount);
        Some(removed)
    }

    pub fn set_active(&mut self, id: &ValidatorId, active: bool) -> bool {
        let Some(v) = self.validators.get_mut(id) else {
            return false;
        };
        v.active = active;
        if active {
            self.active.insert(*id);
        } else {
            self.active.remove(id);
        }
        true
    }

    pub fn set_commission(&mut self, id: &ValidatorId, commission_bps: u16) -> bool {
        match self.validators.get_mut(id) {
            Some(v) => {
                v.commission_bps = commission_bps;
                true
            }
            None => false,
        }
    }

    pub fn set_hybrid_score(&mut self, id: &ValidatorId, hybrid_score: u16) -> bool {
        match self.validators.get_mut(id) {
            Some(v) => {
                v.hybrid_score = hybrid_score;
                true
            }
            None => false,
        }
    }

    /// Adds delegation. `None` if the validator is unknown or the total overflows.
    pub fn credit(&mut self, id: &ValidatorId, amount: u128) -> Option<u128> {
        let total = self.total_delegated.checked_add(amount)?;
        let v = self.validators.get_mut(id)?;
        v.delegated_amount = v.delegated_amount.checked_add(amount)?;
        self.total_delegated = total;
        Some(v.delegated_amount)
    }

    /// Removes delegation. `None` if the validator is unknown or holds less than `amount`.
    pub fn debit(&mut self, id: &ValidatorId, amount: u128) -> Option<u128> {
        let v = self.validators.get_mut(id)?;
        let remaining = v.delegated_amount.checked_sub(amount)?;
        let total = self.total_delegated.checked_sub(amount)?;
        v.delegated_amount = remaining;
        self.total_delegated = total;
        Some(remaining)
    }

    /// Recomputes the aggregates from the records. Used by invariant checks.
    pub fn is_consistent(&self) -> bool {
        let sum: Option<u128> = self
            .validators
            .values()
            .try_fold(0u128, |acc, v| acc.checked_add(v.delegated_amount));
        let active: BTreeSet<ValidatorId> = self
            .validators
            .values()
            .filter(|v| v.active)
            .map(|v| v.id)
            .collect();
        sum == Some(self.total_delegated) && active == self.active
    }
}
