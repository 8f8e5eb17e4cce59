use crate::address::ValidatorId;
use serde::{Deserialize, Serialize};

/// Computed share of new or rebalanced stake for one validator.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationTarget {
    pub validator: ValidatorId,
    pub weight_bps: u16,
    pub effective_apy_bps: u32,
    pub risk_score: u16,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebalanceLeg {
    pub from: ValidatorId,
    pub from_amount: u128,
    pub to: ValidatorId,
    pub to_amount: u128,
}

/// Ordered legs in the four-array shape the executor validates.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct RebalancePlan {
    pub from: Vec<ValidatorId>,
    pub from_amounts: Vec<u128>,
    pub to: Vec<ValidatorId>,
    pub to_amounts: Vec<u128>,
}

impl RebalancePlan {
    pub fn push(&mut self, leg: RebalanceLeg) {
        self.from.push(leg.from);
        self.from_amounts.push(leg.from_amount);
        self.to.push(leg.to);
        self.to_amounts.push(leg.to_amount);
    }

    pub fn is_empty(&self) -> bool {
        self.from.is_empty() && self.to.is_empty()
    }

    pub fn len(&self) -> usize {
        self.from.len()
    }

    pub fn has_matching_lengths(&self) -> bool {
        let n = self.from.len();
        self.from_amounts.len() == n && self.to.len() == n && self.to_amounts.len() == n
    }

    /// Legs, only meaningful once `has_matching_lengths` holds.
    pub fn legs(&self) -> impl Iterator<Item = RebalanceLeg> + '_ {
        self.from
            .iter()
            .zip(&self.from_amounts)
            .zip(self.to.iter().zip(&self.to_amounts))
            .map(|((from, from_amount), (to, to_amount))| RebalanceLeg {
                from: *from,
                from_amount: *from_amount,
                to: *to,
                to_amount: *to_amount,
            })
    }
}

impl FromIterator<RebalanceLeg> for RebalancePlan {
    fn from_iter<I: IntoIterator<Item = RebalanceLeg>>(iter: I) -> Self {
        let mut plan = RebalancePlan::default();
        for leg in iter {
            plan.push(leg);
        }
        plan
    }
}

/// Audit record of one applied leg.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RebalanceEvent {
    pub from: ValidatorId,
    pub from_amount: u128,
    pub to: ValidatorId,
    pub to_amount: u128,
    pub timestamp: u64,
}
