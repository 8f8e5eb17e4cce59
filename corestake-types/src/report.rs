use crate::address::ValidatorId;
use crate::config::Tier;
use serde::{Deserialize, Serialize};

/// Snapshot of the basket for callers and dashboards.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PoolInfo {
    pub total_core: u128,
    pub total_btc: u128,
    pub total_shares: u128,
    /// USD per share, 18 decimals.
    pub share_price: u128,
    pub total_value: u128,
    pub tier: Option<Tier>,
    pub core_liquid: u128,
    pub total_delegated: u128,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub tier: Option<Tier>,
    pub valid: bool,
    pub reason: String,
    pub core_usd: u128,
    pub btc_usd: u128,
    pub total_usd: u128,
    /// Whole CORE per whole BTC, 18 decimals. `None` when no BTC is supplied.
    pub ratio: Option<u128>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RebalanceCheck {
    pub needed: bool,
    pub reason: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ValidatorReport {
    pub id: ValidatorId,
    pub delegated_amount: u128,
    pub commission_bps: u16,
    pub hybrid_score: u16,
    pub active: bool,
    pub effective_apy_bps: u32,
    pub risk_score: u16,
}
