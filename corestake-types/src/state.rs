use crate::address::AccountId;
use crate::allocation::RebalanceEvent;
use crate::asset::AssetKind;
use crate::config::EngineConfig;
use crate::validator::ValidatorRegistry;
use crate::withdrawal::WithdrawalQueue;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Audit events kept in state; older entries are dropped.
pub const REBALANCE_LOG_CAPACITY: usize = 256;

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountState {
    pub shares: u128,
    pub deposited_usd: u128,
    pub redeemed_usd: u128,
}

/// Share supply and the pool's non-delegated holdings.
///
/// CORE held by the pool is `core_liquid` plus the registry's
/// `total_delegated`; BTC is never delegated.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct SharePool {
    pub total_shares: u128,
    pub core_liquid: u128,
    pub btc_holdings: u128,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Roles {
    pub owner: AccountId,
    pub operators: BTreeSet<AccountId>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineState {
    pub config: EngineConfig,
    pub roles: Roles,
    pub validators: ValidatorRegistry,
    pub pool: SharePool,
    pub accounts: BTreeMap<AccountId, AccountState>,

    // === Fees & rewards ===
    pub fee_vault: BTreeMap<AssetKind, u128>,
    /// Last cumulative reward seen per asset.
    pub reward_cursor: BTreeMap<AssetKind, u128>,

    // === Unbonding ===
    pub withdrawals: WithdrawalQueue,

    // === Rebalancing ===
    pub rebalance_log: VecDeque<RebalanceEvent>,
    pub last_rebalance_at: Option<u64>,

    // === Protection ===
    pub paused: bool,
    /// Number of committed operations.
    pub sequence: u64,
}

impl EngineState {
    pub fn new(owner: AccountId, config: EngineConfig) -> Self {
        Self {
            config,
            roles: Roles {
                owner,
                operators: BTreeSet::new(),
            },
            ..Default::default()
        }
    }

    /// Underlying units of `asset` owned by share holders.
    pub fn holdings(&self, asset: AssetKind) -> u128 {
        match asset {
            AssetKind::Core => self
                .pool
                .core_liquid
                .saturating_add(self.validators.total_delegated()),
            AssetKind::Btc => self.pool.btc_holdings,
        }
    }

    pub fn shares_of(&self, account: &AccountId) -> u128 {
        self.accounts.get(account).map(|a| a.shares).unwrap_or(0)
    }

    pub fn fees_accrued(&self, asset: AssetKind) -> u128 {
        self.fee_vault.get(&asset).copied().unwrap_or(0)
    }

    pub fn record_rebalance(&mut self, event: RebalanceEvent) {
        if self.rebalance_log.len() == REBALANCE_LOG_CAPACITY {
            self.rebalance_log.pop_front();
        }
        self.rebalance_log.push_back(event);
    }

    /// Blake3 hash of the canonical bincode encoding. Two states with the
    /// same hash are byte-for-byte identical.
    pub fn root_hash(&self) -> [u8; 32] {
        let encoded = bincode::serialize(self).expect("engine state serialization");
        *blake3::hash(&encoded).as_bytes()
    }
}
