use crate::address::{AccountId, ValidatorId};
use crate::asset::AssetKind;
use crate::config::{EngineConfig, Tier};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetAmount {
    pub asset: AssetKind,
    pub amount: u128,
}

impl AssetAmount {
    pub fn new(asset: AssetKind, amount: u128) -> Self {
        Self { asset, amount }
    }
}

/// Every state-changing entry point of the engine.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum EngineOperation {
    // ══════════════════════════════════════════════════════════════
    // Deposits & Redemptions
    // ══════════════════════════════════════════════════════════════
    Deposit { assets: Vec<AssetAmount> },
    DepositDual { core_amount: u128, btc_amount: u128 },
    Redeem { shares: u128 },
    RequestWithdrawal { shares: u128 },
    ClaimWithdrawal { request_id: u64 },
    ProcessWithdrawals { batch_size: u32 },

    // ══════════════════════════════════════════════════════════════
    // Validator Registry
    // ══════════════════════════════════════════════════════════════
    AddValidator { validator: ValidatorId, commission_bps: u16, hybrid_score: u16 },
    RemoveValidator { validator: ValidatorId },
    SetValidatorStatus { validator: ValidatorId, active: bool },
    SetCommission { validator: ValidatorId, commission_bps: u16 },
    SetHybridScore { validator: ValidatorId, hybrid_score: u16 },

    // ══════════════════════════════════════════════════════════════
    // Allocation & Rebalancing
    // ══════════════════════════════════════════════════════════════
    Rebalance {
        from: Vec<ValidatorId>,
        from_amounts: Vec<u128>,
        to: Vec<ValidatorId>,
        to_amounts: Vec<u128>,
    },
    ManualRebalance { from: ValidatorId, to: ValidatorId, amount: u128 },
    AutoRebalance,
    Compound,

    // ══════════════════════════════════════════════════════════════
    // Rewards & Fees
    // ══════════════════════════════════════════════════════════════
    AccrueRewards { asset: AssetKind, cumulative_amount: u128 },
    CollectFees { asset: AssetKind },

    // ══════════════════════════════════════════════════════════════
    // Administration
    // ══════════════════════════════════════════════════════════════
    UpdateConfig { config: EngineConfig },
    SetFees { protocol_fee_bps: u16, performance_fee_bps: u16 },
    AddOperator { account: AccountId },
    RemoveOperator { account: AccountId },
    TransferOwnership { new_owner: AccountId },
    SetPaused { paused: bool },
}

impl EngineOperation {
    pub fn name(&self) -> &'static str {
        match self {
            EngineOperation::Deposit { .. } => "deposit",
            EngineOperation::DepositDual { .. } => "deposit_dual",
            EngineOperation::Redeem { .. } => "redeem",
            EngineOperation::RequestWithdrawal { .. } => "request_withdrawal",
            EngineOperation::ClaimWithdrawal { .. } => "claim_withdrawal",
            EngineOperation::ProcessWithdrawals { .. } => "process_withdrawals",
            EngineOperation::AddValidator { .. } => "add_validator",
            EngineOperation::RemoveValidator { .. } => "remove_validator",
            EngineOperation::SetValidatorStatus { .. } => "set_validator_status",
            EngineOperation::SetCommission { .. } => "set_commission",
            EngineOperation::SetHybridScore { .. } => "set_hybrid_score",
            EngineOperation::Rebalance { .. } => "rebalance",
            EngineOperation::ManualRebalance { .. } => "manual_rebalance",
            EngineOperation::AutoRebalance => "auto_rebalance",
            EngineOperation::Compound => "compound",
            EngineOperation::AccrueRewards { .. } => "accrue_rewards",
            EngineOperation::CollectFees { .. } => "collect_fees",
            EngineOperation::UpdateConfig { .. } => "update_config",
            EngineOperation::SetFees { .. } => "set_fees",
            EngineOperation::AddOperator { .. } => "add_operator",
            EngineOperation::RemoveOperator { .. } => "remove_operator",
            EngineOperation::TransferOwnership { .. } => "transfer_ownership",
            EngineOperation::SetPaused { .. } => "set_paused",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Redemption {
    pub shares_burned: u128,
    pub usd_value: u128,
    /// Net of the protocol fee.
    pub assets: Vec<AssetAmount>,
    pub fees: Vec<AssetAmount>,
}

/// Result of a committed operation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    Minted {
        shares: u128,
        usd_value: u128,
        tier: Option<Tier>,
    },
    Redeemed(Redemption),
    WithdrawalRequested {
        redemption: Redemption,
        request_ids: Vec<u64>,
    },
    WithdrawalsPaid {
        request_ids: Vec<u64>,
    },
    Rebalanced {
        legs: usize,
        moved: u128,
    },
    /// Nothing to do: no trigger, no safe target, or interval not elapsed.
    RebalanceSkipped {
        reason: String,
    },
    Delegated {
        amount: u128,
    },
    RewardsAccrued {
        asset: AssetKind,
        delta: u128,
        fee: u128,
    },
    FeesCollected(AssetAmount),
    Updated,
}
