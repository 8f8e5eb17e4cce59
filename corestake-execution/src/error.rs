use crate::ledger::LedgerError;
use corestake_oracles::OracleError;
use corestake_types::config::ConfigError;
use corestake_types::{AccountId, AssetKind, ValidatorId};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    // === Validation ===
    #[error("amount must be greater than 0")]
    InvalidAmount,
    #[error("mismatched rebalance arrays")]
    MismatchedArrays,
    #[error("empty rebalance plan")]
    EmptyPlan,
    #[error("unbalanced rebalance plan: undelegating {undelegated}, delegating {delegated}")]
    UnbalancedPlan { undelegated: u128, delegated: u128 },
    #[error("invalid commission: {0} bps")]
    InvalidCommission(u16),
    #[error("invalid hybrid score: {0}")]
    InvalidHybridScore(u16),
    #[error("{what} below minimum: {amount} < {minimum}")]
    BelowMinimum {
        what: &'static str,
        amount: u128,
        minimum: u128,
    },
    #[error("{0}")]
    TierRejected(String),
    #[error("deposit too small to mint shares")]
    DepositTooSmall,
    #[error(transparent)]
    Config(#[from] ConfigError),

    // === Registry ===
    #[error("validator not found: {0}")]
    ValidatorNotFound(ValidatorId),
    #[error("validator already registered: {0}")]
    ValidatorExists(ValidatorId),
    #[error("validator {validator} still holds {delegated} delegated")]
    ValidatorHasDelegation { validator: ValidatorId, delegated: u128 },
    #[error("validator {0} is inactive")]
    InactiveValidator(ValidatorId),

    // === Insufficient resources ===
    #[error("insufficient shares: requested {requested}, available {available}")]
    InsufficientShares { requested: u128, available: u128 },
    #[error("insufficient delegation to undelegate: {validator} holds {available}, requested {requested}")]
    InsufficientDelegation {
        validator: ValidatorId,
        requested: u128,
        available: u128,
    },
    #[error("insufficient liquidity: {requested} {asset} requested, {available} available")]
    InsufficientLiquidity {
        asset: AssetKind,
        requested: u128,
        available: u128,
    },

    // === Rewards ===
    #[error("reward regression for {asset}: reported {reported} after {last}")]
    RewardRegression { asset: AssetKind, last: u128, reported: u128 },

    // === Withdrawals ===
    #[error("withdrawal request {0} not found")]
    WithdrawalNotFound(u64),
    #[error("withdrawal request {id} locked until {unlock_time}")]
    WithdrawalLocked { id: u64, unlock_time: u64 },

    // === Authorization ===
    #[error("unauthorized: {caller} is not {role}")]
    Unauthorized { caller: AccountId, role: &'static str },
    #[error("engine paused")]
    Paused,

    // === Oracle ===
    #[error("stale price for {symbol}: last update at {updated_at}")]
    PriceStale { symbol: String, updated_at: u64 },
    #[error("price unavailable: {0}")]
    PriceUnavailable(String),

    // === Host ===
    #[error("ledger transfer failed: {0}")]
    Ledger(#[from] LedgerError),
    #[error("arithmetic overflow")]
    Overflow,
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl From<OracleError> for EngineError {
    fn from(err: OracleError) -> Self {
        match err {
            OracleError::PriceStale { symbol, updated_at } => EngineError::PriceStale { symbol, updated_at },
            OracleError::PriceUnavailable(symbol) => EngineError::PriceUnavailable(symbol),
            other => EngineError::PriceUnavailable(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Lifts a checked-arithmetic `None` into `EngineError::Overflow`.
pub(crate) trait OrOverflow<T> {
    fn or_overflow(self) -> Result<T>;
}

impl<T> OrOverflow<T> for Option<T> {
    fn or_overflow(self) -> Result<T> {
        self.ok_or(EngineError::Overflow)
    }
}
