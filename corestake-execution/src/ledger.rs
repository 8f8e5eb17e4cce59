//! Custody of deposited tokens.
//!
//! The engine never moves tokens itself: each operation queues
//! [`Transfer`]s and the batch is handed to the host ledger once every
//! engine check has passed.

use corestake_types::{AccountId, AssetKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Ledger account holding the pool's tokens and the fee vault.
pub const POOL_ACCOUNT: AccountId = AccountId::from_byte(0xc5);

/// Staking rewards paid out by the chain. Transfers from this account
/// issue new tokens instead of debiting a balance.
pub const REWARD_SOURCE: AccountId = AccountId::from_byte(0xc6);

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    pub asset: AssetKind,
    pub from: AccountId,
    pub to: AccountId,
    pub amount: u128,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("insufficient {asset} balance for {account}: needs {needed}, has {available}")]
    InsufficientBalance {
        account: AccountId,
        asset: AssetKind,
        needed: u128,
        available: u128,
    },
    #[error("balance overflow for {account}")]
    Overflow { account: AccountId },
}

pub trait TokenLedger: Send + Sync {
    fn balance(&self, account: &AccountId, asset: AssetKind) -> u128;

    /// Applies every transfer or none of them.
    fn transfer(&mut self, transfers: &[Transfer]) -> Result<(), LedgerError>;
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct InMemoryLedger {
    balances: BTreeMap<AccountId, BTreeMap<AssetKind, u128>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credits `amount` out of thin air; test and genesis funding only.
    pub fn mint(&mut self, account: AccountId, asset: AssetKind, amount: u128) {
        let balance = self.balances.entry(account).or_default().entry(asset).or_default();
        *balance = balance.saturating_add(amount);
    }

    pub fn accounts(&self) -> impl Iterator<Item = &AccountId> {
        self.balances.keys()
    }

    fn apply(balances: &mut BTreeMap<AccountId, BTreeMap<AssetKind, u128>>, t: &Transfer) -> Result<(), LedgerError> {
        if t.from != REWARD_SOURCE {
            Self::debit(balances, t)?;
        }
        let to = balances.entry(t.to).or_default().entry(t.asset).or_default();
        *to = to.checked_add(t.amount).ok_or(LedgerError::Overflow { account: t.to })?;
        Ok(())
    }

    fn debit(balances: &mut BTreeMap<AccountId, BTreeMap<AssetKind, u128>>, t: &Transfer) -> Result<(), LedgerError> {
        let available = balances
            .get(&t.from)
            .and_then(|b| b.get(&t.asset))
            .copied()
            .unwrap_or(0);
        if available < t.amount {
            return Err(LedgerError::InsufficientBalance {
                account: t.from,
                asset: t.asset,
                needed: t.amount,
                available,
            });
        }
        balances.entry(t.from).or_default().insert(t.asset, available - t.amount);
        Ok(())
    }
}

impl TokenLedger for InMemoryLedger {
    fn balance(&self, account: &AccountId, asset: AssetKind) -> u128 {
        self.balances
            .get(account)
            .and_then(|b| b.get(&asset))
            .copied()
            .unwrap_or(0)
    }

    fn transfer(&mut self, transfers: &[Transfer]) -> Result<(), LedgerError> {
        let mut staged = self.balances.clone();
        for t in transfers {
            Self::apply(&mut staged, t)?;
        }
        self.balances = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_batch_moves_nothing() {
        let alice = AccountId::from_byte(1);
        let mut ledger = InMemoryLedger::new();
        ledger.mint(alice, AssetKind::Core, 100);

        let batch = [
            Transfer { asset: AssetKind::Core, from: alice, to: POOL_ACCOUNT, amount: 60 },
            Transfer { asset: AssetKind::Btc, from: alice, to: POOL_ACCOUNT, amount: 1 },
        ];
        let err = ledger.transfer(&batch).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { asset: AssetKind::Btc, .. }));
        assert_eq!(ledger.balance(&alice, AssetKind::Core), 100);
        assert_eq!(ledger.balance(&POOL_ACCOUNT, AssetKind::Core), 0);

        ledger.transfer(&batch[..1]).unwrap();
        assert_eq!(ledger.balance(&alice, AssetKind::Core), 40);
        assert_eq!(ledger.balance(&POOL_ACCOUNT, AssetKind::Core), 60);
    }

    #[test]
    fn reward_source_issues_tokens() {
        let mut ledger = InMemoryLedger::new();
        let reward = Transfer { asset: AssetKind::Core, from: REWARD_SOURCE, to: POOL_ACCOUNT, amount: 25 };
        ledger.transfer(&[reward, reward]).unwrap();
        assert_eq!(ledger.balance(&POOL_ACCOUNT, AssetKind::Core), 50);
        assert_eq!(ledger.balance(&REWARD_SOURCE, AssetKind::Core), 0);
    }
}
