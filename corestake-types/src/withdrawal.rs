use crate::address::AccountId;
use crate::asset::AssetKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalRequest {
    pub id: u64,
    pub requester: AccountId,
    pub asset: AssetKind,
    pub amount: u128,
    pub request_time: u64,
    pub unlock_time: u64,
    pub processed: bool,
}

impl WithdrawalRequest {
    pub fn is_unlocked(&self, now: u64) -> bool {
        now >= self.unlock_time
    }
}

/// FIFO unbonding queue. Requests stay in insertion order; processed
/// entries are pruned from the front once they no longer hold anything up.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct WithdrawalQueue {
    next_id: u64,
    requests: Vec<WithdrawalRequest>,
    queued: BTreeMap<AssetKind, u128>,
}

impl WithdrawalQueue {
    /// Appends a request. `None` if the queued total for `asset` would overflow;
    /// the queue is left untouched in that case.
    pub fn enqueue(
        &mut self,
        requester: AccountId,
        asset: AssetKind,
        amount: u128,
        request_time: u64,
        unlock_time: u64,
    ) -> Option<u64> {
        let total = self.total_queued(asset).checked_add(amount)?;
        let id = self.next_id;
        self.next_id = id.checked_add(1)?;
        self.requests.push(WithdrawalRequest {
            id,
            requester,
            asset,
            amount,
            request_time,
            unlock_time,
            processed: false,
        });
        self.queued.insert(asset, total);
        Some(id)
    }

    pub fn get(&self, id: u64) -> Option<&WithdrawalRequest> {
        self.requests.iter().find(|r| r.id == id)
    }

    /// Pending requests in queue order.
    pub fn pending(&self) -> impl Iterator<Item = &WithdrawalRequest> {
        self.requests.iter().filter(|r| !r.processed)
    }

    /// Number of unprocessed requests for the same asset ahead of `id`.
    pub fn position(&self, id: u64) -> Option<usize> {
        let target = self.get(id)?;
        if target.processed {
            return None;
        }
        Some(
            self.pending()
                .take_while(|r| r.id != id)
                .filter(|r| r.asset == target.asset)
                .count(),
        )
    }

    /// Aggregate amount still owed for `asset`.
    pub fn total_queued(&self, asset: AssetKind) -> u128 {
        self.queued.get(&asset).copied().unwrap_or(0)
    }

    /// Ids of pending requests unlocked at `now`, oldest first.
    pub fn matured(&self, now: u64) -> Vec<u64> {
        self.pending()
            .filter(|r| r.is_unlocked(now))
            .map(|r| r.id)
            .collect()
    }

    /// Marks a request paid. Returns it, or `None` if unknown or already processed.
    pub fn mark_processed(&mut self, id: u64) -> Option<WithdrawalRequest> {
        let req = self.requests.iter_mut().find(|r| r.id == id && !r.processed)?;
        req.processed = true;
        let paid = req.clone();
        if let Some(total) = self.queued.get_mut(&paid.asset) {
            *total = total.saturating_sub(paid.amount);
        }
        let keep_from = self
            .requests
            .iter()
            .position(|r| !r.processed)
            .unwrap_or(self.requests.len());
        self.requests.drain(..keep_from);
        Some(paid)
    }

    pub fn len(&self) -> usize {
        self.pending().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_count_same_asset_requests_ahead() {
        let mut q = WithdrawalQueue::default();
        let who = AccountId::from_byte(1);
        let a = q.enqueue(who, AssetKind::Core, 10, 0, 100).unwrap();
        let b = q.enqueue(who, AssetKind::Btc, 5, 0, 50).unwrap();
        let c = q.enqueue(who, AssetKind::Core, 20, 1, 101).unwrap();

        assert_eq!(q.position(a), Some(0));
        assert_eq!(q.position(b), Some(0));
        assert_eq!(q.position(c), Some(1));
        assert_eq!(q.total_queued(AssetKind::Core), 30);
    }

    #[test]
    fn processing_prunes_the_front() {
        let mut q = WithdrawalQueue::default();
        let who = AccountId::from_byte(1);
        let a = q.enqueue(who, AssetKind::Core, 10, 0, 100).unwrap();
        let b = q.enqueue(who, AssetKind::Core, 20, 0, 100).unwrap();

        assert_eq!(q.matured(99), Vec::<u64>::new());
        assert_eq!(q.matured(100), vec![a, b]);

        assert_eq!(q.mark_processed(b).map(|r| r.amount), Some(20));
        assert_eq!(q.mark_processed(b), None);
        assert_eq!(q.position(a), Some(0));
        assert_eq!(q.total_queued(AssetKind::Core), 10);

        q.mark_processed(a);
        assert!(q.is_empty());
        assert_eq!(q.get(a), None);
    }

    #[test]
    fn overflowing_total_leaves_queue_untouched() {
        let mut q = WithdrawalQueue::default();
        let who = AccountId::from_byte(1);
        let a = q.enqueue(who, AssetKind::Btc, u128::MAX - 1, 0, 100).unwrap();

        assert_eq!(q.enqueue(who, AssetKind::Btc, 2, 0, 100), None);
        assert_eq!(q.len(), 1);
        assert_eq!(q.total_queued(AssetKind::Btc), u128::MAX - 1);

        // Other assets keep their own total; ids continue from the last accepted request.
        let b = q.enqueue(who, AssetKind::Core, 2, 0, 100).unwrap();
        assert_eq!(b, a + 1);
    }
}
