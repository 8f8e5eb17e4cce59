#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use corestake_execution::ledger::{InMemoryLedger, TokenLedger, POOL_ACCOUNT};
use corestake_execution::{check_invariants, execute_operation};
use corestake_oracles::StaticOracle;
use corestake_types::{AccountId, AssetAmount, AssetKind, EngineConfig, EngineOperation, EngineState, OperationRequest};

#[derive(Arbitrary, Debug)]
enum Step {
    Deposit { who: bool, core: u64, btc: u32 },
    Redeem { who: bool, shares: u128 },
    Withdraw { who: bool, shares: u128 },
    Rewards { core: u64 },
}

fuzz_target!(|steps: Vec<Step>| {
    let owner = AccountId::from_byte(0xaa);
    let users = [AccountId::from_byte(1), AccountId::from_byte(2)];
    let mut state = EngineState::new(owner, EngineConfig::default());
    let oracle = StaticOracle::new(u64::MAX)
        .with_price("CORE-USD", 700_000_000_000_000_000, 0)
        .with_price("BTC-USD", 110_000_000_000_000_000_000_000, 0);
    let mut ledger = InMemoryLedger::new();
    for u in users {
        ledger.mint(u, AssetKind::Core, u128::MAX / 4);
        ledger.mint(u, AssetKind::Btc, u128::MAX / 4);
    }
    let mut rewards = 0u128;

    for (i, step) in steps.into_iter().take(64).enumerate() {
        let (caller, op) = match step {
            Step::Deposit { who, core, btc } => {
                let mut assets = vec![AssetAmount::new(AssetKind::Core, core as u128 * 1_000_000)];
                if btc > 0 {
                    assets.push(AssetAmount::new(AssetKind::Btc, btc as u128));
                }
                (users[who as usize], EngineOperation::Deposit { assets })
            }
            Step::Redeem { who, shares } => (users[who as usize], EngineOperation::Redeem { shares }),
            Step::Withdraw { who, shares } => (users[who as usize], EngineOperation::RequestWithdrawal { shares }),
            Step::Rewards { core } => {
                rewards += core as u128;
                (owner, EngineOperation::AccrueRewards { asset: AssetKind::Core, cumulative_amount: rewards })
            }
        };
        let request = OperationRequest::new(caller, op, i as u64);
        let _ = execute_operation(&request, &mut state, &oracle, &mut ledger);
        assert!(check_invariants(&state).is_ok());
        for asset in AssetKind::ALL {
            let owed = state.holdings(asset) + state.fees_accrued(asset) + state.withdrawals.total_queued(asset);
            assert_eq!(ledger.balance(&POOL_ACCOUNT, asset), owed);
        }
    }
});
