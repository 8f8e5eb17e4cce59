#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use corestake_execution::{execute_op, ExecutionContext};
use corestake_oracles::StaticOracle;
use corestake_types::{AccountId, AssetAmount, AssetKind, EngineConfig, EngineOperation, EngineState, ValidatorId};

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    caller: u8,
    selector: u8,
    validator: u8,
    amount: u128,
    other: u128,
    flag: bool,
    score: u16,
}

fuzz_target!(|data: FuzzInput| {
    let mut state = EngineState::new(AccountId::from_byte(0), EngineConfig::default());
    let oracle = StaticOracle::new(3600)
        .with_price("CORE-USD", 700_000_000_000_000_000, 0)
        .with_price("BTC-USD", 110_000_000_000_000_000_000_000, 0);
    let caller = AccountId::from_byte(data.caller % 3);
    let validator = ValidatorId::from_byte(data.validator % 4);

    let op = match data.selector % 10 {
        0 => EngineOperation::Deposit {
            assets: vec![AssetAmount::new(AssetKind::Core, data.amount)],
        },
        1 => EngineOperation::DepositDual {
            core_amount: data.amount,
            btc_amount: data.other,
        },
        2 => EngineOperation::Redeem { shares: data.amount },
        3 => EngineOperation::RequestWithdrawal { shares: data.amount },
        4 => EngineOperation::AddValidator {
            validator,
            commission_bps: data.score,
            hybrid_score: data.score,
        },
        5 => EngineOperation::SetValidatorStatus {
            validator,
            active: data.flag,
        },
        6 => EngineOperation::ManualRebalance {
            from: validator,
            to: ValidatorId::from_byte(data.caller % 4),
            amount: data.amount,
        },
        7 => EngineOperation::AccrueRewards {
            asset: if data.flag { AssetKind::Core } else { AssetKind::Btc },
            cumulative_amount: data.amount,
        },
        8 => EngineOperation::SetFees {
            protocol_fee_bps: data.score,
            performance_fee_bps: data.score,
        },
        _ => EngineOperation::AutoRebalance,
    };

    let mut ctx = ExecutionContext::new(&mut state, &oracle, 1);
    let _ = execute_op(&op, &caller, &mut ctx);
});
