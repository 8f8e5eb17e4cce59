#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use corestake_execution::rebalance::rebalance;
use corestake_execution::registry::add_validator;
use corestake_types::allocation::RebalancePlan;
use corestake_types::{AccountId, EngineConfig, EngineState, ValidatorId};

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    delegations: [u64; 4],
    active: [bool; 4],
    from: Vec<u8>,
    from_amounts: Vec<u64>,
    to: Vec<u8>,
    to_amounts: Vec<u64>,
}

fn validator(b: u8) -> ValidatorId {
    // ids outside the registry are part of the input space
    ValidatorId::from_byte(b % 6)
}

fuzz_target!(|data: FuzzInput| {
    let mut state = EngineState::new(AccountId::from_byte(1), EngineConfig::default());
    for i in 0..4u8 {
        let id = ValidatorId::from_byte(i);
        let _ = add_validator(&mut state, id, 500, 800, 0);
        state.validators.credit(&id, data.delegations[i as usize] as u128);
        state.validators.set_active(&id, data.active[i as usize]);
    }

    let plan = RebalancePlan {
        from: data.from.iter().copied().map(validator).collect(),
        from_amounts: data.from_amounts.iter().map(|a| *a as u128).collect(),
        to: data.to.iter().copied().map(validator).collect(),
        to_amounts: data.to_amounts.iter().map(|a| *a as u128).collect(),
    };

    let before = state.clone();
    match rebalance(&mut state, &plan, 1) {
        Ok(_) => {
            assert_eq!(state.validators.total_delegated(), before.validators.total_delegated());
            assert!(state.validators.is_consistent());
        }
        Err(_) => assert_eq!(state, before),
    }
});
