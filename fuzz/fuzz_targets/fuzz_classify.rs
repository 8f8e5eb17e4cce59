#![no_main]

use libfuzzer_sys::fuzz_target;

use corestake_execution::queries::classify_deposit;
use corestake_oracles::StaticOracle;
use corestake_types::{AccountId, EngineConfig, EngineState};

fuzz_target!(|data: (u128, u128, u64, u64)| {
    let (core, btc, core_price, btc_price) = data;
    let state = EngineState::new(AccountId::from_byte(1), EngineConfig::default());
    let oracle = StaticOracle::new(3600)
        .with_price("CORE-USD", core_price as u128 + 1, 0)
        .with_price("BTC-USD", btc_price as u128 + 1, 0);

    if let Ok(c) = classify_deposit(&state, &oracle, 0, core, btc) {
        assert_eq!(c.total_usd, c.core_usd + c.btc_usd);
        if c.valid {
            let tier = c
                .tier
                .and_then(|t| state.config.tiers.iter().find(|cfg| cfg.tier == t))
                .expect("valid deposits carry a tier");
            assert!(c.total_usd >= tier.minimum_usd);
        }
        if c.tier.is_none() {
            assert!(!c.valid);
        }
    }
});
