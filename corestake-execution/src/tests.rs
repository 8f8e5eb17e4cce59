use super::*;
use crate::ledger::{InMemoryLedger, POOL_ACCOUNT};
use crate::queries::{classify_deposit, pool_info};
use corestake_oracles::StaticOracle;
use corestake_types::config::{Tier, TierConfig};
use corestake_types::fixed::{mul_div, units, BTC_DECIMALS, CORE_DECIMALS, USD_DECIMALS, WAD};
use corestake_types::{AssetAmount, AssetKind, EngineConfig, ValidatorId};

const OWNER: AccountId = AccountId::from_byte(0xa0);
const OPERATOR: AccountId = AccountId::from_byte(0xa1);
const ALICE: AccountId = AccountId::from_byte(0x01);
const BOB: AccountId = AccountId::from_byte(0x02);
const CAROL: AccountId = AccountId::from_byte(0x03);

const START: u64 = 1_700_000_000;
const DAY: u64 = 86_400;

/// $0.70
const CORE_PRICE: u128 = 700_000_000_000_000_000;

fn core(whole: u128) -> u128 {
    units(whole, CORE_DECIMALS)
}

fn btc_price() -> u128 {
    units(110_000, USD_DECIMALS)
}

fn usd(whole: u128) -> u128 {
    units(whole, USD_DECIMALS)
}

fn val(b: u8) -> ValidatorId {
    ValidatorId::from_byte(b)
}

struct Harness {
    state: EngineState,
    oracle: StaticOracle,
    ledger: InMemoryLedger,
    now: u64,
}

impl Harness {
    fn new() -> Self {
        let mut state = EngineState::new(OWNER, EngineConfig::default());
        state.roles.operators.insert(OPERATOR);

        let mut ledger = InMemoryLedger::new();
        for who in [ALICE, BOB] {
            ledger.mint(who, AssetKind::Core, core(1_000_000));
            ledger.mint(who, AssetKind::Btc, units(10, BTC_DECIMALS));
        }

        let mut harness = Self {
            state,
            oracle: StaticOracle::new(3600),
            ledger,
            now: START,
        };
        harness.refresh_prices();
        harness
    }

    fn refresh_prices(&mut self) {
        self.oracle.set_price("CORE-USD", CORE_PRICE, self.now);
        self.oracle.set_price("BTC-USD", btc_price(), self.now);
    }

    fn advance(&mut self, secs: u64) {
        self.now += secs;
        self.refresh_prices();
    }

    fn exec(&mut self, caller: AccountId, op: EngineOperation) -> Result<OperationOutcome> {
        let request = OperationRequest::new(caller, op, self.now);
        let result = execute_operation(&request, &mut self.state, &self.oracle, &mut self.ledger);
        assert_eq!(check_invariants(&self.state), Ok(()));
        result
    }

    /// Runs an operation that must fail and checks nothing moved.
    fn rejected(&mut self, caller: AccountId, op: EngineOperation) -> EngineError {
        let root = self.state.root_hash();
        let ledger = self.ledger.clone();
        let err = self.exec(caller, op).unwrap_err();
        assert_eq!(self.state.root_hash(), root, "rejected operation changed state: {err}");
        assert_eq!(self.ledger, ledger, "rejected operation moved tokens: {err}");
        err
    }

    fn add_validator(&mut self, b: u8, commission_bps: u16, hybrid_score: u16) {
        self.exec(
            OPERATOR,
            EngineOperation::AddValidator {
                validator: val(b),
                commission_bps,
                hybrid_score,
            },
        )
        .unwrap();
    }

    fn set_active(&mut self, b: u8, active: bool) {
        self.exec(
            OPERATOR,
            EngineOperation::SetValidatorStatus {
                validator: val(b),
                active,
            },
        )
        .unwrap();
    }

    fn deposit(&mut self, who: AccountId, assets: Vec<AssetAmount>) -> u128 {
        match self.exec(who, EngineOperation::Deposit { assets }).unwrap() {
            OperationOutcome::Minted { shares, .. } => shares,
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    fn deposit_core(&mut self, who: AccountId, amount: u128) -> u128 {
        self.deposit(who, vec![AssetAmount::new(AssetKind::Core, amount)])
    }

    fn accrue(&mut self, asset: AssetKind, cumulative: u128) -> Result<OperationOutcome> {
        self.exec(
            OPERATOR,
            EngineOperation::AccrueRewards {
                asset,
                cumulative_amount: cumulative,
            },
        )
    }

    fn info(&self) -> corestake_types::PoolInfo {
        pool_info(&self.state, &self.oracle, self.now).unwrap()
    }
}

// ══════════════════════════════════════════════════════════════
// Share accounting
// ══════════════════════════════════════════════════════════════

#[test]
fn test_first_deposit_mints_one_share_per_dollar() {
    let mut h = Harness::new();
    h.add_validator(1, 500, 900);

    let shares = h.deposit_core(ALICE, core(1_000));

    assert_eq!(shares, usd(700));
    let info = h.info();
    assert_eq!(info.share_price, WAD);
    assert_eq!(info.total_core, core(1_000));
    assert_eq!(h.state.pool.core_liquid, core(100));
    assert_eq!(h.state.validators.delegated(&val(1)), core(900));
    assert_eq!(h.ledger.balance(&POOL_ACCOUNT, AssetKind::Core), core(1_000));
}

#[test]
fn test_deposit_without_validators_stays_liquid() {
    let mut h = Harness::new();
    h.deposit_core(ALICE, core(10));
    assert_eq!(h.state.pool.core_liquid, core(10));
    assert_eq!(h.state.validators.total_delegated(), 0);
}

#[test]
fn test_dust_deposit_is_rejected() {
    let mut h = Harness::new();
    let err = h.rejected(
        ALICE,
        EngineOperation::Deposit {
            assets: vec![AssetAmount::new(AssetKind::Core, 1)],
        },
    );
    assert_eq!(err, EngineError::DepositTooSmall);

    let err = h.rejected(
        ALICE,
        EngineOperation::Deposit {
            assets: vec![AssetAmount::new(AssetKind::Core, 0)],
        },
    );
    assert_eq!(err.to_string(), "amount must be greater than 0");
}

#[test]
fn test_deposit_after_rewards_does_not_dilute() {
    let mut h = Harness::new();
    h.add_validator(1, 0, 900);
    let alice_shares = h.deposit_core(ALICE, core(1_000));

    h.accrue(AssetKind::Core, core(100)).unwrap();
    let before = h.info();
    assert!(before.share_price > WAD);

    let bob_shares = h.deposit_core(BOB, core(100));
    let after = h.info();

    assert!(bob_shares < usd(70), "late depositor pays the higher share price");
    assert!(after.share_price >= before.share_price);
    let alice_value = mul_div(alice_shares, after.total_value, after.total_shares).unwrap();
    let alice_before = mul_div(alice_shares, before.total_value, before.total_shares).unwrap();
    assert!(alice_value >= alice_before);
}

#[test]
fn test_reward_accrual_is_idempotent_and_monotonic() {
    let mut h = Harness::new();
    h.add_validator(1, 0, 900);
    h.deposit_core(ALICE, core(1_000));

    let outcome = h.accrue(AssetKind::Core, core(100)).unwrap();
    assert_eq!(
        outcome,
        OperationOutcome::RewardsAccrued {
            asset: AssetKind::Core,
            delta: core(100),
            fee: core(10),
        }
    );
    assert_eq!(h.state.fees_accrued(AssetKind::Core), core(10));
    let price = h.info().share_price;
    let pool = h.state.pool.clone();

    // Same cumulative figure again: nothing accrues.
    let repeat = h.accrue(AssetKind::Core, core(100)).unwrap();
    assert!(matches!(repeat, OperationOutcome::RewardsAccrued { delta: 0, .. }));
    assert_eq!(h.state.pool, pool);
    assert_eq!(h.info().share_price, price);

    let err = h.rejected(
        OPERATOR,
        EngineOperation::AccrueRewards {
            asset: AssetKind::Core,
            cumulative_amount: core(50),
        },
    );
    assert!(matches!(err, EngineError::RewardRegression { .. }));
}

#[test]
fn test_instant_redeem_pays_pro_rata_minus_fee() {
    let mut h = Harness::new();
    h.state.config.liquidity_reserve_bps = 10_000;
    h.add_validator(1, 0, 900);
    let shares = h.deposit_core(ALICE, core(1_000));

    let outcome = h.exec(ALICE, EngineOperation::Redeem { shares: shares / 2 }).unwrap();
    let OperationOutcome::Redeemed(redemption) = outcome else {
        panic!("expected a redemption");
    };

    // 0.5% of 500 CORE
    let fee = core(5) / 2;
    assert_eq!(redemption.usd_value, usd(350));
    assert_eq!(redemption.assets, vec![AssetAmount::new(AssetKind::Core, core(500) - fee)]);
    assert_eq!(h.state.fees_accrued(AssetKind::Core), fee);
    assert_eq!(h.ledger.balance(&ALICE, AssetKind::Core), core(1_000_000) - core(500) - fee);
    assert_eq!(h.info().share_price, WAD);
}

#[test]
fn test_redeem_checks_shares_and_liquidity() {
    let mut h = Harness::new();
    h.add_validator(1, 0, 900);
    let shares = h.deposit_core(ALICE, core(1_000));

    let err = h.rejected(ALICE, EngineOperation::Redeem { shares: shares + 1 });
    assert!(err.to_string().starts_with("insufficient shares"));

    let err = h.rejected(BOB, EngineOperation::Redeem { shares: 1 });
    assert!(matches!(err, EngineError::InsufficientShares { available: 0, .. }));

    // Only the 10% reserve is liquid.
    let err = h.rejected(ALICE, EngineOperation::Redeem { shares });
    assert!(matches!(
        err,
        EngineError::InsufficientLiquidity {
            asset: AssetKind::Core,
            ..
        }
    ));

    h.exec(ALICE, EngineOperation::Redeem { shares: shares / 10 }).unwrap();
    assert_eq!(h.state.pool.core_liquid, 0);
}

#[test]
fn test_redeem_after_rewards_keeps_price_for_remaining_holders() {
    let mut h = Harness::new();
    h.state.config.liquidity_reserve_bps = 10_000;
    let alice = h.deposit_core(ALICE, core(1_000));
    h.deposit_core(BOB, core(333));
    h.accrue(AssetKind::Core, core(77)).unwrap();

    let before = h.info().share_price;
    h.exec(ALICE, EngineOperation::Redeem { shares: alice }).unwrap();
    assert!(h.info().share_price >= before);
}

#[test]
fn test_rewards_are_settled_into_pool_custody() {
    let mut h = Harness::new();
    h.state.config.liquidity_reserve_bps = 10_000;
    h.state.config.protocol_fee_bps = 0;
    let shares = h.deposit_core(ALICE, core(1_000));

    h.accrue(AssetKind::Core, core(100)).unwrap();
    let custody = h.state.holdings(AssetKind::Core) + h.state.fees_accrued(AssetKind::Core);
    assert_eq!(h.ledger.balance(&POOL_ACCOUNT, AssetKind::Core), custody);
    assert_eq!(custody, core(1_100));

    // The only holder takes the whole pool minus the performance fee.
    h.exec(ALICE, EngineOperation::Redeem { shares }).unwrap();
    assert_eq!(h.ledger.balance(&ALICE, AssetKind::Core), core(1_000_000) + core(90));
    assert_eq!(h.ledger.balance(&POOL_ACCOUNT, AssetKind::Core), core(10));
}

// ══════════════════════════════════════════════════════════════
// Tiers
// ══════════════════════════════════════════════════════════════

#[test]
fn test_bronze_dual_deposit_scenario() {
    let mut h = Harness::new();
    // 100 CORE at $0.70 + 0.001 BTC at $110,000 = $180
    let core_amount = core(100);
    let btc_amount = units(1, BTC_DECIMALS) / 1_000;

    let class = classify_deposit(&h.state, &h.oracle, h.now, core_amount, btc_amount).unwrap();
    assert_eq!(class.total_usd, usd(180));
    assert_eq!(class.tier, Some(Tier::Bronze));
    assert!(class.valid);

    let outcome = h
        .exec(
            ALICE,
            EngineOperation::DepositDual {
                core_amount,
                btc_amount,
            },
        )
        .unwrap();
    assert_eq!(
        outcome,
        OperationOutcome::Minted {
            shares: usd(180),
            usd_value: usd(180),
            tier: Some(Tier::Bronze),
        }
    );
    let info = h.info();
    assert_eq!(info.total_value, usd(180));
    assert_eq!(info.total_shares * info.share_price / WAD, usd(180));
}

#[test]
fn test_tier_ratio_boundaries() {
    let h = Harness::new();
    let btc_amount = units(1, BTC_DECIMALS) / 100;

    // 20 CORE per 0.01 BTC is exactly Silver's 2,000:1.
    let at_min = classify_deposit(&h.state, &h.oracle, h.now, core(20), btc_amount).unwrap();
    assert_eq!(at_min.tier, Some(Tier::Silver));
    assert!(at_min.valid);
    assert_eq!(at_min.ratio, Some(2_000 * WAD));

    let below = classify_deposit(&h.state, &h.oracle, h.now, core(20) - 1, btc_amount).unwrap();
    assert_eq!(below.tier, Some(Tier::Silver));
    assert!(!below.valid);
    assert_eq!(below.reason, "insufficient CORE");

    let nothing = classify_deposit(&h.state, &h.oracle, h.now, core(1), 1_000).unwrap();
    assert_eq!(nothing.tier, None);
    assert_eq!(nothing.reason, "insufficient USD value for any tier");
}

#[test]
fn test_tier_usd_threshold_edges() {
    let mut h = Harness::new();
    // Round prices so one CORE base unit is one wad of USD.
    h.oracle.set_price("CORE-USD", usd(1), h.now);
    h.oracle.set_price("BTC-USD", usd(34_000), h.now);

    let bronze = classify_deposit(&h.state, &h.oracle, h.now, core(100), 0).unwrap();
    assert_eq!(bronze.total_usd, usd(100));
    assert_eq!(bronze.tier, Some(Tier::Bronze));
    assert!(bronze.valid);

    let under = classify_deposit(&h.state, &h.oracle, h.now, core(100) - 1, 0).unwrap();
    assert_eq!(under.total_usd, usd(100) - 1);
    assert_eq!(under.tier, None);
    assert!(!under.valid);
    assert_eq!(under.reason, "insufficient USD value for any tier");

    // 16,000 CORE + 1 BTC is $50,000 at exactly 16,000:1.
    let one_btc = units(1, BTC_DECIMALS);
    let satoshi = classify_deposit(&h.state, &h.oracle, h.now, core(16_000), one_btc).unwrap();
    assert_eq!(satoshi.total_usd, usd(50_000));
    assert_eq!(satoshi.tier, Some(Tier::Satoshi));
    assert!(satoshi.valid);

    let gold = classify_deposit(&h.state, &h.oracle, h.now, core(16_000) - 1, one_btc).unwrap();
    assert_eq!(gold.total_usd, usd(50_000) - 1);
    assert_eq!(gold.tier, Some(Tier::Gold));
    assert!(gold.valid);
}

#[test]
fn test_tier_max_ratio_reports_insufficient_btc() {
    let mut h = Harness::new();
    h.state.config.tiers[0] = TierConfig {
        max_ratio: Some(50_000 * WAD),
        ..TierConfig::new(Tier::Bronze, 100, 0)
    };

    let class = classify_deposit(&h.state, &h.oracle, h.now, core(100), 100_000).unwrap();
    assert!(!class.valid);
    assert_eq!(class.reason, "insufficient BTC");
}

#[test]
fn test_deposit_dual_validation() {
    let mut h = Harness::new();
    let dual = |core_amount, btc_amount| EngineOperation::DepositDual {
        core_amount,
        btc_amount,
    };

    let err = h.rejected(ALICE, dual(0, 1_000_000));
    assert_eq!(err.to_string(), "amount must be greater than 0");

    let err = h.rejected(ALICE, dual(core(1) / 2, 1_000_000));
    assert!(matches!(err, EngineError::BelowMinimum { what: "CORE deposit", .. }));

    let err = h.rejected(ALICE, dual(core(10), 9_999));
    assert!(matches!(err, EngineError::BelowMinimum { what: "BTC deposit", .. }));

    let err = h.rejected(ALICE, dual(core(1), 10_000));
    assert!(matches!(err, EngineError::BelowMinimum { what: "USD value", .. }));

    let err = h.rejected(ALICE, dual(core(20) - 1, 1_000_000));
    assert_eq!(err, EngineError::TierRejected("insufficient CORE".to_string()));

    assert!(h.exec(ALICE, dual(core(20), 1_000_000)).is_ok());
}

// ══════════════════════════════════════════════════════════════
// Allocation & rebalancing
// ══════════════════════════════════════════════════════════════

#[test]
fn test_inactive_validator_triggers_rebalance() {
    let mut h = Harness::new();
    h.state.config.liquidity_reserve_bps = 0;
    h.add_validator(0xa, 0, 950);
    h.add_validator(0xb, 0, 950);
    h.set_active(0xb, false);

    h.deposit_core(ALICE, core(1_000));
    assert_eq!(h.state.validators.delegated(&val(0xa)), core(1_000));
    assert_eq!(h.state.validators.delegated(&val(0xb)), 0);

    let price = h.info().share_price;
    let shares = h.deposit_core(BOB, core(500));
    assert_eq!(shares, usd(350));
    assert_eq!(h.info().share_price, price);

    let check = queries::should_rebalance(&h.state);
    assert!(!check.needed);
    assert_eq!(check.reason, "");

    h.set_active(0xa, false);
    let check = queries::should_rebalance(&h.state);
    assert!(check.needed);
    assert!(check.reason.contains("inactive"));
}

#[test]
fn test_risky_validator_triggers_rebalance() {
    let mut h = Harness::new();
    h.add_validator(1, 0, 900);
    h.deposit_core(ALICE, core(100));
    h.exec(
        OPERATOR,
        EngineOperation::SetHybridScore {
            validator: val(1),
            hybrid_score: 300,
        },
    )
    .unwrap();

    let check = queries::should_rebalance(&h.state);
    assert!(check.needed);
    assert!(check.reason.contains("risk"));
}

#[test]
fn test_apy_gap_triggers_rebalance() {
    let mut h = Harness::new();
    h.add_validator(1, 5_000, 900);
    h.deposit_core(ALICE, core(1_000));
    assert!(!queries::should_rebalance(&h.state).needed);

    h.add_validator(2, 0, 900);
    let check = queries::should_rebalance(&h.state);
    assert!(check.needed);
    assert!(check.reason.contains("trails optimal"));
}

#[test]
fn test_rebalance_conserves_delegation() {
    let mut h = Harness::new();
    for b in 1..=3 {
        h.add_validator(b, 0, 900);
    }
    h.deposit_core(ALICE, core(3_000));
    let total = h.state.validators.total_delegated();
    let d1 = h.state.validators.delegated(&val(1));

    let outcome = h
        .exec(
            OPERATOR,
            EngineOperation::Rebalance {
                from: vec![val(1), val(1)],
                from_amounts: vec![core(100), core(50)],
                to: vec![val(2), val(3)],
                to_amounts: vec![core(120), core(30)],
            },
        )
        .unwrap();

    assert_eq!(outcome, OperationOutcome::Rebalanced { legs: 2, moved: core(150) });
    assert_eq!(h.state.validators.total_delegated(), total);
    assert_eq!(h.state.validators.delegated(&val(1)), d1 - core(150));
    assert_eq!(h.state.rebalance_log.len(), 2);
    assert_eq!(h.state.last_rebalance_at, Some(h.now));
}

#[test]
fn test_rebalance_rejections_leave_state_untouched() {
    let mut h = Harness::new();
    h.add_validator(1, 0, 900);
    h.add_validator(2, 0, 900);
    h.add_validator(3, 0, 900);
    h.set_active(3, false);
    h.deposit_core(ALICE, core(1_000));
    let held = h.state.validators.delegated(&val(1));

    let err = h.rejected(
        OPERATOR,
        EngineOperation::Rebalance {
            from: vec![val(1)],
            from_amounts: vec![1, 2],
            to: vec![val(2)],
            to_amounts: vec![1],
        },
    );
    assert_eq!(err.to_string(), "mismatched rebalance arrays");

    let err = h.rejected(
        OPERATOR,
        EngineOperation::ManualRebalance {
            from: val(1),
            to: val(2),
            amount: held + 1,
        },
    );
    assert!(err.to_string().starts_with("insufficient delegation to undelegate"));

    // Each leg fits on its own; together they exceed the delegation.
    let err = h.rejected(
        OPERATOR,
        EngineOperation::Rebalance {
            from: vec![val(1), val(1)],
            from_amounts: vec![held, 1],
            to: vec![val(2), val(2)],
            to_amounts: vec![held, 1],
        },
    );
    assert!(matches!(err, EngineError::InsufficientDelegation { .. }));

    let err = h.rejected(
        OPERATOR,
        EngineOperation::Rebalance {
            from: vec![val(1)],
            from_amounts: vec![10],
            to: vec![val(2)],
            to_amounts: vec![11],
        },
    );
    assert!(matches!(err, EngineError::UnbalancedPlan { .. }));

    let err = h.rejected(
        OPERATOR,
        EngineOperation::ManualRebalance {
            from: val(1),
            to: val(3),
            amount: 10,
        },
    );
    assert_eq!(err, EngineError::InactiveValidator(val(3)));

    let err = h.rejected(
        OPERATOR,
        EngineOperation::ManualRebalance {
            from: val(9),
            to: val(2),
            amount: 10,
        },
    );
    assert_eq!(err, EngineError::ValidatorNotFound(val(9)));

    let err = h.rejected(
        OPERATOR,
        EngineOperation::ManualRebalance {
            from: val(1),
            to: val(2),
            amount: 0,
        },
    );
    assert_eq!(err, EngineError::InvalidAmount);
}

#[test]
fn test_auto_rebalance_respects_interval() {
    let mut h = Harness::new();
    h.add_validator(1, 0, 900);
    h.add_validator(2, 0, 900);
    h.deposit_core(ALICE, core(1_000));

    assert!(matches!(
        h.exec(OPERATOR, EngineOperation::AutoRebalance).unwrap(),
        OperationOutcome::RebalanceSkipped { .. }
    ));

    h.set_active(2, false);
    let moved = h.state.validators.delegated(&val(2));
    let outcome = h.exec(OPERATOR, EngineOperation::AutoRebalance).unwrap();
    assert_eq!(outcome, OperationOutcome::Rebalanced { legs: 1, moved });
    assert_eq!(h.state.validators.delegated(&val(2)), 0);

    h.add_validator(3, 0, 900);
    h.set_active(1, false);
    let outcome = h.exec(OPERATOR, EngineOperation::AutoRebalance).unwrap();
    assert_eq!(
        outcome,
        OperationOutcome::RebalanceSkipped {
            reason: "rebalance interval not elapsed".to_string()
        }
    );

    h.advance(3_600);
    h.exec(OPERATOR, EngineOperation::AutoRebalance).unwrap();
    assert_eq!(h.state.validators.delegated(&val(1)), 0);
    assert_eq!(h.state.validators.delegated(&val(3)), h.state.validators.total_delegated());
}

#[test]
fn test_compound_delegates_surplus_liquidity() {
    let mut h = Harness::new();
    h.add_validator(1, 0, 900);
    h.deposit_core(ALICE, core(1_000));
    h.accrue(AssetKind::Core, core(100)).unwrap();
    assert_eq!(h.state.pool.core_liquid, core(190));

    let outcome = h.exec(OPERATOR, EngineOperation::Compound).unwrap();
    // Reserve target is 10% of 1,090 CORE.
    assert_eq!(outcome, OperationOutcome::Delegated { amount: core(81) });
    assert_eq!(h.state.pool.core_liquid, core(109));
}

// ══════════════════════════════════════════════════════════════
// Registry
// ══════════════════════════════════════════════════════════════

#[test]
fn test_validator_registry_rules() {
    let mut h = Harness::new();
    h.add_validator(1, 0, 900);

    let err = h.rejected(
        OPERATOR,
        EngineOperation::AddValidator {
            validator: val(1),
            commission_bps: 0,
            hybrid_score: 900,
        },
    );
    assert_eq!(err, EngineError::ValidatorExists(val(1)));

    let err = h.rejected(
        OPERATOR,
        EngineOperation::AddValidator {
            validator: val(2),
            commission_bps: 10_001,
            hybrid_score: 900,
        },
    );
    assert_eq!(err, EngineError::InvalidCommission(10_001));

    let err = h.rejected(
        OPERATOR,
        EngineOperation::SetHybridScore {
            validator: val(1),
            hybrid_score: 1_001,
        },
    );
    assert_eq!(err, EngineError::InvalidHybridScore(1_001));

    h.deposit_core(ALICE, core(10));
    let err = h.rejected(OPERATOR, EngineOperation::RemoveValidator { validator: val(1) });
    assert!(matches!(err, EngineError::ValidatorHasDelegation { .. }));

    h.add_validator(2, 0, 500);
    h.exec(OPERATOR, EngineOperation::RemoveValidator { validator: val(2) }).unwrap();
    assert!(!h.state.validators.contains(&val(2)));
}

// ══════════════════════════════════════════════════════════════
// Withdrawal queue
// ══════════════════════════════════════════════════════════════

#[test]
fn test_withdrawal_queue_lifecycle() {
    let mut h = Harness::new();
    h.add_validator(1, 0, 900);
    let btc_amount = units(1, BTC_DECIMALS) / 100;
    let shares = h.deposit(
        ALICE,
        vec![
            AssetAmount::new(AssetKind::Core, core(1_000)),
            AssetAmount::new(AssetKind::Btc, btc_amount),
        ],
    );
    assert_eq!(shares, usd(1_800));

    let outcome = h.exec(ALICE, EngineOperation::RequestWithdrawal { shares }).unwrap();
    let OperationOutcome::WithdrawalRequested { request_ids, .. } = outcome else {
        panic!("expected a withdrawal request");
    };
    let (core_req, btc_req) = (request_ids[0], request_ids[1]);

    assert_eq!(h.state.pool.total_shares, 0);
    assert_eq!(h.state.validators.total_delegated(), 0, "stake was undelegated");
    assert_eq!(withdrawals::total_queued(&h.state, AssetKind::Core), core(995));
    assert_eq!(withdrawals::total_queued(&h.state, AssetKind::Btc), 995_000);
    assert_eq!(withdrawals::queue_position(&h.state, core_req), Some(0));

    let err = h.rejected(ALICE, EngineOperation::ClaimWithdrawal { request_id: core_req });
    assert!(matches!(err, EngineError::WithdrawalLocked { .. }));

    h.advance(DAY);
    let paid = h.exec(BOB, EngineOperation::ProcessWithdrawals { batch_size: 10 }).unwrap();
    assert_eq!(paid, OperationOutcome::WithdrawalsPaid { request_ids: vec![btc_req] });
    assert_eq!(h.ledger.balance(&ALICE, AssetKind::Btc), units(10, BTC_DECIMALS) - 5_000);

    h.advance(6 * DAY);
    let err = h.rejected(BOB, EngineOperation::ClaimWithdrawal { request_id: core_req });
    assert!(matches!(err, EngineError::Unauthorized { .. }));

    h.exec(ALICE, EngineOperation::ClaimWithdrawal { request_id: core_req }).unwrap();
    assert_eq!(h.ledger.balance(&ALICE, AssetKind::Core), core(1_000_000) - core(5));
    assert_eq!(h.ledger.balance(&POOL_ACCOUNT, AssetKind::Core), h.state.fees_accrued(AssetKind::Core));
    assert!(h.state.withdrawals.is_empty());

    let err = h.rejected(ALICE, EngineOperation::ClaimWithdrawal { request_id: core_req });
    assert_eq!(err, EngineError::WithdrawalNotFound(core_req));
}

#[test]
fn test_instant_liquidity_query() {
    let mut h = Harness::new();
    h.add_validator(1, 0, 900);
    h.deposit_core(ALICE, core(1_000));
    assert!(withdrawals::can_pay_instantly(&h.state, AssetKind::Core, core(100)));
    assert!(!withdrawals::can_pay_instantly(&h.state, AssetKind::Core, core(101)));
}

// ══════════════════════════════════════════════════════════════
// Administration, oracle and settlement
// ══════════════════════════════════════════════════════════════

#[test]
fn test_roles_are_enforced() {
    let mut h = Harness::new();
    let err = h.rejected(
        ALICE,
        EngineOperation::AddValidator {
            validator: val(1),
            commission_bps: 0,
            hybrid_score: 900,
        },
    );
    assert!(matches!(err, EngineError::Unauthorized { role: "operator", .. }));

    let err = h.rejected(OPERATOR, EngineOperation::SetPaused { paused: true });
    assert!(matches!(err, EngineError::Unauthorized { role: "owner", .. }));

    h.exec(OWNER, EngineOperation::AddOperator { account: ALICE }).unwrap();
    h.add_validator(1, 0, 900);
    h.exec(ALICE, EngineOperation::SetCommission { validator: val(1), commission_bps: 100 })
        .unwrap();

    h.exec(OWNER, EngineOperation::TransferOwnership { new_owner: BOB }).unwrap();
    h.rejected(OWNER, EngineOperation::RemoveOperator { account: ALICE });
    h.exec(BOB, EngineOperation::RemoveOperator { account: ALICE }).unwrap();
    assert!(!h.state.roles.operators.contains(&ALICE));
}

#[test]
fn test_pause_blocks_deposits_and_redemptions() {
    let mut h = Harness::new();
    let shares = h.deposit_core(ALICE, core(10));
    h.exec(OWNER, EngineOperation::SetPaused { paused: true }).unwrap();

    let err = h.rejected(
        ALICE,
        EngineOperation::Deposit {
            assets: vec![AssetAmount::new(AssetKind::Core, core(10))],
        },
    );
    assert_eq!(err.to_string(), "engine paused");
    assert_eq!(h.rejected(ALICE, EngineOperation::Redeem { shares }), EngineError::Paused);

    h.exec(OWNER, EngineOperation::SetPaused { paused: false }).unwrap();
    h.exec(ALICE, EngineOperation::Redeem { shares }).unwrap();
}

#[test]
fn test_fee_limits() {
    let mut h = Harness::new();
    let err = h.rejected(
        OWNER,
        EngineOperation::SetFees {
            protocol_fee_bps: 1_001,
            performance_fee_bps: 0,
        },
    );
    assert!(err.to_string().contains("fee too high"));

    let err = h.rejected(
        OWNER,
        EngineOperation::SetFees {
            protocol_fee_bps: 0,
            performance_fee_bps: 2_001,
        },
    );
    assert!(err.to_string().contains("fee too high"));

    h.exec(
        OWNER,
        EngineOperation::SetFees {
            protocol_fee_bps: 1_000,
            performance_fee_bps: 2_000,
        },
    )
    .unwrap();
    assert_eq!(h.state.config.performance_fee_bps, 2_000);
}

#[test]
fn test_collect_fees_pays_owner() {
    let mut h = Harness::new();
    h.deposit_core(ALICE, core(100));
    h.accrue(AssetKind::Core, core(10)).unwrap();

    let outcome = h.exec(OWNER, EngineOperation::CollectFees { asset: AssetKind::Core }).unwrap();
    assert_eq!(outcome, OperationOutcome::FeesCollected(AssetAmount::new(AssetKind::Core, core(1))));
    assert_eq!(h.ledger.balance(&OWNER, AssetKind::Core), core(1));
    assert_eq!(h.state.fees_accrued(AssetKind::Core), 0);

    let err = h.rejected(OWNER, EngineOperation::CollectFees { asset: AssetKind::Core });
    assert_eq!(err, EngineError::InvalidAmount);
}

#[test]
fn test_stale_price_is_rejected_unless_disabled() {
    let mut h = Harness::new();
    h.oracle.set_price("CORE-USD", CORE_PRICE, h.now - 7_200);
    let deposit = EngineOperation::Deposit {
        assets: vec![AssetAmount::new(AssetKind::Core, core(10))],
    };

    let err = h.rejected(ALICE, deposit.clone());
    assert!(matches!(err, EngineError::PriceStale { ref symbol, .. } if symbol == "CORE-USD"));

    let mut config = h.state.config.clone();
    config.staleness_check = false;
    h.exec(OWNER, EngineOperation::UpdateConfig { config }).unwrap();
    h.exec(ALICE, deposit).unwrap();
}

#[test]
fn test_missing_price_is_rejected() {
    let mut h = Harness::new();
    h.oracle.remove("BTC-USD");
    let err = h.rejected(
        ALICE,
        EngineOperation::Deposit {
            assets: vec![AssetAmount::new(AssetKind::Btc, 100_000)],
        },
    );
    assert_eq!(err, EngineError::PriceUnavailable("BTC-USD".to_string()));
}

#[test]
fn test_failed_settlement_rolls_back() {
    let mut h = Harness::new();
    h.add_validator(1, 0, 900);
    let err = h.rejected(
        CAROL,
        EngineOperation::Deposit {
            assets: vec![AssetAmount::new(AssetKind::Core, core(10))],
        },
    );
    assert!(matches!(err, EngineError::Ledger(_)));
    assert_eq!(h.state.sequence, 1);
}

#[test]
fn test_invalid_config_is_rejected() {
    let mut h = Harness::new();
    let mut config = EngineConfig::default();
    config.tiers.clear();
    let err = h.rejected(OWNER, EngineOperation::UpdateConfig { config });
    assert!(matches!(err, EngineError::Config(_)));
}
