use anyhow::{bail, Result};
use clap::Parser;
use corestake_execution::ledger::{InMemoryLedger, TokenLedger, POOL_ACCOUNT};
use corestake_execution::queries::pool_info;
use corestake_execution::{check_invariants, execute_operation};
use corestake_genesis::create_genesis_state;
use corestake_oracles::StaticOracle;
use corestake_types::fixed::{format_wad, mul_div, units, BTC_DECIMALS, CORE_DECIMALS, WAD};
use corestake_types::{
    AccountId, AssetAmount, AssetKind, EngineOperation, EngineState, OperationRequest,
    ValidatorId,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::time::Instant;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "CoreStake randomized engine simulation")]
struct Args {
    /// Depositor accounts.
    #[arg(long, default_value_t = 50)]
    accounts: usize,
    /// Random operations to apply.
    #[arg(long, default_value_t = 20_000)]
    steps: usize,
    #[arg(long, default_value_t = 7)]
    seed: u64,
}

const OWNER: AccountId = AccountId::from_byte(0xaa);
const START: u64 = 1_700_000_000;

struct Sim {
    state: EngineState,
    oracle: StaticOracle,
    ledger: InMemoryLedger,
    accounts: Vec<AccountId>,
    rng: StdRng,
    now: u64,
    rewards: BTreeMap<AssetKind, u128>,
    prices: BTreeMap<AssetKind, u128>,
}

#[derive(Debug, Default)]
struct Report {
    applied: BTreeMap<&'static str, u64>,
    rejected: BTreeMap<&'static str, u64>,
    dilutions: u64,
}

fn account(i: usize) -> AccountId {
    let mut bytes = [0u8; 20];
    bytes[..8].copy_from_slice(&(i as u64 + 1).to_be_bytes());
    AccountId::new(bytes)
}

impl Sim {
    fn new(args: &Args) -> Result<Self> {
        let genesis = create_genesis_state(OWNER, START)?;
        let mut ledger = genesis.ledger;
        let accounts: Vec<AccountId> = (0..args.accounts).map(account).collect();
        for a in &accounts {
            ledger.mint(*a, AssetKind::Core, units(1_000_000, CORE_DECIMALS));
            ledger.mint(*a, AssetKind::Btc, units(50, BTC_DECIMALS));
        }
        let mut sim = Self {
            state: genesis.state,
            oracle: genesis.oracle,
            ledger,
            accounts,
            rng: StdRng::seed_from_u64(args.seed),
            now: START,
            rewards: BTreeMap::new(),
            prices: BTreeMap::from([
                (AssetKind::Core, units(7, 18) / 10),
                (AssetKind::Btc, units(110_000, 18)),
            ]),
        };
        sim.push_prices();
        Ok(sim)
    }

    fn push_prices(&mut self) {
        for (asset, price) in &self.prices {
            self.oracle.set_price(asset.price_symbol(), *price, self.now);
        }
    }

    fn share_price(&self) -> u128 {
        pool_info(&self.state, &self.oracle, self.now)
            .map(|i| i.share_price)
            .unwrap_or(WAD)
    }

    fn random_operation(&mut self) -> (AccountId, EngineOperation) {
        let who = self.accounts[self.rng.gen_range(0..self.accounts.len())];
        let held = self.state.shares_of(&who);
        match self.rng.gen_range(0..12) {
            0 | 1 => {
                let amount = units(self.rng.gen_range(1..5_000), CORE_DECIMALS);
                (who, EngineOperation::Deposit { assets: vec![AssetAmount::new(AssetKind::Core, amount)] })
            }
            2 => {
                let amount = self.rng.gen_range(10_000..10_000_000);
                (who, EngineOperation::Deposit { assets: vec![AssetAmount::new(AssetKind::Btc, amount)] })
            }
            3 => {
                let core_amount = units(self.rng.gen_range(100..400_000), CORE_DECIMALS);
                let btc_amount = self.rng.gen_range(10_000..100_000_000);
                (who, EngineOperation::DepositDual { core_amount, btc_amount })
            }
            4 => (who, EngineOperation::Redeem { shares: held / self.rng.gen_range(1..20) }),
            5 => (who, EngineOperation::RequestWithdrawal { shares: held / self.rng.gen_range(1..10) }),
            6 => {
                let pending: Vec<(u64, AccountId)> = self.state.withdrawals.pending().map(|r| (r.id, r.requester)).collect();
                match pending.get(self.rng.gen_range(0..pending.len().max(1))) {
                    Some((id, requester)) => (*requester, EngineOperation::ClaimWithdrawal { request_id: *id }),
                    None => (who, EngineOperation::ProcessWithdrawals { batch_size: 10 }),
                }
            }
            7 => {
                let asset = if self.rng.gen_bool(0.8) { AssetKind::Core } else { AssetKind::Btc };
                let held = self.state.holdings(asset);
                let cursor = self.rewards.entry(asset).or_default();
                *cursor += held / 10_000 * self.rng.gen_range(0..20);
                (OWNER, EngineOperation::AccrueRewards { asset, cumulative_amount: *cursor })
            }
            8 => {
                let validator = ValidatorId::from_byte(0x11 + self.rng.gen_range(0..3));
                (OWNER, EngineOperation::SetHybridScore { validator, hybrid_score: self.rng.gen_range(300..1000) })
            }
            9 => {
                let validator = ValidatorId::from_byte(0x11 + self.rng.gen_range(0..3));
                (OWNER, EngineOperation::SetValidatorStatus { validator, active: self.rng.gen_bool(0.7) })
            }
            10 => (OWNER, EngineOperation::AutoRebalance),
            _ => (OWNER, EngineOperation::Compound),
        }
    }

    fn move_prices(&mut self) {
        for price in self.prices.values_mut() {
            let bps: u128 = self.rng.gen_range(9_500..=10_500);
            *price = (*price * bps / 10_000).max(1);
        }
        self.push_prices();
    }

    /// The pool's custody account must hold exactly what the engine owes.
    fn check_custody(&self) -> Result<()> {
        for asset in AssetKind::ALL {
            let owed = self.state.holdings(asset)
                + self.state.fees_accrued(asset)
                + self.state.withdrawals.total_queued(asset);
            let held = self.ledger.balance(&POOL_ACCOUNT, asset);
            if held != owed {
                bail!("{} custody {} != owed {}", asset, held, owed);
            }
        }
        Ok(())
    }

    fn step(&mut self, report: &mut Report) -> Result<()> {
        self.now += self.rng.gen_range(60..6 * 3600);
        if self.rng.gen_bool(0.05) {
            self.move_prices();
        } else {
            self.push_prices();
        }

        let (caller, operation) = self.random_operation();
        let name = operation.name();
        let price_before = self.share_price();
        let request = OperationRequest::new(caller, operation, self.now);
        match execute_operation(&request, &mut self.state, &self.oracle, &mut self.ledger) {
            Ok(_) => {
                *report.applied.entry(name).or_default() += 1;
                if matches!(name, "deposit" | "deposit_dual" | "redeem" | "request_withdrawal") {
                    let after = self.share_price();
                    let supply = self.state.pool.total_shares;
                    let slack = mul_div(2, WAD, supply).unwrap_or(u128::MAX).saturating_add(1);
                    if supply > 0 && price_before.saturating_sub(after) > slack {
                        report.dilutions += 1;
                    }
                }
            }
            Err(_) => *report.rejected.entry(name).or_default() += 1,
        }

        check_invariants(&self.state)?;
        self.check_custody()
    }
}

fn run_simulation(args: &Args) -> Result<Report> {
    let mut sim = Sim::new(args)?;
    let mut report = Report::default();
    let start = Instant::now();
    for _ in 0..args.steps {
        sim.step(&mut report)?;
    }
    let elapsed = start.elapsed();

    println!("=== CoreStake Simulation ===");
    println!("Accounts: {}, steps: {}, seed: {}", args.accounts, args.steps, args.seed);
    for (op, count) in &report.applied {
        let rejected = report.rejected.get(op).copied().unwrap_or(0);
        println!("  {:<22} applied {:>7}  rejected {:>7}", op, count, rejected);
    }
    println!("Share price: ${}", format_wad(sim.share_price(), 6));
    println!("Total shares: {}", format_wad(sim.state.pool.total_shares, 2));
    println!("Delegated CORE: {}", format_wad(sim.state.validators.total_delegated(), 2));
    println!("Queued withdrawals: {}", sim.state.withdrawals.len());
    println!("Dilution events: {}", report.dilutions);
    println!("Elapsed: {:.2?}", elapsed);
    Ok(report)
}

fn main() -> Result<()> {
    let args = Args::parse();
    run_simulation(&args)?;
    Ok(())
}
