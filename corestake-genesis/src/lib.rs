//! Initial engine state, price feeds and custody balances.
//!
//! A genesis file is JSON. Every field except `owner` may be omitted.

use anyhow::{Context, Result};
use corestake_execution::ledger::InMemoryLedger;
use corestake_execution::registry;
use corestake_oracles::{OracleManager, PriceReport, DEFAULT_MAX_AGE_SECS};
use corestake_types::fixed::{units, CORE_DECIMALS, BTC_DECIMALS, USD_DECIMALS};
use corestake_types::{AccountId, AssetKind, EngineConfig, EngineState, ValidatorId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GenesisValidator {
    pub id: ValidatorId,
    pub commission_bps: u16,
    pub hybrid_score: u16,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GenesisBalance {
    pub account: AccountId,
    pub asset: AssetKind,
    pub amount: u128,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GenesisConfig {
    pub owner: AccountId,
    #[serde(default)]
    pub operators: Vec<AccountId>,
    #[serde(default)]
    pub genesis_time: u64,
    #[serde(default)]
    pub config: EngineConfig,
    #[serde(default)]
    pub validators: Vec<GenesisValidator>,
    /// Oracle symbol to 18-decimal USD price, reported by the owner.
    #[serde(default)]
    pub prices: BTreeMap<String, u128>,
    #[serde(default = "default_max_age")]
    pub price_max_age_secs: u64,
    /// Price reporters besides the owner and operators.
    #[serde(default)]
    pub reporters: Vec<AccountId>,
    /// Fresh reports needed before a price is served.
    #[serde(default = "default_min_sources")]
    pub oracle_min_sources: usize,
    #[serde(default)]
    pub balances: Vec<GenesisBalance>,
}

fn default_max_age() -> u64 {
    DEFAULT_MAX_AGE_SECS
}

fn default_min_sources() -> usize {
    1
}

/// Everything a node needs to start serving.
pub struct Genesis {
    pub state: EngineState,
    pub oracle: OracleManager,
    pub ledger: InMemoryLedger,
}

impl GenesisConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).with_context(|| format!("reading genesis {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing genesis {}", path.display()))
    }

    pub fn build(&self) -> Result<Genesis> {
        self.config.validate().context("invalid engine config")?;

        let mut state = EngineState::new(self.owner, self.config.clone());
        state.roles.operators.extend(self.operators.iter().copied());

        for v in &self.validators {
            registry::add_validator(&mut state, v.id, v.commission_bps, v.hybrid_score, self.genesis_time)
                .with_context(|| format!("genesis validator {}", v.id))?;
            if !v.active {
                registry::set_status(&mut state, &v.id, false)?;
            }
        }

        let mut oracle = OracleManager::new(self.oracle_min_sources, self.price_max_age_secs);
        oracle.authorize(self.owner);
        for reporter in self.operators.iter().chain(&self.reporters) {
            oracle.authorize(*reporter);
        }
        for (symbol, price) in &self.prices {
            let report = PriceReport {
                reporter: self.owner,
                price: *price,
                timestamp: self.genesis_time,
            };
            oracle
                .submit(symbol, report)
                .with_context(|| format!("genesis price for {}", symbol))?;
        }

        let mut ledger = InMemoryLedger::new();
        for b in &self.balances {
            ledger.mint(b.account, b.asset, b.amount);
        }

        info!(
            owner = %self.owner,
            validators = state.validators.len(),
            prices = self.prices.len(),
            "genesis built"
        );
        Ok(Genesis { state, oracle, ledger })
    }
}

/// Local development genesis: three validators, a funded owner and
/// CORE at $0.70, BTC at $110,000.
pub fn create_genesis_state(owner: AccountId, genesis_time: u64) -> Result<Genesis> {
    let validators = [(0x11, 500, 900), (0x12, 1000, 750), (0x13, 300, 500)]
        .into_iter()
        .map(|(b, commission_bps, hybrid_score)| GenesisValidator {
            id: ValidatorId::from_byte(b),
            commission_bps,
            hybrid_score,
            active: true,
        })
        .collect();

    let prices = BTreeMap::from([
        (
            AssetKind::Core.price_symbol().to_string(),
            units(7, USD_DECIMALS) / 10,
        ),
        (
            AssetKind::Btc.price_symbol().to_string(),
            units(110_000, USD_DECIMALS),
        ),
    ]);

    GenesisConfig {
        owner,
        operators: Vec::new(),
        genesis_time,
        config: EngineConfig::default(),
        validators,
        prices,
        price_max_age_secs: DEFAULT_MAX_AGE_SECS,
        reporters: Vec::new(),
        oracle_min_sources: 1,
        balances: vec![
            GenesisBalance {
                account: owner,
                asset: AssetKind::Core,
                amount: units(1_000_000, CORE_DECIMALS),
            },
            GenesisBalance {
                account: owner,
                asset: AssetKind::Btc,
                amount: units(10, BTC_DECIMALS),
            },
        ],
    }
    .build()
}
