use crate::asset::AssetKind;
use crate::fixed::{units, BTC_DECIMALS, CORE_DECIMALS, USD_DECIMALS, WAD};
use crate::validator::MAX_HYBRID_SCORE;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

pub const MAX_PROTOCOL_FEE_BPS: u16 = 1000;
pub const MAX_PERFORMANCE_FEE_BPS: u16 = 2000;

const DAY_SECS: u64 = 86_400;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    Bronze,
    Silver,
    Gold,
    Satoshi,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tier::Bronze => "Bronze",
            Tier::Silver => "Silver",
            Tier::Gold => "Gold",
            Tier::Satoshi => "Satoshi",
        };
        f.write_str(name)
    }
}

/// USD bracket and accepted CORE:BTC band of one tier.
///
/// Ratios are whole CORE per whole BTC in 18-decimal fixed point, so
/// `16_000 * WAD` means 16,000 CORE for every BTC deposited.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TierConfig {
    pub tier: Tier,
    pub minimum_usd: u128,
    pub min_ratio: u128,
    pub max_ratio: Option<u128>,
}

impl TierConfig {
    pub fn new(tier: Tier, minimum_usd_whole: u128, min_ratio_whole: u128) -> Self {
        Self {
            tier,
            minimum_usd: units(minimum_usd_whole, USD_DECIMALS),
            min_ratio: min_ratio_whole * WAD,
            max_ratio: None,
        }
    }
}

pub fn default_tiers() -> Vec<TierConfig> {
    vec![
        TierConfig::new(Tier::Bronze, 100, 0),
        TierConfig::new(Tier::Silver, 1_000, 2_000),
        TierConfig::new(Tier::Gold, 10_000, 6_000),
        TierConfig::new(Tier::Satoshi, 50_000, 16_000),
    ]
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("fee too high: {name} is {value} bps, maximum {max} bps")]
    FeeTooHigh { name: &'static str, value: u16, max: u16 },
    #[error("{name} must be at most {max}, got {value}")]
    OutOfRange { name: &'static str, value: u64, max: u64 },
    #[error("at least one tier must be configured")]
    NoTiers,
    #[error("tier {0} configured more than once")]
    DuplicateTier(Tier),
    #[error("tier {0} has min_ratio above max_ratio")]
    InvertedRatioBand(Tier),
    #[error("max_validators must be at least 1")]
    NoValidatorSlots,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Rebalance when the live allocation trails the optimal APY by more than this.
    pub rebalance_threshold_apy_bps: u32,
    /// Rebalance when a held validator's risk score exceeds this (0-1000 scale).
    pub rebalance_threshold_risk: u16,
    /// Validators below this hybrid score never receive new stake.
    pub min_hybrid_score: u16,
    /// Protocol staking APY before commission and score discounts.
    pub base_apy_bps: u32,
    pub max_validators: u32,
    pub min_core_deposit: u128,
    pub min_btc_deposit: u128,
    pub min_usd_value: u128,
    pub tiers: Vec<TierConfig>,
    /// Retained from redemptions.
    pub protocol_fee_bps: u16,
    /// Retained from accrued rewards.
    pub performance_fee_bps: u16,
    /// Share of pool CORE kept undelegated for instant redemptions.
    pub liquidity_reserve_bps: u16,
    pub core_unbonding_secs: u64,
    pub btc_unbonding_secs: u64,
    pub min_rebalance_interval_secs: u64,
    /// When false, quotes flagged stale by the oracle are still accepted.
    pub staleness_check: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rebalance_threshold_apy_bps: 50,
            rebalance_threshold_risk: 600,
            min_hybrid_score: 400,
            base_apy_bps: 800,
            max_validators: 10,
            min_core_deposit: units(1, CORE_DECIMALS),
            min_btc_deposit: units(1, BTC_DECIMALS) / 10_000,
            min_usd_value: units(100, USD_DECIMALS),
            tiers: default_tiers(),
            protocol_fee_bps: 50,
            performance_fee_bps: 1000,
            liquidity_reserve_bps: 1000,
            core_unbonding_secs: 7 * DAY_SECS,
            btc_unbonding_secs: DAY_SECS,
            min_rebalance_interval_secs: 3600,
            staleness_check: true,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_fees(self.protocol_fee_bps, self.performance_fee_bps)?;
        check_range("rebalance_threshold_risk", self.rebalance_threshold_risk as u64, MAX_HYBRID_SCORE as u64)?;
        check_range("min_hybrid_score", self.min_hybrid_score as u64, MAX_HYBRID_SCORE as u64)?;
        check_range("liquidity_reserve_bps", self.liquidity_reserve_bps as u64, 10_000)?;
        check_range("rebalance_threshold_apy_bps", self.rebalance_threshold_apy_bps as u64, 10_000)?;
        if self.max_validators == 0 {
            return Err(ConfigError::NoValidatorSlots);
        }
        if self.tiers.is_empty() {
            return Err(ConfigError::NoTiers);
        }
        let mut seen = BTreeSet::new();
        for tier in &self.tiers {
            if !seen.insert(tier.tier) {
                return Err(ConfigError::DuplicateTier(tier.tier));
            }
            if matches!(tier.max_ratio, Some(max) if max < tier.min_ratio) {
                return Err(ConfigError::InvertedRatioBand(tier.tier));
            }
        }
        Ok(())
    }

    /// Tiers ordered from the highest USD threshold down.
    pub fn tiers_descending(&self) -> Vec<&TierConfig> {
        let mut tiers: Vec<&TierConfig> = self.tiers.iter().collect();
        tiers.sort_by(|a, b| b.minimum_usd.cmp(&a.minimum_usd).then(b.tier.cmp(&a.tier)));
        tiers
    }

    pub fn unbonding_delay(&self, asset: AssetKind) -> u64 {
        match asset {
            AssetKind::Core => self.core_unbonding_secs,
            AssetKind::Btc => self.btc_unbonding_secs,
        }
    }
}

pub fn validate_fees(protocol_fee_bps: u16, performance_fee_bps: u16) -> Result<(), ConfigError> {
    if protocol_fee_bps > MAX_PROTOCOL_FEE_BPS {
        return Err(ConfigError::FeeTooHigh {
            name: "protocol_fee_bps",
            value: protocol_fee_bps,
            max: MAX_PROTOCOL_FEE_BPS,
        });
    }
    if performance_fee_bps > MAX_PERFORMANCE_FEE_BPS {
        return Err(ConfigError::FeeTooHigh {
            name: "performance_fee_bps",
            value: performance_fee_bps,
            max: MAX_PERFORMANCE_FEE_BPS,
        });
    }
    Ok(())
}

fn check_range(name: &'static str, value: u64, max: u64) -> Result<(), ConfigError> {
    if value > max {
        return Err(ConfigError::OutOfRange { name, value, max });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(EngineConfig::default().validate(), Ok(()));
    }

    #[test]
    fn fee_caps_are_enforced() {
        let mut config = EngineConfig::default();
        config.protocol_fee_bps = 1001;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("fee too high"));

        config.protocol_fee_bps = 1000;
        config.performance_fee_bps = 2001;
        assert!(matches!(config.validate(), Err(ConfigError::FeeTooHigh { name: "performance_fee_bps", .. })));

        config.performance_fee_bps = 2000;
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn tiers_walk_from_satoshi_down() {
        let config = EngineConfig::default();
        let order: Vec<Tier> = config.tiers_descending().iter().map(|t| t.tier).collect();
        assert_eq!(order, vec![Tier::Satoshi, Tier::Gold, Tier::Silver, Tier::Bronze]);
    }

    #[test]
    fn duplicate_tiers_are_rejected() {
        let mut config = EngineConfig::default();
        config.tiers.push(TierConfig::new(Tier::Gold, 20_000, 1));
        assert_eq!(config.validate(), Err(ConfigError::DuplicateTier(Tier::Gold)));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"protocol_fee_bps": 25}"#).unwrap();
        assert_eq!(config.protocol_fee_bps, 25);
        assert_eq!(config.rebalance_threshold_risk, 600);
    }
}
