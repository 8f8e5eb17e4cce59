use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Underlying assets the basket accepts.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetKind {
    /// Native CORE, 18 decimals. The only asset delegated to validators.
    Core,
    /// BTC-pegged token, 8 decimals.
    Btc,
}

impl AssetKind {
    pub const ALL: [AssetKind; 2] = [AssetKind::Core, AssetKind::Btc];

    pub fn symbol(&self) -> &'static str {
        match self {
            AssetKind::Core => "CORE",
            AssetKind::Btc => "BTC",
        }
    }

    /// Oracle feed symbol, quoted in USD.
    pub fn price_symbol(&self) -> &'static str {
        match self {
            AssetKind::Core => "CORE-USD",
            AssetKind::Btc => "BTC-USD",
        }
    }

    pub fn decimals(&self) -> u8 {
        match self {
            AssetKind::Core => crate::fixed::CORE_DECIMALS,
            AssetKind::Btc => crate::fixed::BTC_DECIMALS,
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for AssetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "core" => Ok(AssetKind::Core),
            "btc" | "corebtc" => Ok(AssetKind::Btc),
            other => Err(format!("unknown asset '{}', use core or btc", other)),
        }
    }
}
