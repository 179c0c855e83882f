//! Asset and Currency Types
//!
//! Closed enumerations for everything money-shaped. Balances are held and
//! settled in an [`Asset`]; wagers may be quoted in a [`Currency`] and are
//! converted by an external price collaborator before they reach the engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Settlement asset — the unit a balance is actually debited and credited in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Asset {
    /// Bitcoin wallet balance.
    Bitcoin,
    /// Ethereum wallet balance.
    Ethereum,
}

impl Asset {
    /// Ticker symbol.
    pub fn symbol(self) -> &'static str {
        match self {
            Asset::Bitcoin => "BTC",
            Asset::Ethereum => "ETH",
        }
    }

    /// All supported assets.
    pub fn all() -> [Asset; 2] {
        [Asset::Bitcoin, Asset::Ethereum]
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Asset {
    type Err = UnknownAsset;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "btc" | "bitcoin" => Ok(Asset::Bitcoin),
            "eth" | "ethereum" => Ok(Asset::Ethereum),
            _ => Err(UnknownAsset(s.to_string())),
        }
    }
}

/// Parse failure for an asset name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown asset: {0}")]
pub struct UnknownAsset(pub String);

/// Currency a wager was quoted in, kept for audit records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// US dollars, converted to the settlement asset at bet time.
    Usd,
    /// Bitcoin, staked directly.
    Btc,
    /// Ethereum, staked directly.
    Eth,
}

impl Currency {
    /// Currency code.
    pub fn code(self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Btc => "BTC",
            Currency::Eth => "ETH",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
