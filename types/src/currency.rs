//! Currency kinds a wallet entry can hold addresses for.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A currency an entry holds addresses for.
///
/// `Heat` is the base currency: every unlocked entry has exactly one HEAT
/// address, the account itself. `Ethereum` is the secondary currency, derived
/// from the same seed along a BIP44 path by the external derivation provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurrencyKind {
    Heat,
    Ethereum,
}

impl CurrencyKind {
    /// Display name of the currency.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Heat => "HEAT",
            Self::Ethereum => "Ethereum",
        }
    }

    /// Ticker symbol shown next to balances.
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Heat => "HEAT",
            Self::Ethereum => "ETH",
        }
    }

    /// Whether this is the entry's base currency.
    pub fn is_base(&self) -> bool {
        matches!(self, Self::Heat)
    }
}

impl fmt::Display for CurrencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
