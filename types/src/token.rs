//! Token sub-balances carried by a currency address.

use serde::{Deserialize, Serialize};

/// Balance of one issued token held by an address.
///
/// `address` is the token's asset id (base-currency assets) or contract
/// address (secondary-currency tokens). `balance` is display-formatted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBalance {
    pub name: String,
    pub symbol: String,
    pub address: String,
    pub balance: String,
}

impl TokenBalance {
    pub fn new(
        name: impl Into<String>,
        symbol: impl Into<String>,
        address: impl Into<String>,
        balance: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
            address: address.into(),
            balance: balance.into(),
        }
    }
}
