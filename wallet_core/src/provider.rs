//! Seams to the outside world: the HD derivation provider for the secondary
//! currency and the balance API for the base chain.
//!
//! Both are async traits so that live network clients and the in-memory
//! doubles in `ember-nullables` plug in the same way.

use async_trait::async_trait;
use ember_types::{AccountId, Secret};

use crate::FetchError;

/// A token balance held by a derived secondary-currency address, as reported
/// by the provider. `balance` is a plain decimal string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DerivedTokenBalance {
    pub name: String,
    pub symbol: String,
    pub address: String,
    pub balance: String,
}

/// One address of the deterministic derivation sequence.
#[derive(Clone, Debug)]
pub struct DerivedAddress {
    pub address: String,
    pub private_key: Secret,
    /// Whether the chain has seen activity on this address.
    pub in_use: bool,
    /// Decimal string in whole units.
    pub balance: String,
    pub token_balances: Vec<DerivedTokenBalance>,
}

/// An unlocked HD wallet: the derivation sequence in index order.
#[derive(Clone, Debug, Default)]
pub struct WalletHandle {
    pub addresses: Vec<DerivedAddress>,
}

impl WalletHandle {
    pub fn new(addresses: Vec<DerivedAddress>) -> Self {
        Self { addresses }
    }

    pub fn address(&self, index: u32) -> Option<&DerivedAddress> {
        self.addresses.get(index as usize)
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

#[async_trait]
pub trait DerivationProvider: Send + Sync {
    /// True when `secret` is a mnemonic seed that supports HD derivation.
    fn valid_seed(&self, secret: &Secret) -> bool;

    /// True when `secret` is a raw private key.
    fn valid_private_key(&self, secret: &Secret) -> bool;

    /// Base-chain account identifier controlled by `secret`.
    fn account_id(&self, secret: &Secret) -> Result<AccountId, FetchError>;

    /// Open the HD wallet for `secret`.
    async fn unlock(&self, secret: &Secret, passphrase: &str) -> Result<WalletHandle, FetchError>;

    /// Refresh usage flags and balances of every address in `handle`.
    async fn refresh_address_balances(&self, handle: &mut WalletHandle) -> Result<(), FetchError>;
}

/// Base-chain account state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountSnapshot {
    pub account: AccountId,
    /// Raw integer units (QNT).
    pub unconfirmed_balance: u128,
}

/// One asset balance row of an account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetBalance {
    /// `"0"` is the base currency.
    pub id: String,
    /// Raw integer units.
    pub virtual_balance: u128,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetInfo {
    pub id: String,
    pub name: String,
    pub symbol: String,
    /// As reported by the chain. Token balances are still displayed with the
    /// base currency's decimals.
    pub decimals: u8,
}

/// A window of asset balances. `from` and `to` are inclusive row indices.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub asset_filter: String,
    pub min_confirmations: u32,
    pub from: u32,
    pub to: u32,
}

impl PageRequest {
    /// The `page`-th window of `size` rows over all assets with at least one
    /// confirmation.
    pub fn nth(page: u32, size: u32) -> Self {
        let from = page.saturating_mul(size);
        Self {
            asset_filter: "0".to_string(),
            min_confirmations: 1,
            from,
            to: from.saturating_add(size.saturating_sub(1)),
        }
    }

    pub fn len(&self) -> u32 {
        self.to.saturating_sub(self.from).saturating_add(1)
    }

    pub fn is_empty(&self) -> bool {
        self.to < self.from
    }
}

#[async_trait]
pub trait BalanceApi: Send + Sync {
    async fn account(&self, account: &AccountId) -> Result<AccountSnapshot, FetchError>;

    async fn balances(
        &self,
        account: &AccountId,
        page: &PageRequest,
    ) -> Result<Vec<AssetBalance>, FetchError>;

    async fn asset_info(&self, asset_id: &str) -> Result<AssetInfo, FetchError>;
}
