//! Wallet core library for Ember.
//!
//! Provides the runtime side of a multi-currency wallet:
//! - The wallet entry tree (entries, currency nodes, tokens)
//! - Gap-free secondary-currency address sequencing
//! - Per-entry unlock state machine over a keystore
//! - Balance fetching and merging with stale-result detection
//! - A flat, display-ordered projection of the tree

pub mod config;
pub mod error;
pub mod flatten;
pub mod manager;
pub mod provider;
pub mod sequencer;
pub mod sync;
mod tasks;
pub mod tree;
mod unlock;

pub use config::{RetryConfig, TokenLookupPolicy, WalletConfig};
pub use error::{FetchError, WalletError};
pub use flatten::{flatten, Projection, Row};
pub use manager::{CreatedAddress, WalletManager, WalletServices, SECONDARY};
pub use provider::{
    AccountSnapshot, AssetBalance, AssetInfo, BalanceApi, DerivationProvider, DerivedAddress,
    DerivedTokenBalance, PageRequest, WalletHandle,
};
pub use sync::UNUSED_ADDRESS;
pub use tree::{CurrencyNode, EntryId, LoadStatus, LockState, NodeId, WalletEntry, WalletTree};
