use std::time::Duration;

use ember_store::StoreError;
use ember_types::CurrencyKind;
use thiserror::Error;

/// Failure of an external fetch: balance API or derivation provider.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("task failed: {0}")]
    Task(String),
}

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("wallet entry not found")]
    EntryNotFound,

    #[error("wallet entry is locked")]
    Locked,

    /// The secondary wallet is not bootstrapped or its addresses are still
    /// loading.
    #[error("{0} addresses are not ready yet")]
    NotReady(CurrencyKind),

    #[error("{0} addresses cannot be derived")]
    NotDerivable(CurrencyKind),

    /// The frontier address has not been used yet.
    #[error("address #{index} must be used before a new one can be created")]
    SequencingViolation { index: u32 },

    #[error("no address available at derivation index {index}")]
    DerivationExhausted { index: u32 },

    #[error("wrong password or corrupted key data")]
    Credential,

    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("storage error: {0}")]
    Store(StoreError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<StoreError> for WalletError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Credential => WalletError::Credential,
            other => WalletError::Store(other),
        }
    }
}
