//! Top-level error type shared across crates.

use thiserror::Error;

/// Common low-level error type for the Ember wallet.
#[derive(Debug, Error)]
pub enum EmberError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid account id: {0}")]
    InvalidAccount(String),

    #[error("{0}")]
    Other(String),
}
