//! Fundamental types for the Ember wallet.
//!
//! This crate defines the types shared across every other crate in the workspace:
//! account identifiers, currency kinds, token balances, display amounts, and
//! zeroizing secret material.

pub mod account;
pub mod amount;
pub mod currency;
pub mod error;
pub mod secret;
pub mod token;

pub use account::AccountId;
pub use amount::{comma_format, format_fixed, format_qnt};
pub use currency::CurrencyKind;
pub use error::EmberError;
pub use secret::Secret;
pub use token::TokenBalance;
