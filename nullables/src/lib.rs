//! Nullable infrastructure for deterministic testing.
//!
//! Every external collaborator of the wallet manager (keystore, created
//! address record, derivation provider, balance API) has an in-memory
//! implementation here that:
//! - Returns deterministic values
//! - Can be controlled programmatically (failures, held responses)
//! - Counts calls for assertions
//! - Never touches the filesystem or network
//!
//! Usage: swap real implementations for nullables in tests.

pub mod derivation;
pub mod gate;
pub mod network;
pub mod store;

pub use derivation::NullDerivationProvider;
pub use gate::Gate;
pub use network::NullBalanceApi;
pub use store::{NullCreatedAddressStore, NullKeystore};
