//! Abstract storage traits for the Ember wallet.
//!
//! Every storage backend (LMDB, in-memory for testing) implements these
//! traits. The rest of the codebase depends only on the traits.

pub mod created;
pub mod error;
pub mod keystore;

pub use created::CreatedAddressStore;
pub use error::StoreError;
pub use keystore::{KeystoreAdapter, NewKey, UnlockedKey};
