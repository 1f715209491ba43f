//! LMDB storage backend for the Ember wallet.
//!
//! Implements the storage traits from `ember-store` using the `heed` LMDB
//! bindings. Every logical store maps to one or more databases within a single
//! environment.

pub mod created;
pub mod environment;
pub mod error;
pub mod keystore;
pub mod seal;

pub use created::LmdbCreatedAddressStore;
pub use environment::LmdbEnvironment;
pub use error::LmdbError;
pub use keystore::LmdbKeystore;
pub use seal::{KdfParams, SealedSecret};
