//! Keystore adapter trait.

use crate::StoreError;
use ember_types::{AccountId, Secret};

/// A key reconstructed from the keystore with the right credential.
#[derive(Debug)]
pub struct UnlockedKey {
    pub account: AccountId,
    pub secret: Secret,
}

/// A key to be added to the keystore.
#[derive(Debug)]
pub struct NewKey {
    pub account: AccountId,
    pub secret: Secret,
    /// Password (or pin) the secret is sealed with.
    pub credential: Secret,
    /// Optional display name; empty means unnamed.
    pub name: String,
}

/// Durable, encrypted storage of seeds and credentials.
///
/// Implementations are synchronous and may be slow (key derivation);
/// async callers should move `load` onto a blocking thread.
pub trait KeystoreAdapter: Send + Sync {
    /// All stored accounts, in insertion order.
    fn list(&self) -> Result<Vec<AccountId>, StoreError>;

    /// Display name of a key, if one was given.
    fn key_name(&self, account: &AccountId) -> Result<Option<String>, StoreError>;

    /// Credential remembered for this account, if any.
    fn password_for_account(&self, account: &AccountId) -> Result<Option<Secret>, StoreError>;

    /// Reconstruct the secret. Fails with [`StoreError::Credential`] on a
    /// wrong password or corrupt record.
    fn load(&self, account: &AccountId, password: &Secret) -> Result<UnlockedKey, StoreError>;

    /// Seal and store a key. Adding an existing account replaces it.
    fn add(&self, key: NewKey) -> Result<(), StoreError>;

    /// Remove a key and its remembered credential.
    fn remove(&self, account: &AccountId) -> Result<(), StoreError>;

    /// Remember a credential for the session and later restarts.
    fn remember_password(&self, account: &AccountId, credential: &Secret) -> Result<(), StoreError>;

    /// Export every sealed key as an opaque blob.
    fn export(&self) -> Result<Vec<u8>, StoreError>;

    /// Import sealed keys from a blob produced by [`KeystoreAdapter::export`].
    /// Accounts already present are skipped. Returns the accounts added.
    fn import(&self, blob: &[u8]) -> Result<Vec<AccountId>, StoreError>;
}
