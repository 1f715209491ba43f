//! Nullable stores: thread-safe in-memory keystore and created-address record.

use ember_store::{CreatedAddressStore, KeystoreAdapter, NewKey, StoreError, UnlockedKey};
use ember_types::{AccountId, Secret};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

struct StoredKey {
    account: AccountId,
    secret: Secret,
    credential: Secret,
    name: String,
}

#[derive(Serialize, Deserialize)]
struct ExportedKey {
    account: String,
    secret: String,
    credential: String,
    name: String,
}

/// An in-memory keystore for testing.
///
/// Secrets are kept in the clear; `load` checks the credential by equality.
pub struct NullKeystore {
    keys: Mutex<Vec<StoredKey>>,
    passwords: Mutex<HashMap<AccountId, Secret>>,
    corrupted: Mutex<HashSet<AccountId>>,
    fail_reads: AtomicBool,
    load_calls: AtomicUsize,
}

impl NullKeystore {
    pub fn new() -> Self {
        Self {
            keys: Mutex::new(Vec::new()),
            passwords: Mutex::new(HashMap::new()),
            corrupted: Mutex::new(HashSet::new()),
            fail_reads: AtomicBool::new(false),
            load_calls: AtomicUsize::new(0),
        }
    }

    /// Add a key sealed with `credential`.
    pub fn with_key(self, account: &str, secret: &str, credential: &str, name: &str) -> Self {
        self.keys.lock().unwrap().push(StoredKey {
            account: AccountId::new(account),
            secret: Secret::new(secret),
            credential: Secret::new(credential),
            name: name.to_string(),
        });
        self
    }

    /// Remember `credential` for `account`, as a previous session would have.
    pub fn with_remembered(self, account: &str, credential: &str) -> Self {
        self.passwords
            .lock()
            .unwrap()
            .insert(AccountId::new(account), Secret::new(credential));
        self
    }

    /// Make every load of `account` fail as unreadable data.
    pub fn corrupt(&self, account: &AccountId) {
        self.corrupted.lock().unwrap().insert(account.clone());
    }

    /// Make name and remembered-password lookups fail.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    fn check_reads(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("read refused".into()));
        }
        Ok(())
    }

    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    pub fn remembered(&self, account: &AccountId) -> Option<Secret> {
        self.passwords.lock().unwrap().get(account).cloned()
    }
}

impl Default for NullKeystore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeystoreAdapter for NullKeystore {
    fn list(&self) -> Result<Vec<AccountId>, StoreError> {
        Ok(self
            .keys
            .lock()
            .unwrap()
            .iter()
            .map(|k| k.account.clone())
            .collect())
    }

    fn key_name(&self, account: &AccountId) -> Result<Option<String>, StoreError> {
        self.check_reads()?;
        Ok(self
            .keys
            .lock()
            .unwrap()
            .iter()
            .find(|k| &k.account == account)
            .map(|k| k.name.clone())
            .filter(|n| !n.is_empty()))
    }

    fn password_for_account(&self, account: &AccountId) -> Result<Option<Secret>, StoreError> {
        self.check_reads()?;
        Ok(self.remembered(account))
    }

    fn load(&self, account: &AccountId, password: &Secret) -> Result<UnlockedKey, StoreError> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        if self.corrupted.lock().unwrap().contains(account) {
            return Err(StoreError::Credential);
        }
        let keys = self.keys.lock().unwrap();
        let key = keys
            .iter()
            .find(|k| &k.account == account)
            .ok_or_else(|| StoreError::NotFound(account.to_string()))?;
        if &key.credential != password {
            return Err(StoreError::Credential);
        }
        Ok(UnlockedKey {
            account: account.clone(),
            secret: key.secret.clone(),
        })
    }

    fn add(&self, key: NewKey) -> Result<(), StoreError> {
        let mut keys = self.keys.lock().unwrap();
        let stored = StoredKey {
            account: key.account,
            secret: key.secret,
            credential: key.credential,
            name: key.name,
        };
        match keys.iter().position(|k| k.account == stored.account) {
            Some(i) => keys[i] = stored,
            None => keys.push(stored),
        }
        Ok(())
    }

    fn remove(&self, account: &AccountId) -> Result<(), StoreError> {
        let mut keys = self.keys.lock().unwrap();
        let before = keys.len();
        keys.retain(|k| &k.account != account);
        if keys.len() == before {
            return Err(StoreError::NotFound(account.to_string()));
        }
        self.passwords.lock().unwrap().remove(account);
        Ok(())
    }

    fn remember_password(&self, account: &AccountId, credential: &Secret) -> Result<(), StoreError> {
        self.passwords
            .lock()
            .unwrap()
            .insert(account.clone(), credential.clone());
        Ok(())
    }

    fn export(&self) -> Result<Vec<u8>, StoreError> {
        let exported: Vec<ExportedKey> = self
            .keys
            .lock()
            .unwrap()
            .iter()
            .map(|k| ExportedKey {
                account: k.account.to_string(),
                secret: k.secret.expose().to_string(),
                credential: k.credential.expose().to_string(),
                name: k.name.clone(),
            })
            .collect();
        serde_json::to_vec(&exported).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn import(&self, blob: &[u8]) -> Result<Vec<AccountId>, StoreError> {
        let exported: Vec<ExportedKey> =
            serde_json::from_slice(blob).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let mut keys = self.keys.lock().unwrap();
        let mut added = Vec::new();
        for key in exported {
            let account = AccountId::new(key.account);
            if keys.iter().any(|k| k.account == account) {
                continue;
            }
            keys.push(StoredKey {
                account: account.clone(),
                secret: Secret::new(key.secret),
                credential: Secret::new(key.credential),
                name: key.name,
            });
            added.push(account);
        }
        Ok(added)
    }
}

/// An in-memory created-address record for testing.
pub struct NullCreatedAddressStore {
    records: Mutex<HashMap<AccountId, Vec<String>>>,
    fail_writes: AtomicBool,
}

impl NullCreatedAddressStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Pre-populate a record, as a previous session would have.
    pub fn with_created(self, account: &str, address: &str) -> Self {
        self.records
            .lock()
            .unwrap()
            .entry(AccountId::new(account))
            .or_default()
            .push(address.to_string());
        self
    }

    /// Make every following `record` fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl Default for NullCreatedAddressStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CreatedAddressStore for NullCreatedAddressStore {
    fn record(&self, account: &AccountId, address: &str) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("write refused".into()));
        }
        let mut records = self.records.lock().unwrap();
        let list = records.entry(account.clone()).or_default();
        if !list.iter().any(|a| a == address) {
            list.push(address.to_string());
        }
        Ok(())
    }

    fn created_for(&self, account: &AccountId) -> Result<Vec<String>, StoreError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(account)
            .cloned()
            .unwrap_or_default())
    }

    fn forget_account(&self, account: &AccountId) -> Result<(), StoreError> {
        self.records.lock().unwrap().remove(account);
        Ok(())
    }
}
