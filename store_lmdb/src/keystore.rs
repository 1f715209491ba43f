//! LMDB implementation of KeystoreAdapter.

use std::sync::Arc;

use heed::types::Bytes;
use heed::{Database, Env, RwTxn};
use serde::{Deserialize, Serialize};

use ember_store::{KeystoreAdapter, NewKey, StoreError, UnlockedKey};
use ember_types::{AccountId, Secret};

use crate::seal::{self, KdfParams, SealedSecret};
use crate::LmdbError;

const EXPORT_VERSION: u32 = 1;

/// A key record as stored in the `keys` database.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredKey {
    /// Position in the `order` database.
    seq: u64,
    name: String,
    sealed: SealedSecret,
}

/// Export document; the blob handed out by [`KeystoreAdapter::export`].
#[derive(Debug, Serialize, Deserialize)]
struct ExportFile {
    version: u32,
    keys: Vec<ExportedKey>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ExportedKey {
    account: AccountId,
    #[serde(default)]
    name: String,
    sealed: SealedSecret,
}

pub struct LmdbKeystore {
    pub(crate) env: Arc<Env>,
    pub(crate) keys_db: Database<Bytes, Bytes>,
    pub(crate) passwords_db: Database<Bytes, Bytes>,
    pub(crate) order_db: Database<Bytes, Bytes>,
    pub(crate) kdf: KdfParams,
}

impl LmdbKeystore {
    fn get_stored(&self, account: &AccountId) -> Result<Option<StoredKey>, LmdbError> {
        let rtxn = self.env.read_txn()?;
        match self.keys_db.get(&rtxn, account.as_str().as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(bytes)?)),
            None => Ok(None),
        }
    }

    /// Write a key record, reusing its order slot when it already exists.
    fn put_sealed(
        &self,
        wtxn: &mut RwTxn,
        account: &AccountId,
        name: String,
        sealed: SealedSecret,
    ) -> Result<(), LmdbError> {
        let key = account.as_str().as_bytes();
        let existing = match self.keys_db.get(wtxn, key)? {
            Some(bytes) => Some(bincode::deserialize::<StoredKey>(bytes)?.seq),
            None => None,
        };
        let seq = match existing {
            Some(seq) => seq,
            None => {
                let next = match self.order_db.last(wtxn)? {
                    Some((k, _)) => decode_seq(k)? + 1,
                    None => 0,
                };
                self.order_db.put(wtxn, &next.to_be_bytes(), key)?;
                next
            }
        };
        let record = StoredKey { seq, name, sealed };
        self.keys_db.put(wtxn, key, &bincode::serialize(&record)?)?;
        Ok(())
    }
}

fn decode_seq(bytes: &[u8]) -> Result<u64, LmdbError> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| LmdbError::Serialization("invalid order key length".into()))?;
    Ok(u64::from_be_bytes(arr))
}

impl KeystoreAdapter for LmdbKeystore {
    fn list(&self) -> Result<Vec<AccountId>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let mut accounts = Vec::new();
        for entry in self.order_db.iter(&rtxn).map_err(LmdbError::from)? {
            let (_, val) = entry.map_err(LmdbError::from)?;
            let account =
                std::str::from_utf8(val).map_err(|e| LmdbError::Serialization(e.to_string()))?;
            accounts.push(AccountId::new(account));
        }
        Ok(accounts)
    }

    fn key_name(&self, account: &AccountId) -> Result<Option<String>, StoreError> {
        let stored = self
            .get_stored(account)?
            .ok_or_else(|| StoreError::NotFound(account.to_string()))?;
        Ok(Some(stored.name).filter(|n| !n.is_empty()))
    }

    fn password_for_account(&self, account: &AccountId) -> Result<Option<Secret>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let value = self
            .passwords_db
            .get(&rtxn, account.as_str().as_bytes())
            .map_err(LmdbError::from)?;
        match value {
            Some(bytes) => {
                let text = std::str::from_utf8(bytes)
                    .map_err(|e| LmdbError::Serialization(e.to_string()))?;
                Ok(Some(Secret::new(text)))
            }
            None => Ok(None),
        }
    }

    fn load(&self, account: &AccountId, password: &Secret) -> Result<UnlockedKey, StoreError> {
        let stored = self
            .get_stored(account)?
            .ok_or_else(|| StoreError::NotFound(account.to_string()))?;
        let secret = seal::open(&stored.sealed, password)?;
        Ok(UnlockedKey {
            account: account.clone(),
            secret,
        })
    }

    fn add(&self, key: NewKey) -> Result<(), StoreError> {
        let sealed = seal::seal(&key.secret, &key.credential, self.kdf)?;
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.put_sealed(&mut wtxn, &key.account, key.name, sealed)?;
        wtxn.commit().map_err(LmdbError::from)?;
        tracing::debug!(account = %key.account, "stored key");
        Ok(())
    }

    fn remove(&self, account: &AccountId) -> Result<(), StoreError> {
        let key = account.as_str().as_bytes();
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let seq = match self.keys_db.get(&wtxn, key).map_err(LmdbError::from)? {
            Some(bytes) => bincode::deserialize::<StoredKey>(bytes)
                .map_err(LmdbError::from)?
                .seq,
            None => return Err(StoreError::NotFound(account.to_string())),
        };
        self.order_db
            .delete(&mut wtxn, &seq.to_be_bytes())
            .map_err(LmdbError::from)?;
        self.keys_db.delete(&mut wtxn, key).map_err(LmdbError::from)?;
        self.passwords_db
            .delete(&mut wtxn, key)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        tracing::debug!(account = %account, "removed key");
        Ok(())
    }

    fn remember_password(&self, account: &AccountId, credential: &Secret) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.passwords_db
            .put(
                &mut wtxn,
                account.as_str().as_bytes(),
                credential.expose().as_bytes(),
            )
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn export(&self) -> Result<Vec<u8>, StoreError> {
        let mut keys = Vec::new();
        for account in self.list()? {
            if let Some(stored) = self.get_stored(&account)? {
                keys.push(ExportedKey {
                    account,
                    name: stored.name,
                    sealed: stored.sealed,
                });
            }
        }
        let file = ExportFile {
            version: EXPORT_VERSION,
            keys,
        };
        Ok(serde_json::to_vec_pretty(&file).map_err(LmdbError::from)?)
    }

    fn import(&self, blob: &[u8]) -> Result<Vec<AccountId>, StoreError> {
        let file: ExportFile = serde_json::from_slice(blob).map_err(LmdbError::from)?;
        if file.version != EXPORT_VERSION {
            return Err(StoreError::Serialization(format!(
                "unsupported export version: {}",
                file.version
            )));
        }

        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let mut added = Vec::new();
        for key in file.keys {
            let exists = self
                .keys_db
                .get(&wtxn, key.account.as_str().as_bytes())
                .map_err(LmdbError::from)?
                .is_some();
            if exists {
                continue;
            }
            self.put_sealed(&mut wtxn, &key.account, key.name, key.sealed)?;
            added.push(key.account);
        }
        wtxn.commit().map_err(LmdbError::from)?;
        tracing::info!(added = added.len(), "imported keys");
        Ok(added)
    }
}
