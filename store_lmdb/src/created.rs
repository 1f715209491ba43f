//! LMDB implementation of CreatedAddressStore.
//!
//! Keys are `account 0x00 address`; values are the big-endian creation index
//! within the account, so `created_for` can return creation order.

use std::sync::Arc;

use heed::types::Bytes;
use heed::{Database, Env};

use ember_store::{CreatedAddressStore, StoreError};
use ember_types::AccountId;

use crate::LmdbError;

const SEPARATOR: u8 = 0;

pub struct LmdbCreatedAddressStore {
    pub(crate) env: Arc<Env>,
    pub(crate) created_db: Database<Bytes, Bytes>,
}

fn account_prefix(account: &AccountId) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(account.as_str().len() + 1);
    prefix.extend_from_slice(account.as_str().as_bytes());
    prefix.push(SEPARATOR);
    prefix
}

fn record_key(account: &AccountId, address: &str) -> Vec<u8> {
    let mut key = account_prefix(account);
    key.extend_from_slice(address.as_bytes());
    key
}

impl CreatedAddressStore for LmdbCreatedAddressStore {
    fn record(&self, account: &AccountId, address: &str) -> Result<(), StoreError> {
        let key = record_key(account, address);
        let prefix = account_prefix(account);
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        if self
            .created_db
            .get(&wtxn, &key)
            .map_err(LmdbError::from)?
            .is_some()
        {
            return Ok(());
        }
        let mut count: u64 = 0;
        for entry in self
            .created_db
            .prefix_iter(&wtxn, &prefix)
            .map_err(LmdbError::from)?
        {
            entry.map_err(LmdbError::from)?;
            count += 1;
        }
        self.created_db
            .put(&mut wtxn, &key, &count.to_be_bytes())
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        tracing::debug!(account = %account, address, "recorded created address");
        Ok(())
    }

    fn created_for(&self, account: &AccountId) -> Result<Vec<String>, StoreError> {
        let prefix = account_prefix(account);
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let mut found = Vec::new();
        for entry in self
            .created_db
            .prefix_iter(&rtxn, &prefix)
            .map_err(LmdbError::from)?
        {
            let (key, val) = entry.map_err(LmdbError::from)?;
            let address = std::str::from_utf8(&key[prefix.len()..])
                .map_err(|e| LmdbError::Serialization(e.to_string()))?;
            let index: [u8; 8] = val
                .try_into()
                .map_err(|_| LmdbError::Serialization("invalid creation index length".into()))?;
            found.push((u64::from_be_bytes(index), address.to_string()));
        }
        found.sort_by_key(|(index, _)| *index);
        Ok(found.into_iter().map(|(_, address)| address).collect())
    }

    fn forget_account(&self, account: &AccountId) -> Result<(), StoreError> {
        let prefix = account_prefix(account);
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let mut keys = Vec::new();
        for entry in self
            .created_db
            .prefix_iter(&wtxn, &prefix)
            .map_err(LmdbError::from)?
        {
            let (key, _) = entry.map_err(LmdbError::from)?;
            keys.push(key.to_vec());
        }
        for key in keys {
            self.created_db
                .delete(&mut wtxn, &key)
                .map_err(LmdbError::from)?;
        }
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LmdbEnvironment;

    fn open_at(path: &std::path::Path) -> LmdbEnvironment {
        LmdbEnvironment::open_with_kdf(path, 1 << 20, crate::seal::test_params()).unwrap()
    }

    #[test]
    fn records_in_creation_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_at(dir.path()).created_address_store();
        let account = AccountId::new("42");
        store.record(&account, "0xfff").unwrap();
        store.record(&account, "0xaaa").unwrap();
        assert_eq!(store.created_for(&account).unwrap(), vec!["0xfff", "0xaaa"]);
    }

    #[test]
    fn record_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_at(dir.path()).created_address_store();
        let account = AccountId::new("42");
        store.record(&account, "0xaaa").unwrap();
        store.record(&account, "0xaaa").unwrap();
        assert_eq!(store.created_for(&account).unwrap().len(), 1);
    }

    #[test]
    fn accounts_sharing_a_prefix_stay_separate() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_at(dir.path()).created_address_store();
        store.record(&AccountId::new("1"), "0x1").unwrap();
        store.record(&AccountId::new("12"), "0x12").unwrap();
        assert_eq!(store.created_for(&AccountId::new("1")).unwrap(), vec!["0x1"]);
        assert_eq!(store.created_for(&AccountId::new("12")).unwrap(), vec!["0x12"]);
    }

    #[test]
    fn forget_account_drops_only_that_account() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_at(dir.path()).created_address_store();
        store.record(&AccountId::new("1"), "0x1").unwrap();
        store.record(&AccountId::new("2"), "0x2").unwrap();
        store.forget_account(&AccountId::new("1")).unwrap();
        assert!(store.created_for(&AccountId::new("1")).unwrap().is_empty());
        assert_eq!(store.created_for(&AccountId::new("2")).unwrap().len(), 1);
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let env = open_at(dir.path());
            env.created_address_store()
                .record(&AccountId::new("7"), "0xbeef")
                .unwrap();
        }
        let env = open_at(dir.path());
        assert_eq!(
            env.created_address_store()
                .created_for(&AccountId::new("7"))
                .unwrap(),
            vec!["0xbeef"]
        );
    }
}
