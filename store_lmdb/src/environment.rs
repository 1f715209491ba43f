//! LMDB environment setup.

use std::path::Path;
use std::sync::Arc;

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};

use crate::{KdfParams, LmdbCreatedAddressStore, LmdbError, LmdbKeystore};

const MAX_DBS: u32 = 8;

/// Wraps the LMDB environment and all database handles.
pub struct LmdbEnvironment {
    env: Arc<Env>,
    keys_db: Database<Bytes, Bytes>,
    passwords_db: Database<Bytes, Bytes>,
    order_db: Database<Bytes, Bytes>,
    created_db: Database<Bytes, Bytes>,
    kdf: KdfParams,
}

impl LmdbEnvironment {
    /// Open or create an LMDB environment at the given path with the default
    /// key derivation cost.
    pub fn open(path: &Path, map_size: usize) -> Result<Self, LmdbError> {
        Self::open_with_kdf(path, map_size, KdfParams::default())
    }

    /// Open or create an LMDB environment; newly sealed keys use `kdf`.
    pub fn open_with_kdf(path: &Path, map_size: usize, kdf: KdfParams) -> Result<Self, LmdbError> {
        std::fs::create_dir_all(path)
            .map_err(|e| LmdbError::Heed(format!("create {}: {e}", path.display())))?;

        // SAFETY: the environment is opened once per path per process; callers
        // must not open the same directory twice concurrently.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(MAX_DBS)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let keys_db = env.create_database(&mut wtxn, Some("keys"))?;
        let passwords_db = env.create_database(&mut wtxn, Some("passwords"))?;
        let order_db = env.create_database(&mut wtxn, Some("order"))?;
        let created_db = env.create_database(&mut wtxn, Some("created"))?;
        wtxn.commit()?;

        tracing::debug!(path = %path.display(), map_size, "opened LMDB environment");

        Ok(Self {
            env: Arc::new(env),
            keys_db,
            passwords_db,
            order_db,
            created_db,
            kdf,
        })
    }

    /// Keystore adapter over this environment.
    pub fn keystore(&self) -> LmdbKeystore {
        LmdbKeystore {
            env: Arc::clone(&self.env),
            keys_db: self.keys_db,
            passwords_db: self.passwords_db,
            order_db: self.order_db,
            kdf: self.kdf,
        }
    }

    /// Created-address record over this environment.
    pub fn created_address_store(&self) -> LmdbCreatedAddressStore {
        LmdbCreatedAddressStore {
            env: Arc::clone(&self.env),
            created_db: self.created_db,
        }
    }
}
