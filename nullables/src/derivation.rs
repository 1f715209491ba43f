//! Nullable derivation provider with scripted HD wallets.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;

use ember_types::{AccountId, Secret};
use ember_wallet_core::{
    DerivationProvider, DerivedAddress, DerivedTokenBalance, FetchError, WalletHandle,
};

use crate::Gate;

/// A derivation provider whose seeds, addresses and chain activity are set
/// up by the test.
///
/// A secret is a valid seed only if registered with [`with_seed`]. Chain
/// activity can be changed at any time with [`set_in_use`]; the next
/// refresh observes it.
///
/// [`with_seed`]: NullDerivationProvider::with_seed
/// [`set_in_use`]: NullDerivationProvider::set_in_use
pub struct NullDerivationProvider {
    seeds: Mutex<HashMap<String, Vec<DerivedAddress>>>,
    private_keys: Mutex<HashSet<String>>,
    accounts: Mutex<HashMap<String, AccountId>>,
    unlock_failures: AtomicU32,
    refresh_failures: AtomicU32,
    gate: Gate,
    unlock_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
}

impl NullDerivationProvider {
    pub fn new() -> Self {
        Self {
            seeds: Mutex::new(HashMap::new()),
            private_keys: Mutex::new(HashSet::new()),
            accounts: Mutex::new(HashMap::new()),
            unlock_failures: AtomicU32::new(0),
            refresh_failures: AtomicU32::new(0),
            gate: Gate::new(),
            unlock_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
        }
    }

    /// Register an HD seed deriving `count` addresses `0x{tag}{index}`, the
    /// first `used` of them active on chain.
    pub fn with_seed(self, secret: &str, tag: &str, count: usize, used: usize) -> Self {
        let addresses = (0..count)
            .map(|i| DerivedAddress {
                address: format!("0x{tag}{i}"),
                private_key: Secret::new(format!("{tag}-key-{i}")),
                in_use: i < used,
                balance: if i < used { "1.25".into() } else { "0".into() },
                token_balances: Vec::new(),
            })
            .collect();
        self.seeds
            .lock()
            .unwrap()
            .insert(secret.to_string(), addresses);
        self
    }

    /// Register a raw private key holding a single address.
    pub fn with_private_key(self, secret: &str, address: &str) -> Self {
        self.private_keys.lock().unwrap().insert(secret.to_string());
        self.seeds.lock().unwrap().insert(
            secret.to_string(),
            vec![DerivedAddress {
                address: address.to_string(),
                private_key: Secret::new(secret),
                in_use: true,
                balance: "0".into(),
                token_balances: Vec::new(),
            }],
        );
        self
    }

    /// Account id returned by `account_id` for `secret`.
    pub fn with_account(self, secret: &str, account: &str) -> Self {
        self.accounts
            .lock()
            .unwrap()
            .insert(secret.to_string(), AccountId::new(account));
        self
    }

    /// Give an address of a registered seed a token balance.
    pub fn with_token(self, secret: &str, index: usize, symbol: &str, balance: &str) -> Self {
        if let Some(address) = self
            .seeds
            .lock()
            .unwrap()
            .get_mut(secret)
            .and_then(|a| a.get_mut(index))
        {
            address.token_balances.push(DerivedTokenBalance {
                name: symbol.to_string(),
                symbol: symbol.to_string(),
                address: format!("0xtoken{symbol}"),
                balance: balance.to_string(),
            });
        }
        self
    }

    /// Change chain activity of one derived address.
    pub fn set_in_use(&self, secret: &str, index: usize, in_use: bool) {
        if let Some(address) = self
            .seeds
            .lock()
            .unwrap()
            .get_mut(secret)
            .and_then(|a| a.get_mut(index))
        {
            address.in_use = in_use;
        }
    }

    /// Fail the next `n` unlocks.
    pub fn fail_unlocks(&self, n: u32) {
        self.unlock_failures.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` balance refreshes.
    pub fn fail_refreshes(&self, n: u32) {
        self.refresh_failures.store(n, Ordering::SeqCst);
    }

    /// Held calls to `unlock` and `refresh_address_balances` wait here.
    pub fn gate(&self) -> &Gate {
        &self.gate
    }

    pub fn unlock_calls(&self) -> usize {
        self.unlock_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for NullDerivationProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DerivationProvider for NullDerivationProvider {
    fn valid_seed(&self, secret: &Secret) -> bool {
        !self.private_keys.lock().unwrap().contains(secret.expose())
            && self.seeds.lock().unwrap().contains_key(secret.expose())
    }

    fn valid_private_key(&self, secret: &Secret) -> bool {
        self.private_keys.lock().unwrap().contains(secret.expose())
    }

    fn account_id(&self, secret: &Secret) -> Result<AccountId, FetchError> {
        self.accounts
            .lock()
            .unwrap()
            .get(secret.expose())
            .cloned()
            .ok_or_else(|| FetchError::InvalidResponse("unknown secret".into()))
    }

    async fn unlock(&self, secret: &Secret, _passphrase: &str) -> Result<WalletHandle, FetchError> {
        self.gate.wait().await;
        self.unlock_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.unlock_failures) {
            return Err(FetchError::Transport("provider unavailable".into()));
        }
        self.seeds
            .lock()
            .unwrap()
            .get(secret.expose())
            .cloned()
            .map(WalletHandle::new)
            .ok_or_else(|| FetchError::InvalidResponse("not an HD seed".into()))
    }

    async fn refresh_address_balances(&self, handle: &mut WalletHandle) -> Result<(), FetchError> {
        self.gate.wait().await;
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.refresh_failures) {
            return Err(FetchError::Transport("balance node unreachable".into()));
        }
        let seeds = self.seeds.lock().unwrap();
        for address in handle.addresses.iter_mut() {
            let current = seeds
                .values()
                .flat_map(|list| list.iter())
                .find(|a| a.address == address.address);
            if let Some(current) = current {
                address.in_use = current.in_use;
                address.balance = current.balance.clone();
                address.token_balances = current.token_balances.clone();
            }
        }
        Ok(())
    }
}
