//! Nullable balance API: canned chain responses without a network.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use ember_types::AccountId;
use ember_wallet_core::{AccountSnapshot, AssetBalance, AssetInfo, BalanceApi, FetchError, PageRequest};

use crate::Gate;

/// A test balance API that answers from in-memory tables.
///
/// Unknown accounts fail with [`FetchError::NotFound`], like a chain that
/// has never seen the account.
pub struct NullBalanceApi {
    accounts: Mutex<HashMap<AccountId, u128>>,
    balances: Mutex<HashMap<AccountId, Vec<AssetBalance>>>,
    assets: Mutex<HashMap<String, AssetInfo>>,
    failing_assets: Mutex<HashSet<String>>,
    gate: Gate,
    account_calls: AtomicUsize,
    page_calls: AtomicUsize,
    info_calls: AtomicUsize,
}

impl NullBalanceApi {
    pub fn new() -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            balances: Mutex::new(HashMap::new()),
            assets: Mutex::new(HashMap::new()),
            failing_assets: Mutex::new(HashSet::new()),
            gate: Gate::new(),
            account_calls: AtomicUsize::new(0),
            page_calls: AtomicUsize::new(0),
            info_calls: AtomicUsize::new(0),
        }
    }

    /// A known account with an unconfirmed balance in raw units.
    pub fn with_account(self, account: &str, unconfirmed_balance: u128) -> Self {
        self.accounts
            .lock()
            .unwrap()
            .insert(AccountId::new(account), unconfirmed_balance);
        self
    }

    /// An asset held by `account`, with its metadata. Decimals default to 8.
    pub fn with_asset(self, account: &str, id: &str, name: &str, symbol: &str, balance: u128) -> Self {
        self.balances
            .lock()
            .unwrap()
            .entry(AccountId::new(account))
            .or_default()
            .push(AssetBalance {
                id: id.to_string(),
                virtual_balance: balance,
            });
        self.assets.lock().unwrap().insert(
            id.to_string(),
            AssetInfo {
                id: id.to_string(),
                name: name.to_string(),
                symbol: symbol.to_string(),
                decimals: 8,
            },
        );
        self
    }

    /// Override the decimals an asset's metadata reports.
    pub fn with_decimals(self, id: &str, decimals: u8) -> Self {
        if let Some(info) = self.assets.lock().unwrap().get_mut(id) {
            info.decimals = decimals;
        }
        self
    }

    /// Make metadata lookups for `id` fail.
    pub fn fail_asset(&self, id: &str) {
        self.failing_assets.lock().unwrap().insert(id.to_string());
    }

    pub fn set_balance(&self, account: &str, unconfirmed_balance: u128) {
        self.accounts
            .lock()
            .unwrap()
            .insert(AccountId::new(account), unconfirmed_balance);
    }

    /// Held calls to `account` wait here.
    pub fn gate(&self) -> &Gate {
        &self.gate
    }

    pub fn account_calls(&self) -> usize {
        self.account_calls.load(Ordering::SeqCst)
    }

    pub fn page_calls(&self) -> usize {
        self.page_calls.load(Ordering::SeqCst)
    }

    pub fn info_calls(&self) -> usize {
        self.info_calls.load(Ordering::SeqCst)
    }
}

impl Default for NullBalanceApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BalanceApi for NullBalanceApi {
    async fn account(&self, account: &AccountId) -> Result<AccountSnapshot, FetchError> {
        self.gate.wait().await;
        self.account_calls.fetch_add(1, Ordering::SeqCst);
        self.accounts
            .lock()
            .unwrap()
            .get(account)
            .map(|balance| AccountSnapshot {
                account: account.clone(),
                unconfirmed_balance: *balance,
            })
            .ok_or_else(|| FetchError::NotFound(account.to_string()))
    }

    async fn balances(
        &self,
        account: &AccountId,
        page: &PageRequest,
    ) -> Result<Vec<AssetBalance>, FetchError> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        let balances = self.balances.lock().unwrap();
        let rows = balances.get(account).map(Vec::as_slice).unwrap_or(&[]);
        Ok(rows
            .iter()
            .skip(page.from as usize)
            .take(page.len() as usize)
            .cloned()
            .collect())
    }

    async fn asset_info(&self, asset_id: &str) -> Result<AssetInfo, FetchError> {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_assets.lock().unwrap().contains(asset_id) {
            return Err(FetchError::Transport(format!("asset {asset_id} lookup failed")));
        }
        self.assets
            .lock()
            .unwrap()
            .get(asset_id)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(asset_id.to_string()))
    }
}
