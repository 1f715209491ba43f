//! The wallet manager.
//!
//! Owns the entry tree behind a single async mutex and is the only place
//! that mutates it. Every operation takes the lock, applies a change, and
//! publishes a fresh [`Projection`] on a watch channel. External calls
//! (keystore decryption, balance API, derivation provider) run with the lock
//! released; their results are merged back by id.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{watch, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use ember_store::{CreatedAddressStore, KeystoreAdapter, NewKey};
use ember_types::{format_qnt, AccountId, CurrencyKind, Secret};
use ember_utils::StatsCounter;

use crate::config::WalletConfig;
use crate::flatten::{flatten, Projection};
use crate::provider::{BalanceApi, DerivationProvider, WalletHandle};
use crate::sync::{self, with_timeout, MergeOutcome};
use crate::tasks::TaskTracker;
use crate::tree::{CurrencyNode, EntryId, LoadStatus, LockState, NodeId, WalletEntry, WalletTree};
use crate::unlock::{self, Grant, UnlockStart};
use crate::{sequencer, FetchError, WalletError};

/// The HD-derived currency handled by the sequencer and the secondary load.
pub const SECONDARY: CurrencyKind = CurrencyKind::Ethereum;

const MERGES_APPLIED: &str = "merges_applied";
const MERGES_STALE: &str = "merges_stale";
const SECONDARY_ATTEMPTS: &str = "secondary_attempts";
const SECONDARY_FAILURES: &str = "secondary_failures";

/// External collaborators of a [`WalletManager`].
#[derive(Clone)]
pub struct WalletServices {
    pub keystore: Arc<dyn KeystoreAdapter>,
    pub created: Arc<dyn CreatedAddressStore>,
    pub provider: Arc<dyn DerivationProvider>,
    pub api: Arc<dyn BalanceApi>,
}

/// A secondary-currency address added by [`WalletManager::create_next`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatedAddress {
    pub node: NodeId,
    pub index: u32,
    pub address: String,
}

struct Inner {
    tree: Mutex<WalletTree>,
    projection: watch::Sender<Arc<Projection>>,
    services: WalletServices,
    config: WalletConfig,
    tasks: TaskTracker,
    stats: StatsCounter,
}

/// Cheap to clone; clones share the same tree.
#[derive(Clone)]
pub struct WalletManager {
    inner: Arc<Inner>,
}

impl WalletManager {
    pub fn new(config: WalletConfig, services: WalletServices) -> Self {
        let (projection, _) = watch::channel(Arc::new(Projection::default()));
        Self {
            inner: Arc::new(Inner {
                tree: Mutex::new(WalletTree::new()),
                projection,
                services,
                config,
                tasks: TaskTracker::default(),
                stats: StatsCounter::new(&[
                    MERGES_APPLIED,
                    MERGES_STALE,
                    SECONDARY_ATTEMPTS,
                    SECONDARY_FAILURES,
                ]),
            }),
        }
    }

    pub fn config(&self) -> &WalletConfig {
        &self.inner.config
    }

    async fn tree(&self) -> MutexGuard<'_, WalletTree> {
        self.inner.tree.lock().await
    }

    fn publish(&self, tree: &WalletTree) {
        self.inner.projection.send_replace(Arc::new(flatten(tree)));
    }

    // ── Read side ──────────────────────────────────────────────────────

    /// The latest published projection.
    pub fn projection(&self) -> Arc<Projection> {
        let current = self.inner.projection.borrow();
        Arc::clone(&*current)
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Projection>> {
        self.inner.projection.subscribe()
    }

    pub fn stats(&self) -> HashMap<&'static str, u64> {
        self.inner.stats.snapshot()
    }

    /// Wait until every background fetch has settled.
    pub async fn settle(&self) {
        self.inner.tasks.settle().await;
    }

    /// Background tasks still running for `id`.
    pub fn in_flight(&self, id: EntryId) -> usize {
        self.inner.tasks.in_flight(id)
    }

    pub async fn entry_ids(&self) -> Vec<EntryId> {
        self.tree().await.entry_ids()
    }

    pub async fn entry_id(&self, account: &AccountId) -> Option<EntryId> {
        self.tree().await.entry_by_account(account)
    }

    pub async fn lock_state(&self, id: EntryId) -> Option<LockState> {
        self.tree().await.entry(id).map(WalletEntry::lock_state)
    }

    /// Inspect an entry without holding on to the tree.
    pub async fn with_entry<R>(&self, id: EntryId, f: impl FnOnce(&WalletEntry) -> R) -> Option<R> {
        self.tree().await.entry(id).map(f)
    }

    // ── Keystore-backed lifecycle ──────────────────────────────────────

    /// Create entries for every stored key, drop entries whose key is gone,
    /// and silently unlock entries with a remembered credential.
    ///
    /// Returns the number of entries.
    pub async fn load_from_keystore(&self) -> Result<usize, WalletError> {
        let keystore = Arc::clone(&self.inner.services.keystore);
        let stored = tokio::task::spawn_blocking(move || -> Result<_, WalletError> {
            let mut stored = Vec::new();
            for account in keystore.list()? {
                let name = keystore.key_name(&account)?.filter(|n| !n.is_empty());
                let credential = keystore.password_for_account(&account)?;
                stored.push((account, name, credential));
            }
            Ok(stored)
        })
        .await
        .map_err(|e| FetchError::Task(e.to_string()))??;

        let mut remembered = Vec::new();
        {
            let mut tree = self.tree().await;
            let gone: Vec<EntryId> = tree
                .entries()
                .filter(|e| !stored.iter().any(|(account, ..)| account == &e.account))
                .map(WalletEntry::id)
                .collect();
            for id in gone {
                self.inner.tasks.cancel_entry(id);
                tree.remove_entry(id);
            }
            for (account, name, credential) in &stored {
                let id = tree.create_entry(account.clone(), name.clone());
                let locked = tree
                    .entry(id)
                    .is_some_and(|e| e.lock_state() == LockState::Locked);
                if let (true, Some(credential)) = (locked, credential) {
                    remembered.push((id, credential.clone()));
                }
            }
            self.publish(&tree);
        }

        let mut unlocked = 0;
        for (id, credential) in remembered {
            if self.unlock_with(id, credential, false).await {
                unlocked += 1;
            }
        }
        info!(entries = stored.len(), unlocked, "loaded wallet entries from keystore");
        Ok(stored.len())
    }

    /// Seal and store a new key, then add a locked entry for it.
    pub async fn add_key(
        &self,
        secret: Secret,
        credential: Secret,
        name: Option<String>,
    ) -> Result<EntryId, WalletError> {
        let account = self.inner.services.provider.account_id(&secret)?;
        let key = NewKey {
            account: account.clone(),
            secret,
            credential,
            name: name.clone().unwrap_or_default(),
        };
        let keystore = Arc::clone(&self.inner.services.keystore);
        tokio::task::spawn_blocking(move || keystore.add(key))
            .await
            .map_err(|e| FetchError::Task(e.to_string()))??;
        let mut tree = self.tree().await;
        let id = tree.create_entry(account.clone(), name.filter(|n| !n.is_empty()));
        self.publish(&tree);
        info!(account = %account, "added key");
        Ok(id)
    }

    /// Import an exported keystore blob. Returns the entries for the newly
    /// added accounts.
    pub async fn import(&self, blob: &[u8]) -> Result<Vec<EntryId>, WalletError> {
        let added = self.inner.services.keystore.import(blob)?;
        self.load_from_keystore().await?;
        let tree = self.tree().await;
        let ids: Vec<EntryId> = added
            .iter()
            .filter_map(|account| tree.entry_by_account(account))
            .collect();
        info!(imported = ids.len(), "imported keys");
        Ok(ids)
    }

    pub fn export(&self) -> Result<Vec<u8>, WalletError> {
        Ok(self.inner.services.keystore.export()?)
    }

    /// Remove an entry and its stored key after checking `credential`.
    ///
    /// An unlocked entry is checked against its cached credential, a locked
    /// one against the keystore. Returns `Ok(false)` on a wrong credential.
    pub async fn remove_entry(&self, id: EntryId, credential: &Secret) -> Result<bool, WalletError> {
        let (account, cached) = {
            let tree = self.tree().await;
            let entry = tree.entry(id).ok_or(WalletError::EntryNotFound)?;
            (entry.account.clone(), entry.credential().cloned())
        };
        let accepted = match cached {
            Some(cached) => &cached == credential,
            None => self.check_credential(&account, credential).await,
        };
        if !accepted {
            debug!(account = %account, "removal rejected");
            return Ok(false);
        }

        self.inner.services.keystore.remove(&account)?;
        if let Err(e) = self.inner.services.created.forget_account(&account) {
            warn!(account = %account, error = %e, "could not clear created-address record");
        }
        let mut tree = self.tree().await;
        let cancelled = self.inner.tasks.cancel_entry(id);
        if tree.remove_entry(id).is_some() {
            self.publish(&tree);
        }
        info!(account = %account, cancelled, "removed wallet entry");
        Ok(true)
    }

    async fn check_credential(&self, account: &AccountId, credential: &Secret) -> bool {
        let keystore = Arc::clone(&self.inner.services.keystore);
        let (account, credential) = (account.clone(), credential.clone());
        matches!(
            tokio::task::spawn_blocking(move || keystore.load(&account, &credential)).await,
            Ok(Ok(_))
        )
    }

    // ── Unlock ─────────────────────────────────────────────────────────

    /// Unlock one entry. On success the credential is remembered.
    pub async fn unlock(&self, id: EntryId, credential: Secret) -> bool {
        self.unlock_with(id, credential, true).await
    }

    /// Try `credential` on every locked entry. Returns how many unlocked.
    pub async fn unlock_all(&self, credential: Secret) -> usize {
        let locked: Vec<EntryId> = self
            .tree()
            .await
            .entries()
            .filter(|e| e.lock_state() == LockState::Locked)
            .map(WalletEntry::id)
            .collect();
        let attempted = locked.len();
        let mut unlocked = 0;
        for id in locked {
            if self.unlock_with(id, credential.clone(), true).await {
                unlocked += 1;
            }
        }
        info!(attempted, unlocked, "batch unlock finished");
        unlocked
    }

    async fn unlock_with(&self, id: EntryId, credential: Secret, remember: bool) -> bool {
        let account = {
            let mut tree = self.tree().await;
            match unlock::begin(&mut tree, id) {
                UnlockStart::Proceed(account) => {
                    self.publish(&tree);
                    account
                }
                UnlockStart::AlreadyUnlocked => return true,
                UnlockStart::InProgress | UnlockStart::Missing => return false,
            }
        };

        let keystore = Arc::clone(&self.inner.services.keystore);
        let (lookup, check) = (account.clone(), credential.clone());
        let key = match tokio::task::spawn_blocking(move || keystore.load(&lookup, &check)).await {
            Ok(Ok(key)) => key,
            Ok(Err(e)) => {
                debug!(account = %account, error = %e, "unlock rejected");
                self.abort_unlock(id).await;
                return false;
            }
            Err(e) => {
                warn!(account = %account, error = %e, "keystore task failed");
                self.abort_unlock(id).await;
                return false;
            }
        };

        let provider = &self.inner.services.provider;
        let compatible = provider.valid_seed(&key.secret);
        let bootstrap = compatible || provider.valid_private_key(&key.secret);

        let base = {
            let mut tree = self.tree().await;
            let grant = Grant {
                secret: key.secret.clone(),
                credential: credential.clone(),
                secondary_compatible: compatible,
            };
            let base = unlock::complete(&mut tree, id, grant);
            if base.is_some() {
                self.publish(&tree);
            }
            base
        };
        let Some(base) = base else {
            debug!(account = %account, "entry removed while unlocking");
            return false;
        };

        if remember {
            if let Err(e) = self
                .inner
                .services
                .keystore
                .remember_password(&account, &credential)
            {
                warn!(account = %account, error = %e, "could not remember credential");
            }
        }
        info!(account = %account, compatible, "wallet entry unlocked");

        self.spawn_native(id, base, account);
        if bootstrap {
            self.spawn_bootstrap(id, key.secret);
        }
        true
    }

    async fn abort_unlock(&self, id: EntryId) {
        let mut tree = self.tree().await;
        unlock::abort(&mut tree, id);
        self.publish(&tree);
    }

    // ── Expansion ──────────────────────────────────────────────────────

    /// Flip an entry's expansion. Expanding starts the secondary load once.
    pub async fn toggle_expansion(&self, id: EntryId) -> Option<bool> {
        let (expanded, placeholder) = {
            let mut tree = self.tree().await;
            let expanded = tree.toggle_expansion(id)?;
            let placeholder = if expanded {
                Self::start_secondary_load(&mut tree, id)
            } else {
                None
            };
            self.publish(&tree);
            (expanded, placeholder)
        };
        if let Some(placeholder) = placeholder {
            self.spawn_secondary(id, placeholder);
        }
        Some(expanded)
    }

    /// Expand or collapse. Expanding an already expanded entry starts nothing.
    pub async fn set_expanded(&self, id: EntryId, expanded: bool) -> Option<bool> {
        let (previous, placeholder) = {
            let mut tree = self.tree().await;
            let previous = tree.set_expanded(id, expanded)?;
            let placeholder = if expanded {
                Self::start_secondary_load(&mut tree, id)
            } else {
                None
            };
            self.publish(&tree);
            (previous, placeholder)
        };
        if let Some(placeholder) = placeholder {
            self.spawn_secondary(id, placeholder);
        }
        Some(previous)
    }

    /// Put up a placeholder when the entry has an HD wallet whose addresses
    /// are not loaded and no load, pending or failed, is present.
    fn start_secondary_load(tree: &mut WalletTree, id: EntryId) -> Option<NodeId> {
        let entry = tree.entry(id)?;
        if !entry.has_secondary_wallet() || entry.loading(SECONDARY).is_some() {
            return None;
        }
        sync::begin_secondary_load(tree, id, SECONDARY)
    }

    // ── Sequencing ─────────────────────────────────────────────────────

    /// Reveal the next address of the entry's `kind` run.
    ///
    /// Fails with [`WalletError::SequencingViolation`] while the last address
    /// is unused. When the run has not been loaded yet the load is started and
    /// [`WalletError::NotReady`] returned.
    pub async fn create_next(&self, id: EntryId, kind: CurrencyKind) -> Result<CreatedAddress, WalletError> {
        let mut tree = self.tree().await;
        let planned = sequencer::plan_next(tree.entry(id).ok_or(WalletError::EntryNotFound)?, kind);
        let plan = match planned {
            Ok(plan) => plan,
            Err(WalletError::NotReady(kind)) => {
                let started = tree.set_expanded(id, true).is_some()
                    && tree.entry(id).is_some_and(|e| e.has_secondary_wallet());
                let placeholder = if started {
                    Self::start_secondary_load(&mut tree, id)
                } else {
                    None
                };
                self.publish(&tree);
                drop(tree);
                if let Some(placeholder) = placeholder {
                    self.spawn_secondary(id, placeholder);
                }
                return Err(WalletError::NotReady(kind));
            }
            Err(e) => return Err(e),
        };

        let entry = tree.entry(id).ok_or(WalletError::EntryNotFound)?;
        let handle = entry
            .secondary_wallet
            .as_ref()
            .ok_or(WalletError::NotReady(kind))?;
        let derived = sequencer::derive(handle, plan.index)?.clone();
        let account = entry.account.clone();
        // The tree stays locked across the write so two calls cannot plan
        // the same index.
        let created = Arc::clone(&self.inner.services.created);
        let (owner, address) = (account.clone(), derived.address.clone());
        tokio::task::spawn_blocking(move || created.record(&owner, &address))
            .await
            .map_err(|e| FetchError::Task(e.to_string()))??;

        let node_id = tree.alloc_node();
        let node = sequencer::balance_node(node_id, kind, plan.index, &derived, true);
        let entry = tree.entry_mut(id).ok_or(WalletError::EntryNotFound)?;
        entry.insert_at(plan.position, CurrencyNode::Balance(node));
        entry.expanded = true;
        self.publish(&tree);
        info!(account = %account, index = plan.index, address = %derived.address, "created address");
        Ok(CreatedAddress {
            node: node_id,
            index: plan.index,
            address: derived.address,
        })
    }

    // ── Refresh ────────────────────────────────────────────────────────

    /// Re-fetch the base balance and reload secondary addresses.
    ///
    /// Nodes being refreshed are replaced, so results still in flight for
    /// the old ones are dropped. Returns `false` for a locked or missing
    /// entry.
    pub async fn refresh(&self, id: EntryId) -> bool {
        let (account, base, placeholder) = {
            let mut tree = self.tree().await;
            let Some(entry) = tree.entry(id) else {
                return false;
            };
            if !entry.unlocked() {
                return false;
            }
            let account = entry.account.clone();
            let reload = entry.has_secondary_wallet();
            let expanded = entry.expanded;
            let base = sync::supersede_native(&mut tree, id);
            let placeholder = if reload && sync::reset_secondary(&mut tree, id, SECONDARY) && expanded {
                sync::begin_secondary_load(&mut tree, id, SECONDARY)
            } else {
                None
            };
            self.publish(&tree);
            (account, base, placeholder)
        };
        debug!(account = %account, "refreshing balances");
        if let Some(base) = base {
            self.spawn_native(id, base, account);
        }
        if let Some(placeholder) = placeholder {
            self.spawn_secondary(id, placeholder);
        }
        true
    }

    /// Restart a failed secondary load. No-op unless the entry shows a
    /// failed placeholder.
    pub async fn retry_secondary(&self, id: EntryId) -> bool {
        let placeholder = {
            let mut tree = self.tree().await;
            let failed = tree
                .entry(id)
                .and_then(|e| e.loading(SECONDARY))
                .is_some_and(|l| matches!(l.status, LoadStatus::Failed { .. }));
            if !failed {
                return false;
            }
            let placeholder = sync::begin_secondary_load(&mut tree, id, SECONDARY);
            self.publish(&tree);
            placeholder
        };
        match placeholder {
            Some(placeholder) => {
                self.spawn_secondary(id, placeholder);
                true
            }
            None => false,
        }
    }

    // ── Background work ────────────────────────────────────────────────

    async fn merge<F>(&self, apply: F) -> MergeOutcome
    where
        F: FnOnce(&mut WalletTree) -> MergeOutcome,
    {
        let mut tree = self.tree().await;
        let outcome = apply(&mut tree);
        match outcome {
            MergeOutcome::Applied => {
                self.inner.stats.increment(MERGES_APPLIED);
                self.publish(&tree);
            }
            MergeOutcome::Stale => {
                self.inner.stats.increment(MERGES_STALE);
                debug!("dropped result for a node that no longer exists");
            }
        }
        outcome
    }

    fn spawn_native(&self, id: EntryId, node: NodeId, account: AccountId) {
        let this = self.clone();
        self.inner
            .tasks
            .spawn(id, async move { this.sync_native(id, node, account).await });
    }

    fn spawn_bootstrap(&self, id: EntryId, secret: Secret) {
        let this = self.clone();
        self.inner
            .tasks
            .spawn(id, async move { this.bootstrap_secondary(id, secret).await });
    }

    fn spawn_secondary(&self, id: EntryId, placeholder: NodeId) {
        let this = self.clone();
        self.inner
            .tasks
            .spawn(id, async move { this.load_secondary(id, placeholder).await });
    }

    async fn sync_native(&self, id: EntryId, node: NodeId, account: AccountId) {
        let config = &self.inner.config;
        let api = Arc::clone(&self.inner.services.api);
        let result = with_timeout(config.fetch_timeout(), api.account(&account))
            .await
            .map(|snapshot| format_qnt(snapshot.unconfirmed_balance, config.base_decimals));
        let found = result.is_ok();
        if let Err(e) = &result {
            debug!(account = %account, error = %e, "base account lookup failed");
        }
        let outcome = self.merge(|tree| sync::merge_native(tree, id, node, result)).await;
        if outcome == MergeOutcome::Stale || !found {
            return;
        }

        match sync::fetch_tokens(api, &account, config).await {
            Ok(tokens) => {
                self.merge(|tree| sync::merge_tokens(tree, id, node, tokens)).await;
            }
            Err(e) => warn!(account = %account, error = %e, "token listing failed"),
        }
    }

    async fn bootstrap_secondary(&self, id: EntryId, secret: Secret) {
        let provider = &*self.inner.services.provider;
        let secret = &secret;
        let opened = self
            .with_retry(move || async move { provider.unlock(secret, "").await })
            .await;

        let mut tree = self.tree().await;
        let placeholder = match opened {
            Ok(handle) => {
                if sync::attach_secondary(&mut tree, id, SECONDARY, handle) == MergeOutcome::Stale {
                    self.inner.stats.increment(MERGES_STALE);
                    return;
                }
                let expanded = tree.entry(id).is_some_and(|e| e.expanded);
                if expanded {
                    Self::start_secondary_load(&mut tree, id)
                } else {
                    None
                }
            }
            Err((attempts, e)) => {
                warn!(attempts, error = %e, "secondary wallet bootstrap failed");
                if let Some(placeholder) = sync::begin_secondary_load(&mut tree, id, SECONDARY) {
                    sync::fail_secondary_load(&mut tree, id, placeholder, attempts);
                }
                None
            }
        };
        self.publish(&tree);
        drop(tree);
        if let Some(placeholder) = placeholder {
            self.spawn_secondary(id, placeholder);
        }
    }

    async fn load_secondary(&self, id: EntryId, placeholder: NodeId) {
        let (account, secret, handle) = {
            let tree = self.tree().await;
            let Some(entry) = tree.entry(id) else {
                return;
            };
            let Some(secret) = entry.secret().cloned() else {
                return;
            };
            (entry.account.clone(), secret, entry.secondary_wallet.clone())
        };

        let provider = &*self.inner.services.provider;
        let (secret, handle) = (&secret, handle.as_ref());
        let loaded = self
            .with_retry(move || async move {
                let mut fresh: WalletHandle = match handle {
                    Some(handle) => handle.clone(),
                    None => provider.unlock(secret, "").await?,
                };
                provider.refresh_address_balances(&mut fresh).await?;
                Ok::<_, FetchError>(fresh)
            })
            .await;

        match loaded {
            Ok(handle) => {
                let created = self
                    .inner
                    .services
                    .created
                    .created_for(&account)
                    .unwrap_or_else(|e| {
                        warn!(account = %account, error = %e, "created-address record unreadable");
                        Vec::new()
                    });
                let outcome = self
                    .merge(|tree| sync::merge_secondary(tree, id, SECONDARY, placeholder, handle, &created))
                    .await;
                if outcome == MergeOutcome::Applied {
                    debug!(account = %account, "secondary addresses loaded");
                }
            }
            Err((attempts, e)) => {
                warn!(account = %account, attempts, error = %e, "secondary load failed");
                self.merge(|tree| sync::fail_secondary_load(tree, id, placeholder, attempts))
                    .await;
            }
        }
    }

    /// Run `op` with the configured timeout, retrying with backoff. On
    /// failure returns the number of attempts and the last error.
    async fn with_retry<T, F, Fut>(&self, mut op: F) -> Result<T, (u32, FetchError)>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let backoff = self.inner.config.retry.backoff();
        let limit = self.inner.config.fetch_timeout();
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.inner.stats.increment(SECONDARY_ATTEMPTS);
            match with_timeout(limit, op()).await {
                Ok(value) => return Ok(value),
                Err(e) => match backoff.delay_after(attempt) {
                    Some(delay) => {
                        debug!(attempt, ?delay, error = %e, "secondary fetch failed, retrying");
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        self.inner.stats.increment(SECONDARY_FAILURES);
                        return Err((attempt, e));
                    }
                },
            }
        }
    }
}
