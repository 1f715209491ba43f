//! The wallet entry tree.
//!
//! Entries live in a generational arena so that an [`EntryId`] held by an
//! in-flight fetch can never resolve to a different entry after the one it named
//! was removed. Currency nodes carry a [`NodeId`] that is never reused; a
//! result addressed to a node that is gone is simply dropped by the caller.
//!
//! Every mutation bumps [`WalletTree::revision`], which the view projection
//! carries so subscribers can tell snapshots apart.

use ember_types::{AccountId, CurrencyKind, Secret, TokenBalance};

use crate::provider::WalletHandle;

/// Stable handle to a wallet entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EntryId {
    slot: u32,
    generation: u32,
}

/// Stable handle to a currency node. Never reused within a tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockState {
    Locked,
    /// Credential check in progress.
    Unlocking,
    Unlocked,
}

/// Progress of a secondary-currency address load.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadStatus {
    Pending,
    /// Every attempt failed; the placeholder stays as a retry affordance.
    Failed { attempts: u32 },
}

/// A concrete address and its balances.
#[derive(Clone, Debug)]
pub struct CurrencyBalance {
    pub id: NodeId,
    pub kind: CurrencyKind,
    pub address: String,
    pub balance: String,
    pub symbol: String,
    /// Chain-observed activity.
    pub in_use: bool,
    /// Created through this wallet, possibly never used on chain.
    pub created_here: bool,
    /// Derivation index for secondary-currency addresses.
    pub index: Option<u32>,
    pub tokens: Vec<TokenBalance>,
    pub(crate) private_key: Option<Secret>,
}

impl CurrencyBalance {
    pub fn new(id: NodeId, kind: CurrencyKind, address: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            address: address.into(),
            balance: String::new(),
            symbol: kind.symbol().to_string(),
            in_use: false,
            created_here: false,
            index: None,
            tokens: Vec::new(),
            private_key: None,
        }
    }

    pub fn private_key(&self) -> Option<&Secret> {
        self.private_key.as_ref()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddressLoading {
    pub id: NodeId,
    pub kind: CurrencyKind,
    pub status: LoadStatus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddressCreateAction {
    pub id: NodeId,
    pub kind: CurrencyKind,
}

/// An ordered child of a wallet entry.
#[derive(Clone, Debug)]
pub enum CurrencyNode {
    Balance(CurrencyBalance),
    Loading(AddressLoading),
    CreateAction(AddressCreateAction),
}

impl CurrencyNode {
    pub fn id(&self) -> NodeId {
        match self {
            CurrencyNode::Balance(b) => b.id,
            CurrencyNode::Loading(l) => l.id,
            CurrencyNode::CreateAction(c) => c.id,
        }
    }

    pub fn kind(&self) -> CurrencyKind {
        match self {
            CurrencyNode::Balance(b) => b.kind,
            CurrencyNode::Loading(l) => l.kind,
            CurrencyNode::CreateAction(c) => c.kind,
        }
    }

    pub fn as_balance(&self) -> Option<&CurrencyBalance> {
        match self {
            CurrencyNode::Balance(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_balance_mut(&mut self) -> Option<&mut CurrencyBalance> {
        match self {
            CurrencyNode::Balance(b) => Some(b),
            _ => None,
        }
    }

    pub fn is_loading(&self, kind: CurrencyKind) -> bool {
        matches!(self, CurrencyNode::Loading(l) if l.kind == kind)
    }

    pub fn is_create_action(&self, kind: CurrencyKind) -> bool {
        matches!(self, CurrencyNode::CreateAction(c) if c.kind == kind)
    }
}

/// One stored key and everything derived from it at runtime.
#[derive(Debug)]
pub struct WalletEntry {
    id: EntryId,
    pub account: AccountId,
    pub name: Option<String>,
    pub expanded: bool,
    /// The secret is an HD seed.
    pub secondary_compatible: bool,
    lock: LockState,
    secret: Option<Secret>,
    credential: Option<Secret>,
    pub(crate) secondary_wallet: Option<WalletHandle>,
    pub(crate) secondary_loaded: bool,
    currencies: Vec<CurrencyNode>,
}

impl WalletEntry {
    fn new(id: EntryId, account: AccountId, name: Option<String>) -> Self {
        Self {
            id,
            account,
            name,
            expanded: false,
            secondary_compatible: false,
            lock: LockState::Locked,
            secret: None,
            credential: None,
            secondary_wallet: None,
            secondary_loaded: false,
            currencies: Vec::new(),
        }
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    /// `"name | account"`, or just the account when unnamed.
    pub fn identifier(&self) -> String {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => format!("{name} | {}", self.account),
            _ => self.account.to_string(),
        }
    }

    pub fn lock_state(&self) -> LockState {
        self.lock
    }

    pub fn unlocked(&self) -> bool {
        self.lock == LockState::Unlocked
    }

    pub fn secret(&self) -> Option<&Secret> {
        self.secret.as_ref()
    }

    pub(crate) fn credential(&self) -> Option<&Secret> {
        self.credential.as_ref()
    }

    pub fn has_secondary_wallet(&self) -> bool {
        self.secondary_wallet.is_some()
    }

    pub fn secondary_loaded(&self) -> bool {
        self.secondary_loaded
    }

    pub fn currencies(&self) -> &[CurrencyNode] {
        &self.currencies
    }

    pub fn node(&self, node: NodeId) -> Option<&CurrencyNode> {
        self.currencies.iter().find(|c| c.id() == node)
    }

    pub(crate) fn node_mut(&mut self, node: NodeId) -> Option<&mut CurrencyNode> {
        self.currencies.iter_mut().find(|c| c.id() == node)
    }

    pub fn position(&self, node: NodeId) -> Option<usize> {
        self.currencies.iter().position(|c| c.id() == node)
    }

    /// Balance nodes of `kind`, in tree order.
    pub fn balances(&self, kind: CurrencyKind) -> impl Iterator<Item = &CurrencyBalance> {
        self.currencies
            .iter()
            .filter_map(CurrencyNode::as_balance)
            .filter(move |b| b.kind == kind)
    }

    /// The load placeholder for `kind`, if any.
    pub fn loading(&self, kind: CurrencyKind) -> Option<&AddressLoading> {
        self.currencies.iter().find_map(|c| match c {
            CurrencyNode::Loading(l) if l.kind == kind => Some(l),
            _ => None,
        })
    }

    pub(crate) fn set_lock(&mut self, lock: LockState) {
        self.lock = lock;
    }

    pub(crate) fn grant(&mut self, secret: Secret, credential: Secret) {
        self.secret = Some(secret);
        self.credential = Some(credential);
        self.lock = LockState::Unlocked;
    }

    pub(crate) fn append(&mut self, node: CurrencyNode) {
        self.currencies.push(node);
    }

    /// Insert at `position`, clamped to the end.
    pub(crate) fn insert_at(&mut self, position: usize, node: CurrencyNode) {
        let position = position.min(self.currencies.len());
        self.currencies.insert(position, node);
    }

    pub(crate) fn remove_node(&mut self, node: NodeId) -> Option<CurrencyNode> {
        let position = self.position(node)?;
        Some(self.currencies.remove(position))
    }

    /// Remove every node matching `pred`, returning them in tree order.
    pub(crate) fn remove_where<F>(&mut self, mut pred: F) -> Vec<CurrencyNode>
    where
        F: FnMut(&CurrencyNode) -> bool,
    {
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.currencies.len());
        for node in self.currencies.drain(..) {
            if pred(&node) {
                removed.push(node);
            } else {
                kept.push(node);
            }
        }
        self.currencies = kept;
        removed
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    entry: Option<WalletEntry>,
}

/// Ordered collection of wallet entries.
#[derive(Debug, Default)]
pub struct WalletTree {
    slots: Vec<Slot>,
    order: Vec<EntryId>,
    next_node: u64,
    revision: u64,
}

impl WalletTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub(crate) fn touch(&mut self) {
        self.revision += 1;
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Allocate a fresh node id.
    pub fn alloc_node(&mut self) -> NodeId {
        self.next_node += 1;
        NodeId(self.next_node)
    }

    /// Append a locked, collapsed entry for `account`. An existing entry for
    /// the same account is returned unchanged.
    pub fn create_entry(&mut self, account: AccountId, name: Option<String>) -> EntryId {
        if let Some(existing) = self.entry_by_account(&account) {
            return existing;
        }
        let id = match self.slots.iter().position(|s| s.entry.is_none()) {
            Some(slot) => EntryId {
                slot: slot as u32,
                generation: self.slots[slot].generation,
            },
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    entry: None,
                });
                EntryId {
                    slot: (self.slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        };
        self.slots[id.slot as usize].entry = Some(WalletEntry::new(id, account, name));
        self.order.push(id);
        self.touch();
        id
    }

    /// Remove an entry with all its nodes. Its id never resolves again.
    pub fn remove_entry(&mut self, id: EntryId) -> Option<WalletEntry> {
        let slot = self.slots.get_mut(id.slot as usize)?;
        if slot.generation != id.generation || slot.entry.is_none() {
            return None;
        }
        let entry = slot.entry.take();
        slot.generation = slot.generation.wrapping_add(1);
        self.order.retain(|e| *e != id);
        self.touch();
        entry
    }

    pub fn contains(&self, id: EntryId) -> bool {
        self.entry(id).is_some()
    }

    pub fn entry(&self, id: EntryId) -> Option<&WalletEntry> {
        let slot = self.slots.get(id.slot as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_ref()
    }

    /// Mutable access to an entry. Counts as a mutation.
    pub(crate) fn entry_mut(&mut self, id: EntryId) -> Option<&mut WalletEntry> {
        let slot = self.slots.get_mut(id.slot as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let entry = slot.entry.as_mut()?;
        self.revision += 1;
        Some(entry)
    }

    pub fn entry_by_account(&self, account: &AccountId) -> Option<EntryId> {
        self.entries().find(|e| &e.account == account).map(|e| e.id)
    }

    /// Entries in creation order.
    pub fn entries(&self) -> impl Iterator<Item = &WalletEntry> {
        self.order.iter().filter_map(move |id| self.entry(*id))
    }

    pub fn entry_ids(&self) -> Vec<EntryId> {
        self.order.clone()
    }

    pub fn node_exists(&self, id: EntryId, node: NodeId) -> bool {
        self.entry(id).is_some_and(|e| e.node(node).is_some())
    }

    /// Append a node to an entry's children.
    pub fn append_currency(&mut self, id: EntryId, node: CurrencyNode) -> bool {
        match self.entry_mut(id) {
            Some(entry) => {
                entry.append(node);
                true
            }
            None => false,
        }
    }

    /// Insert a node directly after `anchor`.
    pub fn insert_currency_after(&mut self, id: EntryId, anchor: NodeId, node: CurrencyNode) -> bool {
        let Some(position) = self.entry(id).and_then(|e| e.position(anchor)) else {
            return false;
        };
        match self.entry_mut(id) {
            Some(entry) => {
                entry.insert_at(position + 1, node);
                true
            }
            None => false,
        }
    }

    /// Remove every child of an entry matching `pred`, in tree order.
    pub fn remove_currency<F>(&mut self, id: EntryId, pred: F) -> Vec<CurrencyNode>
    where
        F: FnMut(&CurrencyNode) -> bool,
    {
        if !self.contains(id) {
            return Vec::new();
        }
        match self.entry_mut(id) {
            Some(entry) => entry.remove_where(pred),
            None => Vec::new(),
        }
    }

    /// Flip an entry's expansion flag, returning the new value.
    pub fn toggle_expansion(&mut self, id: EntryId) -> Option<bool> {
        let entry = self.entry_mut(id)?;
        entry.expanded = !entry.expanded;
        Some(entry.expanded)
    }

    /// Set the expansion flag. Returns the previous value.
    pub fn set_expanded(&mut self, id: EntryId, expanded: bool) -> Option<bool> {
        let previous = self.entry(id)?.expanded;
        if previous != expanded {
            self.entry_mut(id)?.expanded = expanded;
        }
        Some(previous)
    }
}
