//! Entry lock state transitions.
//!
//! `Locked -> Unlocking -> Unlocked`, or back to `Locked` when the credential
//! is rejected. The keystore check happens between [`begin`] and
//! [`complete`] without the tree lock held.

use ember_types::{AccountId, CurrencyKind, Secret};

use crate::tree::{CurrencyBalance, CurrencyNode, EntryId, LockState, NodeId, WalletTree};

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum UnlockStart {
    /// The entry moved to `Unlocking`; check the credential for this account.
    Proceed(AccountId),
    AlreadyUnlocked,
    /// Another unlock of the same entry is running.
    InProgress,
    Missing,
}

pub(crate) fn begin(tree: &mut WalletTree, id: EntryId) -> UnlockStart {
    let Some(entry) = tree.entry(id) else {
        return UnlockStart::Missing;
    };
    match entry.lock_state() {
        LockState::Unlocked => UnlockStart::AlreadyUnlocked,
        LockState::Unlocking => UnlockStart::InProgress,
        LockState::Locked => {
            let account = entry.account.clone();
            if let Some(entry) = tree.entry_mut(id) {
                entry.set_lock(LockState::Unlocking);
            }
            UnlockStart::Proceed(account)
        }
    }
}

/// Return an `Unlocking` entry to `Locked`.
pub(crate) fn abort(tree: &mut WalletTree, id: EntryId) {
    if tree
        .entry(id)
        .is_some_and(|e| e.lock_state() == LockState::Unlocking)
    {
        if let Some(entry) = tree.entry_mut(id) {
            entry.set_lock(LockState::Locked);
        }
    }
}

/// Outcome of a successful credential check.
pub(crate) struct Grant {
    pub secret: Secret,
    pub credential: Secret,
    pub secondary_compatible: bool,
}

/// Mark the entry unlocked and give it its base-currency node.
///
/// Returns the node to fetch a balance for, or `None` when the entry was
/// removed or is no longer `Unlocking`.
pub(crate) fn complete(tree: &mut WalletTree, id: EntryId, grant: Grant) -> Option<NodeId> {
    let entry = tree.entry(id)?;
    if entry.lock_state() != LockState::Unlocking {
        return None;
    }
    let address = entry.account.to_string();
    let node_id = tree.alloc_node();
    let entry = tree.entry_mut(id)?;
    entry.grant(grant.secret, grant.credential);
    entry.secondary_compatible = grant.secondary_compatible;
    // A base node from an earlier session goes away with the lock.
    entry.remove_where(|c| c.kind() == CurrencyKind::Heat);
    entry.insert_at(
        0,
        CurrencyNode::Balance(CurrencyBalance::new(node_id, CurrencyKind::Heat, address)),
    );
    Some(node_id)
}
