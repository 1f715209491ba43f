//! Flat, display-ordered projection of the wallet tree.
//!
//! Every entry, currency node and token produces exactly one row, in
//! depth-first order. Rows of collapsed entries are kept and marked hidden
//! rather than dropped, so row positions only change when the tree does.

use ember_types::{AccountId, CurrencyKind};

use crate::tree::{CurrencyNode, EntryId, LoadStatus, LockState, NodeId, WalletTree};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryRow {
    pub entry: EntryId,
    pub account: AccountId,
    pub identifier: String,
    pub lock_state: LockState,
    pub expanded: bool,
    pub secondary_compatible: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BalanceRow {
    pub entry: EntryId,
    pub node: NodeId,
    pub kind: CurrencyKind,
    pub name: &'static str,
    pub address: String,
    pub balance: String,
    pub symbol: String,
    pub in_use: bool,
    pub created_here: bool,
    pub index: Option<u32>,
    pub visible: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadingRow {
    pub entry: EntryId,
    pub node: NodeId,
    pub kind: CurrencyKind,
    pub status: LoadStatus,
    pub visible: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateActionRow {
    pub entry: EntryId,
    pub node: NodeId,
    pub kind: CurrencyKind,
    pub visible: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenRow {
    pub entry: EntryId,
    /// The currency node holding the token.
    pub parent: NodeId,
    pub name: String,
    pub symbol: String,
    pub address: String,
    pub balance: String,
    pub visible: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Row {
    Entry(EntryRow),
    Balance(BalanceRow),
    Loading(LoadingRow),
    CreateAction(CreateActionRow),
    Token(TokenRow),
}

impl Row {
    /// Nesting depth: entries 0, currency nodes 1, tokens 2.
    pub fn depth(&self) -> u8 {
        match self {
            Row::Entry(_) => 0,
            Row::Balance(_) | Row::Loading(_) | Row::CreateAction(_) => 1,
            Row::Token(_) => 2,
        }
    }

    pub fn entry(&self) -> EntryId {
        match self {
            Row::Entry(r) => r.entry,
            Row::Balance(r) => r.entry,
            Row::Loading(r) => r.entry,
            Row::CreateAction(r) => r.entry,
            Row::Token(r) => r.entry,
        }
    }

    pub fn visible(&self) -> bool {
        match self {
            Row::Entry(_) => true,
            Row::Balance(r) => r.visible,
            Row::Loading(r) => r.visible,
            Row::CreateAction(r) => r.visible,
            Row::Token(r) => r.visible,
        }
    }
}

/// A snapshot of the flattened tree at one revision.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Projection {
    pub revision: u64,
    pub rows: Vec<Row>,
}

impl Projection {
    pub fn visible_rows(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter().filter(|r| r.visible())
    }

    pub fn entry_rows(&self) -> impl Iterator<Item = &EntryRow> {
        self.rows.iter().filter_map(|r| match r {
            Row::Entry(e) => Some(e),
            _ => None,
        })
    }

    /// Balance rows of one entry and currency, in order.
    pub fn balances(&self, entry: EntryId, kind: CurrencyKind) -> Vec<&BalanceRow> {
        self.rows
            .iter()
            .filter_map(|r| match r {
                Row::Balance(b) if b.entry == entry && b.kind == kind => Some(b),
                _ => None,
            })
            .collect()
    }
}

pub fn flatten(tree: &WalletTree) -> Projection {
    let mut rows = Vec::new();
    for entry in tree.entries() {
        let entry_id = entry.id();
        let visible = entry.expanded;
        rows.push(Row::Entry(EntryRow {
            entry: entry_id,
            account: entry.account.clone(),
            identifier: entry.identifier(),
            lock_state: entry.lock_state(),
            expanded: entry.expanded,
            secondary_compatible: entry.secondary_compatible,
        }));
        for node in entry.currencies() {
            match node {
                CurrencyNode::Balance(b) => {
                    rows.push(Row::Balance(BalanceRow {
                        entry: entry_id,
                        node: b.id,
                        kind: b.kind,
                        name: b.kind.name(),
                        address: b.address.clone(),
                        balance: b.balance.clone(),
                        symbol: b.symbol.clone(),
                        in_use: b.in_use,
                        created_here: b.created_here,
                        index: b.index,
                        visible,
                    }));
                    rows.extend(b.tokens.iter().map(|t| {
                        Row::Token(TokenRow {
                            entry: entry_id,
                            parent: b.id,
                            name: t.name.clone(),
                            symbol: t.symbol.clone(),
                            address: t.address.clone(),
                            balance: t.balance.clone(),
                            visible,
                        })
                    }));
                }
                CurrencyNode::Loading(l) => rows.push(Row::Loading(LoadingRow {
                    entry: entry_id,
                    node: l.id,
                    kind: l.kind,
                    status: l.status,
                    visible,
                })),
                CurrencyNode::CreateAction(c) => rows.push(Row::CreateAction(CreateActionRow {
                    entry: entry_id,
                    node: c.id,
                    kind: c.kind,
                    visible,
                })),
            }
        }
    }
    Projection {
        revision: tree.revision(),
        rows,
    }
}
