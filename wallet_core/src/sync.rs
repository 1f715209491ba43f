//! Balance fetching and merging.
//!
//! Fetches run without the tree lock. Their results are merged back by
//! [`EntryId`] and [`NodeId`]; when either no longer resolves the result is
//! stale and dropped without touching the tree.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use ember_types::{comma_format, format_fixed, format_qnt, AccountId, CurrencyKind, TokenBalance};

use crate::config::{TokenLookupPolicy, WalletConfig};
use crate::provider::{AssetBalance, BalanceApi, DerivedTokenBalance, PageRequest, WalletHandle};
use crate::sequencer;
use crate::tree::{
    AddressCreateAction, AddressLoading, CurrencyNode, EntryId, LoadStatus, NodeId, WalletTree,
};
use crate::FetchError;

/// Shown instead of a balance when the base account is unknown to the chain.
pub const UNUSED_ADDRESS: &str = "Address is unused";

/// Fractional digits shown for secondary-currency balances.
pub const SECONDARY_DECIMALS: usize = 18;

/// Asset id of the base currency in balance listings.
const BASE_ASSET_ID: &str = "0";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    Applied,
    /// The target entry or node is gone.
    Stale,
}

/// Run `fut` with a deadline.
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, FetchError>
where
    F: Future<Output = Result<T, FetchError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| FetchError::Timeout(limit))?
}

pub fn secondary_balance(balance: &str) -> String {
    format_fixed(balance, SECONDARY_DECIMALS).unwrap_or_else(|_| balance.to_string())
}

pub fn secondary_token(token: &DerivedTokenBalance) -> TokenBalance {
    TokenBalance::new(
        token.name.clone(),
        token.symbol.clone(),
        token.address.clone(),
        comma_format(&token.balance),
    )
}

// ── Base currency ──────────────────────────────────────────────────────

/// Apply a base-currency balance lookup. A failed lookup shows the account
/// as unused.
pub fn merge_native(
    tree: &mut WalletTree,
    id: EntryId,
    node: NodeId,
    result: Result<String, FetchError>,
) -> MergeOutcome {
    if !tree.node_exists(id, node) {
        return MergeOutcome::Stale;
    }
    let Some(balance) = tree
        .entry_mut(id)
        .and_then(|e| e.node_mut(node))
        .and_then(CurrencyNode::as_balance_mut)
    else {
        return MergeOutcome::Stale;
    };
    match result {
        Ok(formatted) => {
            balance.balance = formatted;
            balance.symbol = balance.kind.symbol().to_string();
            balance.in_use = true;
        }
        Err(_) => {
            balance.balance = UNUSED_ADDRESS.to_string();
            balance.symbol = String::new();
            balance.in_use = false;
            balance.tokens.clear();
        }
    }
    MergeOutcome::Applied
}

pub fn merge_tokens(
    tree: &mut WalletTree,
    id: EntryId,
    node: NodeId,
    tokens: Vec<TokenBalance>,
) -> MergeOutcome {
    if !tree.node_exists(id, node) {
        return MergeOutcome::Stale;
    }
    match tree
        .entry_mut(id)
        .and_then(|e| e.node_mut(node))
        .and_then(CurrencyNode::as_balance_mut)
    {
        Some(balance) => {
            balance.tokens = tokens;
            MergeOutcome::Applied
        }
        None => MergeOutcome::Stale,
    }
}

/// Replace the base-currency node with a fresh one carrying the same
/// values. Results still in flight for the old node become stale.
pub fn supersede_native(tree: &mut WalletTree, id: EntryId) -> Option<NodeId> {
    let old = tree
        .entry(id)?
        .balances(CurrencyKind::Heat)
        .next()?
        .clone();
    let fresh = tree.alloc_node();
    let entry = tree.entry_mut(id)?;
    let position = entry.position(old.id)?;
    entry.remove_node(old.id);
    let mut replacement = old;
    replacement.id = fresh;
    entry.insert_at(position, CurrencyNode::Balance(replacement));
    Some(fresh)
}

/// List every asset the account holds, page by page, then look up each
/// asset's metadata concurrently.
///
/// With [`TokenLookupPolicy::FailBatch`] the first failed lookup fails the
/// whole listing. Tokens are sorted by symbol, case-insensitively.
pub async fn fetch_tokens(
    api: Arc<dyn BalanceApi>,
    account: &AccountId,
    config: &WalletConfig,
) -> Result<Vec<TokenBalance>, FetchError> {
    let limit = config.fetch_timeout();
    let mut assets: Vec<AssetBalance> = Vec::new();
    for page in 0..config.max_pages {
        let request = PageRequest::nth(page, config.page_size);
        let rows = with_timeout(limit, api.balances(account, &request)).await?;
        let full = rows.len() as u32 >= request.len();
        assets.extend(rows);
        if !full {
            break;
        }
        if page + 1 == config.max_pages {
            tracing::warn!(account = %account, pages = config.max_pages, "asset listing truncated");
        }
    }

    let mut lookups = JoinSet::new();
    for asset in assets.into_iter().filter(|a| a.id != BASE_ASSET_ID) {
        let api = Arc::clone(&api);
        lookups.spawn(async move {
            let info = with_timeout(limit, api.asset_info(&asset.id)).await;
            (asset, info)
        });
    }

    let mut tokens = Vec::new();
    let mut first_failure = None;
    while let Some(joined) = lookups.join_next().await {
        let (asset, info) = match joined {
            Ok(pair) => pair,
            Err(e) => {
                first_failure.get_or_insert(FetchError::Task(e.to_string()));
                continue;
            }
        };
        match info {
            Ok(info) => tokens.push(TokenBalance::new(
                info.name,
                info.symbol,
                asset.id,
                format_qnt(asset.virtual_balance, config.base_decimals),
            )),
            Err(e) => {
                tracing::debug!(account = %account, asset = %asset.id, error = %e, "asset lookup failed");
                first_failure.get_or_insert(e);
            }
        }
    }

    if let Some(e) = first_failure {
        match config.token_lookup_policy {
            TokenLookupPolicy::FailBatch => return Err(e),
            TokenLookupPolicy::SkipFailed => {
                tracing::warn!(account = %account, error = %e, "skipping tokens with failed lookups");
            }
        }
    }

    tokens.sort_by_key(|t| t.symbol.to_uppercase());
    Ok(tokens)
}

// ── Secondary currency ─────────────────────────────────────────────────

/// Give an entry its create-address affordance for `kind` once the HD
/// wallet is available.
pub fn attach_secondary(
    tree: &mut WalletTree,
    id: EntryId,
    kind: CurrencyKind,
    handle: WalletHandle,
) -> MergeOutcome {
    let Some(entry) = tree.entry(id) else {
        return MergeOutcome::Stale;
    };
    if !entry.unlocked() {
        return MergeOutcome::Stale;
    }
    let has_action = entry.currencies().iter().any(|c| c.is_create_action(kind));
    let action = tree.alloc_node();
    let Some(entry) = tree.entry_mut(id) else {
        return MergeOutcome::Stale;
    };
    if entry.secondary_wallet.is_none() {
        entry.secondary_wallet = Some(handle);
    }
    if !has_action {
        entry.append(CurrencyNode::CreateAction(AddressCreateAction { id: action, kind }));
    }
    MergeOutcome::Applied
}

/// Put up the load placeholder for `kind`, or reuse a failed one.
///
/// Returns `None` when there is nothing to start: the entry is gone or
/// locked, the addresses are loaded, or a load is already pending.
pub fn begin_secondary_load(tree: &mut WalletTree, id: EntryId, kind: CurrencyKind) -> Option<NodeId> {
    let entry = tree.entry(id)?;
    if !entry.unlocked() || entry.secondary_loaded() {
        return None;
    }
    match entry.loading(kind) {
        Some(loading) if loading.status == LoadStatus::Pending => None,
        Some(loading) => {
            let placeholder = loading.id;
            if let Some(CurrencyNode::Loading(l)) = tree.entry_mut(id)?.node_mut(placeholder) {
                l.status = LoadStatus::Pending;
            }
            Some(placeholder)
        }
        None => {
            let position = entry
                .currencies()
                .iter()
                .position(|c| c.is_create_action(kind))
                .unwrap_or(entry.currencies().len());
            let placeholder = tree.alloc_node();
            tree.entry_mut(id)?.insert_at(
                position,
                CurrencyNode::Loading(AddressLoading {
                    id: placeholder,
                    kind,
                    status: LoadStatus::Pending,
                }),
            );
            Some(placeholder)
        }
    }
}

/// Leave the placeholder in place as a retry affordance.
pub fn fail_secondary_load(
    tree: &mut WalletTree,
    id: EntryId,
    placeholder: NodeId,
    attempts: u32,
) -> MergeOutcome {
    if !tree.node_exists(id, placeholder) {
        return MergeOutcome::Stale;
    }
    match tree.entry_mut(id).and_then(|e| e.node_mut(placeholder)) {
        Some(CurrencyNode::Loading(l)) => {
            l.status = LoadStatus::Failed { attempts };
            MergeOutcome::Applied
        }
        _ => MergeOutcome::Stale,
    }
}

/// Drop loaded secondary addresses of `kind` so they can be fetched again.
/// A pending load is left alone.
pub fn reset_secondary(tree: &mut WalletTree, id: EntryId, kind: CurrencyKind) -> bool {
    let Some(entry) = tree.entry(id) else {
        return false;
    };
    if entry
        .loading(kind)
        .is_some_and(|l| l.status == LoadStatus::Pending)
    {
        return false;
    }
    let Some(entry) = tree.entry_mut(id) else {
        return false;
    };
    entry.remove_where(|c| c.kind() == kind && !c.is_create_action(kind));
    entry.secondary_loaded = false;
    true
}

/// Replace the placeholder with the gap-free prefix of the derivation
/// sequence that ends at the last address either used on chain or created
/// through this wallet.
pub fn merge_secondary(
    tree: &mut WalletTree,
    id: EntryId,
    kind: CurrencyKind,
    placeholder: NodeId,
    handle: WalletHandle,
    created: &[String],
) -> MergeOutcome {
    if !tree.node_exists(id, placeholder) {
        return MergeOutcome::Stale;
    }
    let is_created = |address: &str| created.iter().any(|c| c == address);
    let last_eligible = handle
        .addresses
        .iter()
        .rposition(|a| a.in_use || is_created(&a.address));

    let mut nodes = Vec::new();
    if let Some(last) = last_eligible {
        for (index, derived) in handle.addresses[..=last].iter().enumerate() {
            let node_id = tree.alloc_node();
            nodes.push(CurrencyNode::Balance(sequencer::balance_node(
                node_id,
                kind,
                index as u32,
                derived,
                is_created(&derived.address),
            )));
        }
    }

    let action = tree.alloc_node();
    let Some(entry) = tree.entry_mut(id) else {
        return MergeOutcome::Stale;
    };
    if !entry.currencies().iter().any(|c| c.is_create_action(kind)) {
        entry.append(CurrencyNode::CreateAction(AddressCreateAction { id: action, kind }));
    }
    entry.remove_where(|c| c.kind() == kind && c.as_balance().is_some());
    let Some(position) = entry.position(placeholder) else {
        return MergeOutcome::Stale;
    };
    entry.remove_node(placeholder);
    for (offset, node) in nodes.into_iter().enumerate() {
        entry.insert_at(position + offset, node);
    }
    entry.secondary_wallet = Some(handle);
    entry.secondary_loaded = true;
    MergeOutcome::Applied
}
