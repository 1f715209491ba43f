//! Secondary-currency address sequencing.
//!
//! Addresses of an HD wallet are revealed in derivation order with no gaps:
//! a new address can only be created once the last visible one has seen
//! activity on chain.

use ember_types::CurrencyKind;

use crate::provider::{DerivedAddress, WalletHandle};
use crate::tree::{CurrencyBalance, NodeId, WalletEntry};
use crate::WalletError;

/// Where the next address of a run goes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NextAddress {
    /// Derivation index of the new address.
    pub index: u32,
    /// Position in the entry's children.
    pub position: usize,
}

/// Check the use-before-create rule for `kind` and locate the next address.
///
/// Fails with [`WalletError::NotReady`] while the run is unknown: not yet
/// loaded, or a load is still running.
pub fn plan_next(entry: &WalletEntry, kind: CurrencyKind) -> Result<NextAddress, WalletError> {
    if kind.is_base() {
        return Err(WalletError::NotDerivable(kind));
    }
    if !entry.unlocked() {
        return Err(WalletError::Locked);
    }
    if !entry.has_secondary_wallet() || !entry.secondary_loaded() || entry.loading(kind).is_some() {
        return Err(WalletError::NotReady(kind));
    }

    let run: Vec<&CurrencyBalance> = entry.balances(kind).collect();
    debug_assert!(run
        .iter()
        .enumerate()
        .all(|(i, b)| b.index == Some(i as u32)));

    if let Some(last) = run.last() {
        if !last.in_use {
            return Err(WalletError::SequencingViolation {
                index: last.index.unwrap_or(run.len() as u32 - 1),
            });
        }
        let position = entry.position(last.id).map_or(entry.currencies().len(), |p| p + 1);
        return Ok(NextAddress {
            index: run.len() as u32,
            position,
        });
    }

    // Empty run: the first address goes where the run would start.
    let position = entry
        .currencies()
        .iter()
        .position(|c| c.kind() == kind)
        .unwrap_or(entry.currencies().len());
    Ok(NextAddress { index: 0, position })
}

/// The derived address at `index`, or [`WalletError::DerivationExhausted`].
pub fn derive(handle: &WalletHandle, index: u32) -> Result<&DerivedAddress, WalletError> {
    handle
        .address(index)
        .ok_or(WalletError::DerivationExhausted { index })
}

/// Build the balance node for a derived address.
pub fn balance_node(
    id: NodeId,
    kind: CurrencyKind,
    index: u32,
    derived: &DerivedAddress,
    created_here: bool,
) -> CurrencyBalance {
    let mut node = CurrencyBalance::new(id, kind, derived.address.clone());
    node.index = Some(index);
    node.in_use = derived.in_use;
    node.created_here = created_here;
    node.balance = crate::sync::secondary_balance(&derived.balance);
    node.tokens = derived
        .token_balances
        .iter()
        .map(crate::sync::secondary_token)
        .collect();
    node.private_key = Some(derived.private_key.clone());
    node
}
