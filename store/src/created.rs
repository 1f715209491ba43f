//! Record of secondary-currency addresses created on this device.

use crate::StoreError;
use ember_types::AccountId;

/// Durable record of "(account, address) was created here".
///
/// Consulted when an entry's secondary addresses are reloaded so that an
/// address the user created but never used still shows up.
pub trait CreatedAddressStore: Send + Sync {
    /// Record that `address` was created under `account`. Idempotent.
    fn record(&self, account: &AccountId, address: &str) -> Result<(), StoreError>;

    /// Addresses created under `account`, in creation order.
    fn created_for(&self, account: &AccountId) -> Result<Vec<String>, StoreError>;

    /// Drop every record for `account`.
    fn forget_account(&self, account: &AccountId) -> Result<(), StoreError>;
}
