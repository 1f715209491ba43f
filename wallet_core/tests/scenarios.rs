//! End-to-end wallet manager scenarios over the nullable collaborators:
//! keystore -> unlock -> balance fetches -> secondary load -> projection.

use std::sync::Arc;

use ember_nullables::{NullBalanceApi, NullCreatedAddressStore, NullDerivationProvider, NullKeystore};
use ember_store::{CreatedAddressStore, KeystoreAdapter};
use ember_store_lmdb::{KdfParams, LmdbEnvironment};
use ember_types::{AccountId, CurrencyKind, Secret};
use ember_wallet_core::{
    EntryId, LoadStatus, LockState, Row, TokenLookupPolicy, WalletConfig, WalletError,
    WalletManager, WalletServices, SECONDARY, UNUSED_ADDRESS,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Harness {
    keystore: Arc<NullKeystore>,
    created: Arc<NullCreatedAddressStore>,
    provider: Arc<NullDerivationProvider>,
    api: Arc<NullBalanceApi>,
    manager: WalletManager,
}

fn fast_config() -> WalletConfig {
    let mut config = WalletConfig::default();
    config.retry.initial_backoff_ms = 1;
    config.retry.max_backoff_ms = 2;
    config
}

fn harness(
    config: WalletConfig,
    keystore: NullKeystore,
    provider: NullDerivationProvider,
    api: NullBalanceApi,
) -> Harness {
    let keystore = Arc::new(keystore);
    let created = Arc::new(NullCreatedAddressStore::new());
    let provider = Arc::new(provider);
    let api = Arc::new(api);
    let manager = WalletManager::new(
        config,
        WalletServices {
            keystore: keystore.clone(),
            created: created.clone(),
            provider: provider.clone(),
            api: api.clone(),
        },
    );
    Harness {
        keystore,
        created,
        provider,
        api,
        manager,
    }
}

/// One entry, account "1", whose secret is an HD seed with three derived
/// addresses of which the first is in use.
fn seeded() -> Harness {
    harness(
        fast_config(),
        NullKeystore::new().with_key("1", "seed", "pw", "Main"),
        NullDerivationProvider::new().with_seed("seed", "e", 3, 1),
        NullBalanceApi::new().with_account("1", 150_000_000),
    )
}

async fn first_entry(h: &Harness) -> EntryId {
    h.manager.load_from_keystore().await.unwrap();
    h.manager.entry_ids().await[0]
}

fn secondary_addresses(h: &Harness, id: EntryId) -> Vec<String> {
    h.manager
        .projection()
        .balances(id, SECONDARY)
        .iter()
        .map(|b| b.address.clone())
        .collect()
}

fn loading_rows(h: &Harness, id: EntryId) -> Vec<LoadStatus> {
    h.manager
        .projection()
        .rows
        .iter()
        .filter_map(|r| match r {
            Row::Loading(l) if l.entry == id => Some(l.status),
            _ => None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Unlock
// ---------------------------------------------------------------------------

#[tokio::test]
async fn incompatible_entry_never_gets_a_placeholder() {
    let h = harness(
        fast_config(),
        NullKeystore::new().with_key("1", "heat words only", "pw", ""),
        NullDerivationProvider::new(),
        NullBalanceApi::new().with_account("1", 1),
    );
    let id = first_entry(&h).await;
    assert!(h.manager.unlock(id, Secret::new("pw")).await);
    h.manager.set_expanded(id, true).await;
    h.manager.settle().await;

    assert!(loading_rows(&h, id).is_empty());
    let projection = h.manager.projection();
    assert!(!projection.rows.iter().any(|r| matches!(r, Row::CreateAction(_))));
    assert!(!projection.entry_rows().next().unwrap().secondary_compatible);
    assert_eq!(h.provider.unlock_calls(), 0);
}

#[tokio::test]
async fn wrong_credential_leaves_entry_locked() {
    let h = harness(
        fast_config(),
        NullKeystore::new().with_key("1", "seed", "p2", ""),
        NullDerivationProvider::new(),
        NullBalanceApi::new(),
    );
    let id = first_entry(&h).await;
    let before = h.manager.projection().rows.len();

    assert!(!h.manager.unlock(id, Secret::new("p1")).await);
    h.manager.settle().await;

    assert_eq!(h.manager.lock_state(id).await, Some(LockState::Locked));
    assert_eq!(h.manager.projection().rows.len(), before);
    assert!(h.keystore.remembered(&AccountId::new("1")).is_none());
}

#[tokio::test]
async fn unlocking_twice_is_accepted_once() {
    let h = seeded();
    let id = first_entry(&h).await;
    assert!(h.manager.unlock(id, Secret::new("pw")).await);
    assert!(h.manager.unlock(id, Secret::new("pw")).await);
    h.manager.settle().await;
    assert_eq!(h.keystore.load_calls(), 1);
    let heat = h.manager.projection().balances(id, CurrencyKind::Heat).len();
    assert_eq!(heat, 1);
}

#[tokio::test]
async fn unlock_all_counts_and_remembers() {
    let h = harness(
        fast_config(),
        NullKeystore::new()
            .with_key("1", "a", "pw", "")
            .with_key("2", "b", "pw", "")
            .with_key("3", "c", "other", ""),
        NullDerivationProvider::new(),
        NullBalanceApi::new(),
    );
    h.manager.load_from_keystore().await.unwrap();
    assert_eq!(h.manager.unlock_all(Secret::new("pw")).await, 2);
    h.manager.settle().await;

    assert!(h.keystore.remembered(&AccountId::new("1")).is_some());
    assert!(h.keystore.remembered(&AccountId::new("3")).is_none());
    let third = h.manager.entry_id(&AccountId::new("3")).await.unwrap();
    assert_eq!(h.manager.lock_state(third).await, Some(LockState::Locked));
}

#[tokio::test]
async fn remembered_credential_unlocks_on_load() {
    let h = harness(
        fast_config(),
        NullKeystore::new()
            .with_key("1", "a", "pw", "Savings")
            .with_key("2", "b", "pw", "")
            .with_remembered("1", "pw"),
        NullDerivationProvider::new(),
        NullBalanceApi::new(),
    );
    assert_eq!(h.manager.load_from_keystore().await.unwrap(), 2);
    h.manager.settle().await;

    let first = h.manager.entry_id(&AccountId::new("1")).await.unwrap();
    let second = h.manager.entry_id(&AccountId::new("2")).await.unwrap();
    assert_eq!(h.manager.lock_state(first).await, Some(LockState::Unlocked));
    assert_eq!(h.manager.lock_state(second).await, Some(LockState::Locked));
    let identifier = h.manager.with_entry(first, |e| e.identifier()).await.unwrap();
    assert_eq!(identifier, "Savings | 1");
}

#[tokio::test]
async fn reload_drops_entries_whose_key_is_gone() {
    let h = harness(
        fast_config(),
        NullKeystore::new().with_key("1", "a", "pw", "").with_key("2", "b", "pw", ""),
        NullDerivationProvider::new(),
        NullBalanceApi::new(),
    );
    h.manager.load_from_keystore().await.unwrap();
    h.keystore.remove(&AccountId::new("2")).unwrap();
    assert_eq!(h.manager.load_from_keystore().await.unwrap(), 1);
    assert_eq!(h.manager.entry_ids().await.len(), 1);
    assert!(h.manager.entry_id(&AccountId::new("2")).await.is_none());
}

// ---------------------------------------------------------------------------
// Base currency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_native_lookup_shows_unused_and_leaves_siblings() {
    let h = harness(
        fast_config(),
        NullKeystore::new().with_key("1", "a", "pw", "").with_key("2", "b", "pw", ""),
        NullDerivationProvider::new(),
        NullBalanceApi::new().with_account("2", 150_000_000),
    );
    h.manager.load_from_keystore().await.unwrap();
    assert_eq!(h.manager.unlock_all(Secret::new("pw")).await, 2);
    h.manager.settle().await;

    let projection = h.manager.projection();
    let unknown = h.manager.entry_id(&AccountId::new("1")).await.unwrap();
    let known = h.manager.entry_id(&AccountId::new("2")).await.unwrap();
    let failed = projection.balances(unknown, CurrencyKind::Heat)[0];
    assert_eq!(failed.balance, UNUSED_ADDRESS);
    assert_eq!(failed.symbol, "");
    assert!(!failed.in_use);
    let sibling = projection.balances(known, CurrencyKind::Heat)[0];
    assert_eq!(sibling.balance, "1.50000000");
    assert_eq!(sibling.symbol, "HEAT");
}

#[tokio::test]
async fn refresh_while_fetch_in_flight_drops_the_old_result() {
    let h = harness(
        fast_config(),
        NullKeystore::new().with_key("1", "a", "pw", ""),
        NullDerivationProvider::new(),
        NullBalanceApi::new().with_account("1", 100_000_000),
    );
    let id = first_entry(&h).await;
    h.api.gate().hold();
    assert!(h.manager.unlock(id, Secret::new("pw")).await);
    h.api.set_balance("1", 250_000_000);
    assert!(h.manager.refresh(id).await);
    h.api.gate().release();
    h.manager.settle().await;

    assert!(h.manager.stats()["merges_stale"] >= 1);
    let base = h.manager.projection().balances(id, CurrencyKind::Heat)[0].clone();
    assert_eq!(base.balance, "2.50000000");
    assert_eq!(h.manager.projection().balances(id, CurrencyKind::Heat).len(), 1);
}

#[tokio::test]
async fn refresh_of_locked_entry_is_refused() {
    let h = seeded();
    let id = first_entry(&h).await;
    assert!(!h.manager.refresh(id).await);
    assert_eq!(h.api.account_calls(), 0);
}

fn token_harness(policy: TokenLookupPolicy) -> Harness {
    let mut config = fast_config();
    config.token_lookup_policy = policy;
    let api = NullBalanceApi::new()
        .with_account("1", 100_000_000)
        .with_asset("1", "0", "Heat", "HEAT", 100_000_000)
        .with_asset("1", "7", "Gold", "GLD", 500_000_000)
        .with_asset("1", "8", "apples", "app", 25)
        .with_asset("1", "9", "Zinc", "ZN", 1);
    api.fail_asset("9");
    harness(
        config,
        NullKeystore::new().with_key("1", "a", "pw", ""),
        NullDerivationProvider::new(),
        api,
    )
}

#[tokio::test]
async fn skip_failed_policy_keeps_good_tokens_sorted() {
    let h = token_harness(TokenLookupPolicy::SkipFailed);
    let id = first_entry(&h).await;
    h.manager.unlock(id, Secret::new("pw")).await;
    h.manager.settle().await;

    let symbols: Vec<String> = h
        .manager
        .projection()
        .rows
        .iter()
        .filter_map(|r| match r {
            Row::Token(t) => Some(t.symbol.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(symbols, vec!["app", "GLD"]);
    let gold = h
        .manager
        .with_entry(id, |e| e.balances(CurrencyKind::Heat).next().unwrap().tokens[1].clone())
        .await
        .unwrap();
    assert_eq!(gold.balance, "5.00000000");
}

#[tokio::test]
async fn tokens_use_base_decimals_whatever_the_asset_reports() {
    let h = harness(
        fast_config(),
        NullKeystore::new().with_key("1", "a", "pw", ""),
        NullDerivationProvider::new(),
        NullBalanceApi::new()
            .with_account("1", 100_000_000)
            .with_asset("1", "7", "Gold", "GLD", 500_000_000)
            .with_decimals("7", 2),
    );
    let id = first_entry(&h).await;
    h.manager.unlock(id, Secret::new("pw")).await;
    h.manager.settle().await;

    let gold = h
        .manager
        .with_entry(id, |e| e.balances(CurrencyKind::Heat).next().unwrap().tokens[0].clone())
        .await
        .unwrap();
    assert_eq!(gold.symbol, "GLD");
    assert_eq!(gold.balance, "5.00000000");
}

#[tokio::test]
async fn fail_batch_policy_drops_all_tokens() {
    let h = token_harness(TokenLookupPolicy::FailBatch);
    let id = first_entry(&h).await;
    h.manager.unlock(id, Secret::new("pw")).await;
    h.manager.settle().await;

    let projection = h.manager.projection();
    assert!(!projection.rows.iter().any(|r| matches!(r, Row::Token(_))));
    assert_eq!(projection.balances(id, CurrencyKind::Heat)[0].balance, "1.00000000");
}

// ---------------------------------------------------------------------------
// Secondary currency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn expanding_twice_starts_one_load() {
    let h = seeded();
    let id = first_entry(&h).await;
    h.manager.unlock(id, Secret::new("pw")).await;
    h.manager.settle().await;

    h.provider.gate().hold();
    h.manager.set_expanded(id, true).await;
    h.manager.set_expanded(id, true).await;
    assert_eq!(loading_rows(&h, id), vec![LoadStatus::Pending]);
    h.provider.gate().release();
    h.manager.settle().await;

    assert_eq!(h.provider.refresh_calls(), 1);
    assert!(loading_rows(&h, id).is_empty());
    assert_eq!(secondary_addresses(&h, id), vec!["0xe0"]);
}

#[tokio::test]
async fn collapsed_entry_does_not_load() {
    let h = seeded();
    let id = first_entry(&h).await;
    h.manager.unlock(id, Secret::new("pw")).await;
    h.manager.settle().await;

    assert_eq!(h.provider.refresh_calls(), 0);
    assert!(secondary_addresses(&h, id).is_empty());
    let projection = h.manager.projection();
    let action = projection
        .rows
        .iter()
        .find(|r| matches!(r, Row::CreateAction(_)))
        .unwrap();
    assert!(!action.visible());
}

#[tokio::test]
async fn create_next_enforces_use_before_create() {
    let h = seeded();
    let id = first_entry(&h).await;
    h.manager.unlock(id, Secret::new("pw")).await;
    h.manager.set_expanded(id, true).await;
    h.manager.settle().await;

    let created = h.manager.create_next(id, SECONDARY).await.unwrap();
    assert_eq!(created.index, 1);
    assert_eq!(created.address, "0xe1");
    assert!(matches!(
        h.manager.create_next(id, SECONDARY).await,
        Err(WalletError::SequencingViolation { index: 1 })
    ));

    h.provider.set_in_use("seed", 1, true);
    h.manager.refresh(id).await;
    h.manager.settle().await;
    assert_eq!(secondary_addresses(&h, id), vec!["0xe0", "0xe1"]);

    let next = h.manager.create_next(id, SECONDARY).await.unwrap();
    assert_eq!(next.index, 2);
    let projection = h.manager.projection();
    let position = |address: &str| {
        projection
            .rows
            .iter()
            .position(|r| matches!(r, Row::Balance(b) if b.address == address))
            .unwrap()
    };
    assert_eq!(position("0xe2"), position("0xe1") + 1);
    assert_eq!(
        h.created.created_for(&AccountId::new("1")).unwrap(),
        vec!["0xe1", "0xe2"]
    );
}

#[tokio::test]
async fn create_next_before_load_starts_it() {
    let h = seeded();
    let id = first_entry(&h).await;
    h.manager.unlock(id, Secret::new("pw")).await;
    h.manager.settle().await;

    assert!(matches!(
        h.manager.create_next(id, SECONDARY).await,
        Err(WalletError::NotReady(_))
    ));
    h.manager.settle().await;
    assert!(h.manager.with_entry(id, |e| e.expanded).await.unwrap());
    assert_eq!(h.manager.create_next(id, SECONDARY).await.unwrap().index, 1);
}

#[tokio::test]
async fn create_next_rejects_base_and_locked() {
    let h = seeded();
    let id = first_entry(&h).await;
    assert!(matches!(
        h.manager.create_next(id, SECONDARY).await,
        Err(WalletError::Locked)
    ));
    h.manager.unlock(id, Secret::new("pw")).await;
    assert!(matches!(
        h.manager.create_next(id, CurrencyKind::Heat).await,
        Err(WalletError::NotDerivable(CurrencyKind::Heat))
    ));
}

#[tokio::test]
async fn create_next_stops_at_end_of_derivation() {
    let h = harness(
        fast_config(),
        NullKeystore::new().with_key("1", "seed", "pw", ""),
        NullDerivationProvider::new().with_seed("seed", "e", 1, 1),
        NullBalanceApi::new(),
    );
    let id = first_entry(&h).await;
    h.manager.unlock(id, Secret::new("pw")).await;
    h.manager.set_expanded(id, true).await;
    h.manager.settle().await;
    assert!(matches!(
        h.manager.create_next(id, SECONDARY).await,
        Err(WalletError::DerivationExhausted { index: 1 })
    ));
}

#[tokio::test]
async fn failed_record_write_leaves_tree_untouched() {
    let h = seeded();
    let id = first_entry(&h).await;
    h.manager.unlock(id, Secret::new("pw")).await;
    h.manager.set_expanded(id, true).await;
    h.manager.settle().await;

    h.created.fail_writes(true);
    let revision = h.manager.projection().revision;
    assert!(matches!(
        h.manager.create_next(id, SECONDARY).await,
        Err(WalletError::Store(_))
    ));
    assert_eq!(h.manager.projection().revision, revision);
    assert_eq!(secondary_addresses(&h, id), vec!["0xe0"]);
}

#[tokio::test]
async fn failed_load_can_be_retried() {
    let h = seeded();
    let id = first_entry(&h).await;
    h.manager.unlock(id, Secret::new("pw")).await;
    h.manager.settle().await;

    h.provider.fail_refreshes(3);
    h.manager.set_expanded(id, true).await;
    h.manager.settle().await;
    assert_eq!(loading_rows(&h, id), vec![LoadStatus::Failed { attempts: 3 }]);
    assert_eq!(h.manager.stats()["secondary_failures"], 1);

    assert!(h.manager.retry_secondary(id).await);
    h.manager.settle().await;
    assert!(loading_rows(&h, id).is_empty());
    assert_eq!(secondary_addresses(&h, id), vec!["0xe0"]);
    assert!(!h.manager.retry_secondary(id).await);
}

#[tokio::test]
async fn failed_bootstrap_leaves_a_retry_placeholder() {
    let h = seeded();
    h.provider.fail_unlocks(3);
    let id = first_entry(&h).await;
    h.manager.unlock(id, Secret::new("pw")).await;
    h.manager.settle().await;
    assert_eq!(loading_rows(&h, id), vec![LoadStatus::Failed { attempts: 3 }]);

    h.manager.set_expanded(id, true).await;
    assert!(h.manager.retry_secondary(id).await);
    h.manager.settle().await;
    assert_eq!(secondary_addresses(&h, id), vec!["0xe0"]);
}

#[tokio::test]
async fn removal_during_load_leaves_no_trace() {
    let h = seeded();
    let id = first_entry(&h).await;
    h.provider.gate().hold();
    h.manager.unlock(id, Secret::new("pw")).await;
    h.manager.set_expanded(id, true).await;

    assert!(!h.manager.remove_entry(id, &Secret::new("wrong")).await.unwrap());
    assert!(h.manager.remove_entry(id, &Secret::new("pw")).await.unwrap());
    h.manager.settle().await;
    h.provider.gate().release();

    assert_eq!(h.manager.in_flight(id), 0);
    assert!(h.manager.projection().rows.is_empty());
    assert!(h.keystore.list().unwrap().is_empty());
    assert_eq!(h.provider.unlock_calls(), 0);
}

#[tokio::test]
async fn removal_while_addresses_refresh_leaves_no_trace() {
    let h = seeded();
    let id = first_entry(&h).await;
    h.manager.unlock(id, Secret::new("pw")).await;
    h.manager.settle().await;
    assert_eq!(h.provider.unlock_calls(), 1);

    h.provider.gate().hold();
    h.manager.set_expanded(id, true).await;
    assert_eq!(loading_rows(&h, id), vec![LoadStatus::Pending]);

    assert!(h.manager.remove_entry(id, &Secret::new("pw")).await.unwrap());
    h.manager.settle().await;
    h.provider.gate().release();
    tokio::task::yield_now().await;

    assert_eq!(h.manager.in_flight(id), 0);
    assert!(h.manager.projection().rows.is_empty());
    assert_eq!(h.provider.refresh_calls(), 0);
}

#[tokio::test]
async fn removal_forgets_created_addresses() {
    let h = seeded();
    let id = first_entry(&h).await;
    h.manager.unlock(id, Secret::new("pw")).await;
    h.manager.set_expanded(id, true).await;
    h.manager.settle().await;
    h.manager.create_next(id, SECONDARY).await.unwrap();
    let account = AccountId::new("1");
    assert_eq!(h.created.created_for(&account).unwrap(), vec!["0xe1"]);

    assert!(h.manager.remove_entry(id, &Secret::new("pw")).await.unwrap());
    assert!(h.created.created_for(&account).unwrap().is_empty());
}

#[tokio::test]
async fn failed_keystore_read_leaves_tree_and_projection_alike() {
    let h = harness(
        fast_config(),
        NullKeystore::new().with_key("1", "a", "pw", "").with_key("2", "b", "pw", ""),
        NullDerivationProvider::new(),
        NullBalanceApi::new(),
    );
    h.manager.load_from_keystore().await.unwrap();
    h.keystore.remove(&AccountId::new("2")).unwrap();
    h.keystore.fail_reads(true);

    assert!(matches!(
        h.manager.load_from_keystore().await,
        Err(WalletError::Store(_))
    ));
    let ids = h.manager.entry_ids().await;
    assert_eq!(ids.len(), 2);
    assert_eq!(h.manager.projection().entry_rows().count(), ids.len());

    h.keystore.fail_reads(false);
    assert_eq!(h.manager.load_from_keystore().await.unwrap(), 1);
    assert_eq!(h.manager.projection().entry_rows().count(), 1);
}

#[tokio::test]
async fn removal_of_locked_entry_checks_keystore() {
    let h = seeded();
    let id = first_entry(&h).await;
    assert!(!h.manager.remove_entry(id, &Secret::new("nope")).await.unwrap());
    assert!(h.manager.remove_entry(id, &Secret::new("pw")).await.unwrap());
    assert!(matches!(
        h.manager.remove_entry(id, &Secret::new("pw")).await,
        Err(WalletError::EntryNotFound)
    ));
}

#[tokio::test]
async fn projection_has_one_row_per_node() {
    let h = harness(
        fast_config(),
        NullKeystore::new().with_key("1", "seed", "pw", "").with_key("2", "x", "pw", ""),
        NullDerivationProvider::new()
            .with_seed("seed", "e", 3, 2)
            .with_token("seed", 0, "USDT", "1000"),
        NullBalanceApi::new()
            .with_account("1", 1)
            .with_asset("1", "7", "Gold", "GLD", 1),
    );
    h.manager.load_from_keystore().await.unwrap();
    h.manager.unlock_all(Secret::new("pw")).await;
    for id in h.manager.entry_ids().await {
        h.manager.set_expanded(id, true).await;
    }
    h.manager.settle().await;

    let mut expected = 0;
    for id in h.manager.entry_ids().await {
        expected += h
            .manager
            .with_entry(id, |e| {
                1 + e
                    .currencies()
                    .iter()
                    .map(|c| 1 + c.as_balance().map_or(0, |b| b.tokens.len()))
                    .sum::<usize>()
            })
            .await
            .unwrap();
    }
    let projection = h.manager.projection();
    assert_eq!(projection.rows.len(), expected);
    assert!(projection.rows.iter().any(|r| matches!(r, Row::Token(t) if t.balance == "1,000")));
}

#[tokio::test]
async fn subscribers_see_each_change() {
    let h = seeded();
    let mut rx = h.manager.subscribe();
    let id = first_entry(&h).await;
    assert!(rx.has_changed().unwrap());
    let seen = rx.borrow_and_update().revision;
    h.manager.toggle_expansion(id).await;
    assert!(rx.borrow_and_update().revision > seen);
}

// ---------------------------------------------------------------------------
// Keystore
// ---------------------------------------------------------------------------

#[tokio::test]
async fn export_then_import_into_another_wallet() {
    let source = harness(
        fast_config(),
        NullKeystore::new().with_key("1", "a", "pw", "").with_key("2", "b", "pw", ""),
        NullDerivationProvider::new(),
        NullBalanceApi::new(),
    );
    let blob = source.manager.export().unwrap();

    let target = harness(
        fast_config(),
        NullKeystore::new().with_key("2", "b", "pw", ""),
        NullDerivationProvider::new(),
        NullBalanceApi::new(),
    );
    let imported = target.manager.import(&blob).await.unwrap();
    assert_eq!(imported.len(), 1);
    assert_eq!(target.manager.entry_ids().await.len(), 2);
}

#[tokio::test]
async fn add_key_creates_locked_entry() {
    let h = harness(
        fast_config(),
        NullKeystore::new(),
        NullDerivationProvider::new()
            .with_seed("seed", "e", 1, 1)
            .with_account("seed", "42"),
        NullBalanceApi::new(),
    );
    let id = h
        .manager
        .add_key(Secret::new("seed"), Secret::new("pw"), Some("Cold".into()))
        .await
        .unwrap();
    assert_eq!(h.manager.lock_state(id).await, Some(LockState::Locked));
    assert_eq!(h.keystore.key_name(&AccountId::new("42")).unwrap().as_deref(), Some("Cold"));
    assert!(h.manager.unlock(id, Secret::new("pw")).await);
}

#[tokio::test]
async fn created_address_survives_restart() {
    let dir = tempfile::tempdir().expect("temp dir");
    let kdf = KdfParams {
        memory: 256,
        iterations: 1,
        parallelism: 1,
    };
    let provider = || Arc::new(NullDerivationProvider::new().with_seed("seed", "e", 3, 1).with_account("seed", "1"));
    let open = |env: &LmdbEnvironment, provider: Arc<NullDerivationProvider>| {
        WalletManager::new(
            fast_config(),
            WalletServices {
                keystore: Arc::new(env.keystore()),
                created: Arc::new(env.created_address_store()),
                provider,
                api: Arc::new(NullBalanceApi::new()),
            },
        )
    };

    {
        let env = LmdbEnvironment::open_with_kdf(dir.path(), 64 * 1024 * 1024, kdf).expect("open env");
        let manager = open(&env, provider());
        let id = manager
            .add_key(Secret::new("seed"), Secret::new("pw"), None)
            .await
            .unwrap();
        assert!(manager.unlock(id, Secret::new("pw")).await);
        manager.set_expanded(id, true).await;
        manager.settle().await;
        assert_eq!(manager.create_next(id, SECONDARY).await.unwrap().index, 1);
        manager.settle().await;
    }

    let env = LmdbEnvironment::open_with_kdf(dir.path(), 64 * 1024 * 1024, kdf).expect("reopen env");
    let manager = open(&env, provider());
    manager.load_from_keystore().await.unwrap();
    let id = manager.entry_ids().await[0];
    assert_eq!(manager.lock_state(id).await, Some(LockState::Unlocked));
    manager.settle().await;
    manager.set_expanded(id, true).await;
    manager.settle().await;

    let projection = manager.projection();
    let run = projection.balances(id, SECONDARY);
    assert_eq!(run.len(), 2);
    assert_eq!(run[1].address, "0xe1");
    assert!(run[1].created_here);
    assert!(!run[1].in_use);
    assert!(matches!(
        manager.create_next(id, SECONDARY).await,
        Err(WalletError::SequencingViolation { index: 1 })
    ));
}
