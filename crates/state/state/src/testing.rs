use std::time::Duration;

use crate::error::StateError;
use crate::key::{KeyKind, StateKey};
use crate::store::{CasResult, StateStore};

fn test_key(id: &str) -> StateKey {
    StateKey::new("test-ns", KeyKind::Operation, id)
}

/// Run the full state store conformance test suite.
///
/// Call this from your backend's test module with a fresh store instance.
///
/// # Errors
///
/// Returns an error if the backend fails an operation.
pub async fn run_store_conformance_tests(store: &dyn StateStore) -> Result<(), StateError> {
    test_get_missing(store).await?;
    test_set_and_get(store).await?;
    test_check_and_set_new(store).await?;
    test_check_and_set_existing(store).await?;
    test_delete(store).await?;
    test_versions_advance(store).await?;
    test_compare_and_swap(store).await?;
    test_compare_and_swap_create(store).await?;
    test_ttl_set(store).await?;
    Ok(())
}

async fn test_get_missing(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key("missing");
    assert!(store.get(&key).await?.is_none(), "get on missing key should return None");
    assert!(
        store.get_versioned(&key).await?.is_none(),
        "get_versioned on missing key should return None"
    );
    Ok(())
}

async fn test_set_and_get(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key("set-get");
    store.set(&key, "hello", None).await?;
    let val = store.get(&key).await?;
    assert_eq!(val.as_deref(), Some("hello"));
    Ok(())
}

async fn test_check_and_set_new(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key("cas-new");
    let created = store.check_and_set(&key, "v1", None).await?;
    assert!(created, "check_and_set on new key should return true");
    let entry = store.get_versioned(&key).await?.expect("entry should exist");
    assert_eq!(entry.value, "v1");
    assert_eq!(entry.version, 1, "a new entry starts at version 1");
    Ok(())
}

async fn test_check_and_set_existing(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key("cas-existing");
    store.set(&key, "v1", None).await?;
    let created = store.check_and_set(&key, "v2", None).await?;
    assert!(!created, "check_and_set on existing key should return false");
    let val = store.get(&key).await?;
    assert_eq!(val.as_deref(), Some("v1"), "original value should remain");
    Ok(())
}

async fn test_delete(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key("to-delete");
    store.set(&key, "bye", None).await?;
    assert!(store.delete(&key).await?, "delete should return true for existing key");
    assert!(store.get(&key).await?.is_none(), "get after delete should return None");
    assert!(!store.delete(&key).await?, "delete on missing key should return false");
    Ok(())
}

async fn test_versions_advance(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key("versions");
    store.set(&key, "a", None).await?;
    let first = store.get_versioned(&key).await?.expect("entry should exist");
    store.set(&key, "b", None).await?;
    let second = store.get_versioned(&key).await?.expect("entry should exist");
    assert_eq!(second.value, "b");
    assert!(
        second.version > first.version,
        "every write should advance the version"
    );
    Ok(())
}

async fn test_compare_and_swap(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key("cas-version");
    store.set(&key, "initial", None).await?;
    let current = store.get_versioned(&key).await?.expect("entry should exist");

    let result = store.compare_and_swap(&key, 999, "updated", None).await?;
    assert_eq!(
        result,
        CasResult::Conflict {
            current_value: Some("initial".into()),
            current_version: current.version,
        },
        "CAS with wrong version should report the current entry"
    );

    let result = store
        .compare_and_swap(&key, current.version, "updated", None)
        .await?;
    assert_eq!(
        result,
        CasResult::Ok {
            version: current.version + 1
        },
        "CAS with correct version should succeed"
    );

    let val = store.get(&key).await?;
    assert_eq!(val.as_deref(), Some("updated"));

    let stale = store
        .compare_and_swap(&key, current.version, "again", None)
        .await?;
    assert!(
        matches!(stale, CasResult::Conflict { .. }),
        "reusing a consumed version should conflict"
    );
    Ok(())
}

async fn test_compare_and_swap_create(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key("cas-create");
    let result = store.compare_and_swap(&key, 0, "fresh", None).await?;
    assert_eq!(result, CasResult::Ok { version: 1 }, "version 0 creates");

    let result = store.compare_and_swap(&key, 0, "again", None).await?;
    assert_eq!(
        result,
        CasResult::Conflict {
            current_value: Some("fresh".into()),
            current_version: 1,
        },
        "version 0 must not overwrite an existing entry"
    );
    Ok(())
}

async fn test_ttl_set(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key("ttl-test");
    store
        .set(&key, "ephemeral", Some(Duration::from_secs(3600)))
        .await?;
    let val = store.get(&key).await?;
    assert_eq!(val.as_deref(), Some("ephemeral"));
    Ok(())
}
