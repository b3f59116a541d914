// tests/sqlite_store_tests.rs
//! SQLCipher-backed store: items, key material and settings on disk

use std::sync::Arc;

use key_rotation_vault::platform::software::SoftwarePlatform;
use key_rotation_vault::platform::sqlite::SqliteItemStore;
use key_rotation_vault::platform::{AuthContext, SecureItemStore, SettingsStore};
use key_rotation_vault::key_ops::generate_kek;
use key_rotation_vault::{
    AccessPolicy, Backend, ItemOptions, KeyRotationEngine, PlatformError, ResolvedAccessControl,
    RotationConfig, SecurityLevel,
};
use tempfile::tempdir;

const PASSPHRASE: &str = "correct horse battery staple";

fn engine(store: Arc<SqliteItemStore>) -> KeyRotationEngine {
    KeyRotationEngine::new(Arc::new(SoftwarePlatform), store.clone(), store).unwrap()
}

#[test]
fn test_items_and_keys_persist_across_reopen() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("nested").join("store.db");
    let options = ItemOptions::new();

    let first_version = {
        let store = Arc::new(SqliteItemStore::open(&path, PASSPHRASE)?);
        let engine = engine(store.clone());
        engine.initialize_key_rotation(RotationConfig {
            rotation_interval_ms: 0,
            ..RotationConfig::default()
        })?;
        let metadata = engine.set_item("refresh_token", "abc.def.ghi", &options)?;
        assert_eq!(metadata.backend, Backend::Sqlite);
        assert_eq!(metadata.security_level, SecurityLevel::Software);
        metadata.key_version_id
    };

    let store = Arc::new(SqliteItemStore::open(&path, PASSPHRASE)?);
    let engine = engine(store);
    let value = engine.get_item("refresh_token", &options)?.expect("item");
    assert_eq!(value.expose_secret(), "abc.def.ghi");
    assert_eq!(engine.config().rotation_interval_ms, 0);

    let result = engine.rotate_keys(Some("reopen"))?;
    assert_ne!(result.new_key_version.id, first_version);
    assert_eq!(result.items_re_encrypted, 1);
    assert_eq!(engine.get_item("refresh_token", &options)?.expect("item").expose_secret(), "abc.def.ghi");
    Ok(())
}

#[test]
fn test_wrong_passphrase_cannot_open() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("store.db");
    {
        let store = SqliteItemStore::open(&path, PASSPHRASE)?;
        store.set("marker", "1")?;
    }
    assert!(SqliteItemStore::open(&path, "not the passphrase").is_err());
    Ok(())
}

#[test]
fn test_key_material_roundtrip_and_delete() -> Result<(), Box<dyn std::error::Error>> {
    let store = SqliteItemStore::open_in_memory(PASSPHRASE)?;
    let kek = generate_kek();
    let protection = ResolvedAccessControl::software(AccessPolicy::None);

    store.store_key_material("v1", &kek, &protection)?;
    let back = store.retrieve_key_material("v1", &AuthContext::default())?;
    assert_eq!(back.expose_secret(), kek.expose_secret());

    store.delete_key_material("v1")?;
    assert_eq!(
        store.retrieve_key_material("v1", &AuthContext::default()).err(),
        Some(PlatformError::NotFound)
    );
    assert_eq!(store.delete_key_material("v1").err(), Some(PlatformError::NotFound));
    Ok(())
}

#[test]
fn test_protected_key_material_is_refused() -> Result<(), Box<dyn std::error::Error>> {
    let store = SqliteItemStore::open_in_memory(PASSPHRASE)?;
    let kek = generate_kek();
    let protection = ResolvedAccessControl {
        requested_policy: AccessPolicy::BiometryAny,
        achieved_policy: AccessPolicy::BiometryAny,
        achieved_security_level: SecurityLevel::Biometric,
        native_handle: None,
    };
    assert!(matches!(
        store.store_key_material("v1", &kek, &protection),
        Err(PlatformError::Rejected(_))
    ));
    Ok(())
}

#[test]
fn test_settings_and_namespaces() -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(SqliteItemStore::open_in_memory(PASSPHRASE)?);
    store.set("key_rotation.enabled", "true")?;
    assert_eq!(store.get("key_rotation.enabled")?.as_deref(), Some("true"));
    store.remove("key_rotation.enabled")?;
    assert_eq!(store.get("key_rotation.enabled")?, None);

    let engine = engine(store.clone());
    let a = ItemOptions::new().in_namespace("a");
    let b = ItemOptions::new().in_namespace("b");
    engine.set_item("same", "in a", &a)?;
    engine.set_item("same", "in b", &b)?;

    assert_eq!(store.get_all_raw("a")?.len(), 1);
    assert_eq!(engine.get_item("same", &b)?.expect("b").expose_secret(), "in b");
    assert!(engine.delete_item("same", &a)?);
    assert!(!engine.delete_item("same", &a)?);
    assert!(engine.get_item("same", &a)?.is_none());
    Ok(())
}

#[test]
fn test_referenced_versions_span_every_namespace() -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(SqliteItemStore::open_in_memory(PASSPHRASE)?);
    let engine = engine(store.clone());
    engine.initialize_key_rotation(RotationConfig {
        rotation_interval_ms: 0,
        max_key_versions: 1,
        ..RotationConfig::default()
    })?;

    let archived = ItemOptions::new().in_namespace("archive");
    let v1 = engine.set_item("ledger", "2024", &archived)?.key_version_id;
    let v2 = engine.rotate_keys(None)?.new_key_version.id;
    engine.set_item("session", "s", &ItemOptions::new())?;

    let referenced = store.referenced_key_versions()?;
    assert_eq!(referenced.into_iter().collect::<Vec<_>>(), vec![v1.clone(), v2]);
    assert!(engine.prune_key_versions()?.deleted.is_empty());
    assert_eq!(engine.get_item("ledger", &archived)?.expect("item").expose_secret(), "2024");
    Ok(())
}
