//! Encrypted preferences: key sealing and failure modes

use lockgate_params::{GateConfig, KdfParams};
use lockgate_storage_sqlite::{
    CredentialStore, EncryptionAlgorithm, Error, MockKeystore, PrefsBatch, Result, SecurePrefs,
    SoftwareKeystore, SqlitePrefs,
};
use std::fs;
use tempfile::TempDir;

fn config(dir: &TempDir) -> GateConfig {
    GateConfig {
        data_dir: dir.path().join("data"),
        kdf: KdfParams::Pbkdf2Sha256 { iterations: 8 },
        ..GateConfig::default()
    }
}

#[test]
fn test_first_open_creates_sealed_key() -> Result<()> {
    let dir = TempDir::new()?;
    let config = config(&dir);
    let keystore = MockKeystore::new();

    let prefs = SqlitePrefs::from_config(&config, &keystore)?;
    assert_eq!(prefs.region(), "secure_prefs");
    assert!(config.database_path().exists());
    assert!(config.sealed_key_path().exists());
    Ok(())
}

#[test]
fn test_batch_is_persisted_atomically() -> Result<()> {
    let dir = TempDir::new()?;
    let config = config(&dir);
    let keystore = MockKeystore::new();

    let prefs = SqlitePrefs::from_config(&config, &keystore)?;
    prefs.commit(PrefsBatch::new().put("a", "1").put("b", "2").remove("c"))?;
    drop(prefs);

    let prefs = SqlitePrefs::from_config(&config, &keystore)?;
    assert_eq!(
        prefs.snapshot(&["a", "b", "c"])?,
        vec![Some("1".to_string()), Some("2".to_string()), None]
    );
    Ok(())
}

#[test]
fn test_unavailable_keystore_is_storage_unavailable() -> Result<()> {
    let dir = TempDir::new()?;
    let result = SqlitePrefs::from_config(&config(&dir), &MockKeystore::unavailable());
    assert!(matches!(result, Err(Error::StorageUnavailable(_))));
    Ok(())
}

#[test]
fn test_keystore_lost_after_setup() -> Result<()> {
    let dir = TempDir::new()?;
    let config = config(&dir);

    let store = CredentialStore::open(&config, &MockKeystore::new())?;
    store.set_password("secret1")?;
    drop(store);

    let result = CredentialStore::open(&config, &MockKeystore::unavailable());
    assert!(matches!(result, Err(Error::StorageUnavailable(_))));
    Ok(())
}

#[test]
fn test_missing_sealed_key_with_existing_database() -> Result<()> {
    let dir = TempDir::new()?;
    let config = config(&dir);
    let keystore = MockKeystore::new();

    let store = CredentialStore::open(&config, &keystore)?;
    store.set_password("secret1")?;
    drop(store);

    fs::remove_file(config.sealed_key_path())?;
    let result = SqlitePrefs::from_config(&config, &keystore);
    assert!(matches!(result, Err(Error::StorageUnavailable(_))));
    Ok(())
}

#[test]
fn test_garbled_sealed_key() -> Result<()> {
    let dir = TempDir::new()?;
    let config = config(&dir);
    let keystore = MockKeystore::new();

    drop(SqlitePrefs::from_config(&config, &keystore)?);
    fs::write(config.sealed_key_path(), b"\x01\x02")?;

    let result = SqlitePrefs::from_config(&config, &keystore);
    assert!(matches!(result, Err(Error::StorageUnavailable(_))));
    Ok(())
}

#[test]
fn test_software_keystore_reopens_database() -> Result<()> {
    let dir = TempDir::new()?;
    let config = config(&dir);
    let algorithm = EncryptionAlgorithm::from(config.seal_algorithm);

    {
        let keystore = SoftwareKeystore::open(config.device_key_path(), algorithm)?;
        let store = CredentialStore::open(&config, &keystore)?;
        store.set_password("secret1")?;
    }

    let keystore = SoftwareKeystore::open(config.device_key_path(), algorithm)?;
    let store = CredentialStore::open(&config, &keystore)?;
    assert!(store.check_password("secret1")?);
    assert!(!store.check_password("secret2")?);
    Ok(())
}

#[test]
fn test_replaced_device_key_is_storage_unavailable() -> Result<()> {
    let dir = TempDir::new()?;
    let config = config(&dir);
    let algorithm = EncryptionAlgorithm::ChaCha20Poly1305;

    {
        let keystore = SoftwareKeystore::open(config.device_key_path(), algorithm)?;
        CredentialStore::open(&config, &keystore)?.set_password("secret1")?;
    }

    fs::remove_file(config.device_key_path())?;
    let keystore = SoftwareKeystore::open(config.device_key_path(), algorithm)?;
    let result = CredentialStore::open(&config, &keystore);
    assert!(matches!(result, Err(Error::StorageUnavailable(_))));
    Ok(())
}
