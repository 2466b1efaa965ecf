//! Encrypted key-value preferences
//!
//! [`SecurePrefs`] is the storage capability the credential store is built
//! on: single-key reads, consistent multi-key snapshots, and atomic batch
//! commits. [`SqlitePrefs`] keeps one named region in an SQLCipher database
//! whose key is sealed by a [`PlatformKeystore`]; [`MemoryPrefs`] keeps
//! everything in process memory.

use crate::keystore::PlatformKeystore;
use crate::retry::with_busy_retry;
use crate::{Database, EncryptionKey, Error, Result, SealedKey};
use lockgate_params::GateConfig;
use parking_lot::{Mutex, RwLock};
use rusqlite::params;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// One mutation inside a [`PrefsBatch`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrefsOp {
    /// Insert or overwrite a value
    Put {
        /// Entry key
        key: String,
        /// Entry value
        value: String,
    },
    /// Delete a value (no-op if absent)
    Remove {
        /// Entry key
        key: String,
    },
}

/// Ordered set of mutations applied all-or-nothing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefsBatch {
    ops: Vec<PrefsOp>,
}

impl PrefsBatch {
    /// Empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a put
    pub fn put(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.ops.push(PrefsOp::Put {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Add a remove
    pub fn remove(mut self, key: impl Into<String>) -> Self {
        self.ops.push(PrefsOp::Remove { key: key.into() });
        self
    }

    /// Operations in application order
    pub fn ops(&self) -> &[PrefsOp] {
        &self.ops
    }

    /// True if the batch has no operations
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// At-rest protected key-value storage
pub trait SecurePrefs: Send + Sync {
    /// Read several keys as one consistent view
    fn snapshot(&self, keys: &[&str]) -> Result<Vec<Option<String>>>;

    /// Apply every operation of `batch` atomically
    fn commit(&self, batch: PrefsBatch) -> Result<()>;

    /// Read a single key
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.snapshot(&[key])?.pop().flatten())
    }

    /// True if `key` has a value
    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Write a single key
    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.commit(PrefsBatch::new().put(key, value))
    }

    /// Delete a single key
    fn remove(&self, key: &str) -> Result<()> {
        self.commit(PrefsBatch::new().remove(key))
    }
}

/// In-memory preferences
#[derive(Default)]
pub struct MemoryPrefs {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryPrefs {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecurePrefs for MemoryPrefs {
    fn snapshot(&self, keys: &[&str]) -> Result<Vec<Option<String>>> {
        let entries = self.entries.read();
        Ok(keys.iter().map(|k| entries.get(*k).cloned()).collect())
    }

    fn commit(&self, batch: PrefsBatch) -> Result<()> {
        let mut entries = self.entries.write();
        for op in batch.ops {
            match op {
                PrefsOp::Put { key, value } => {
                    entries.insert(key, value);
                }
                PrefsOp::Remove { key } => {
                    entries.remove(&key);
                }
            }
        }
        Ok(())
    }
}

/// Preferences region stored in an SQLCipher database
pub struct SqlitePrefs {
    db: Mutex<Database>,
    region: String,
}

impl SqlitePrefs {
    /// Open the store described by `config`
    pub fn from_config(config: &GateConfig, keystore: &dyn PlatformKeystore) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;
        Self::open(
            config.database_path(),
            config.sealed_key_path(),
            &config.prefs_name,
            keystore,
        )
    }

    /// Open (or create) the database at `db_path`.
    ///
    /// On first use a random database key is generated, sealed by
    /// `keystore` and written to `sealed_key_path`. Later opens unseal it.
    /// Any failure to obtain the key is [`Error::StorageUnavailable`].
    pub fn open<P: AsRef<Path>, Q: AsRef<Path>>(
        db_path: P,
        sealed_key_path: Q,
        region: &str,
        keystore: &dyn PlatformKeystore,
    ) -> Result<Self> {
        let db_path = db_path.as_ref();
        let sealed_key_path = sealed_key_path.as_ref();
        let key_id = format!("lockgate_{}_db", region);

        let key = if sealed_key_path.exists() {
            load_db_key(sealed_key_path, keystore)?
        } else {
            let db_has_data = db_path.exists() && fs::metadata(db_path)?.len() > 0;
            if db_has_data {
                return Err(Error::StorageUnavailable(format!(
                    "{} exists but its sealed key is missing",
                    db_path.display()
                )));
            }
            create_db_key(sealed_key_path, &key_id, keystore)?
        };

        let db = Database::open(db_path, &key)?;
        tracing::debug!("Opened secure preferences region {:?}", region);

        Ok(Self {
            db: Mutex::new(db),
            region: region.to_string(),
        })
    }

    /// Region name
    pub fn region(&self) -> &str {
        &self.region
    }
}

fn load_db_key(sealed_key_path: &Path, keystore: &dyn PlatformKeystore) -> Result<EncryptionKey> {
    let data = fs::read(sealed_key_path)?;
    let sealed = SealedKey::deserialize(&data).map_err(|e| {
        Error::StorageUnavailable(format!(
            "sealed key {} is unreadable: {}",
            sealed_key_path.display(),
            e
        ))
    })?;
    let bytes = keystore.unseal_key(&sealed).into_storage_result()?;
    EncryptionKey::from_bytes_slice(&bytes)
        .map_err(|e| Error::StorageUnavailable(format!("unsealed key invalid: {}", e)))
}

fn create_db_key(
    sealed_key_path: &Path,
    key_id: &str,
    keystore: &dyn PlatformKeystore,
) -> Result<EncryptionKey> {
    let key = EncryptionKey::generate();
    let sealed = keystore
        .seal_key(key.as_bytes(), key_id)
        .map_err(|e| Error::StorageUnavailable(format!("failed to seal database key: {}", e)))?;

    if let Some(parent) = sealed_key_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = sealed_key_path.with_extension("tmp");
    fs::write(&tmp_path, sealed.serialize())?;
    fs::rename(&tmp_path, sealed_key_path)?;

    tracing::info!("Sealed new database key {}", key_id);
    Ok(key)
}

impl SecurePrefs for SqlitePrefs {
    fn snapshot(&self, keys: &[&str]) -> Result<Vec<Option<String>>> {
        let db = self.db.lock();
        // Single statement, so the view is one consistent read.
        let region_entries = with_busy_retry(|| {
            let mut stmt = db
                .conn()
                .prepare_cached("SELECT key, value FROM secure_prefs WHERE region = ?1")?;
            let rows = stmt.query_map(params![self.region], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            let mut entries = HashMap::new();
            for row in rows {
                let (key, value) = row?;
                entries.insert(key, value);
            }
            Ok(entries)
        })?;

        Ok(keys.iter().map(|k| region_entries.get(*k).cloned()).collect())
    }

    fn commit(&self, batch: PrefsBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut db = self.db.lock();
        with_busy_retry(|| {
            let updated_at = chrono::Utc::now().timestamp();
            let tx = db.immediate_transaction()?;
            for op in batch.ops() {
                match op {
                    PrefsOp::Put { key, value } => {
                        tx.execute(
                            r#"
                            INSERT INTO secure_prefs (region, key, value, updated_at)
                            VALUES (?1, ?2, ?3, ?4)
                            ON CONFLICT(region, key) DO UPDATE SET
                                value = excluded.value,
                                updated_at = excluded.updated_at
                            "#,
                            params![self.region, key, value, updated_at],
                        )?;
                    }
                    PrefsOp::Remove { key } => {
                        tx.execute(
                            "DELETE FROM secure_prefs WHERE region = ?1 AND key = ?2",
                            params![self.region, key],
                        )?;
                    }
                }
            }
            tx.commit()?;
            Ok(())
        })
    }
}
