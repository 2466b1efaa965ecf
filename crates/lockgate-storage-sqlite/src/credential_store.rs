//! Credential store: set, check and clear the local unlock password
//!
//! The credential is three entries in a [`SecurePrefs`] region
//! (`password_hash`, `password_salt`, `password_kdf`), always written and
//! removed in a single batch. Mutations are serialized by a writer lock;
//! reads go through [`SecurePrefs::snapshot`] and therefore only ever see a
//! complete credential or none.

use crate::credential::{
    Credential, CREDENTIAL_KEYS, KEY_PASSWORD_HASH, KEY_PASSWORD_KDF, KEY_PASSWORD_SALT,
};
use crate::keystore::PlatformKeystore;
use crate::prefs::{PrefsBatch, SecurePrefs, SqlitePrefs};
use crate::{Error, Result};
use lockgate_params::{GateConfig, KdfParams};
use parking_lot::Mutex;
use std::sync::Arc;

/// What the preferences currently hold
enum Stored {
    Absent,
    Present(Credential),
    Corrupt(String),
}

/// Password credential store
pub struct CredentialStore {
    prefs: Arc<dyn SecurePrefs>,
    kdf: KdfParams,
    write_lock: Mutex<()>,
}

impl CredentialStore {
    /// Create a store over `prefs`, deriving new credentials with `kdf`
    pub fn new(prefs: Arc<dyn SecurePrefs>, kdf: KdfParams) -> Result<Self> {
        kdf.validate()?;
        Ok(Self {
            prefs,
            kdf,
            write_lock: Mutex::new(()),
        })
    }

    /// Open the encrypted preferences described by `config`
    pub fn open(config: &GateConfig, keystore: &dyn PlatformKeystore) -> Result<Self> {
        let prefs = SqlitePrefs::from_config(config, keystore)?;
        Self::new(Arc::new(prefs), config.kdf)
    }

    /// Parameter set used for newly written credentials
    pub fn kdf(&self) -> KdfParams {
        self.kdf
    }

    /// True iff both the verifier and the salt are stored
    pub fn has_credential(&self) -> Result<bool> {
        let values = self.prefs.snapshot(&[KEY_PASSWORD_HASH, KEY_PASSWORD_SALT])?;
        Ok(values.iter().all(Option::is_some))
    }

    /// Parameter set of the stored credential, if any
    pub fn stored_kdf(&self) -> Result<Option<KdfParams>> {
        match self.load()? {
            Stored::Present(credential) => Ok(Some(credential.kdf())),
            Stored::Absent | Stored::Corrupt(_) => Ok(None),
        }
    }

    /// Replace the credential with one for `plaintext`.
    ///
    /// An empty password disables protection: it clears the credential
    /// instead of storing a verifier for `""`.
    pub fn set_password(&self, plaintext: &str) -> Result<()> {
        if plaintext.is_empty() {
            return self.clear_password();
        }

        // Derive outside the writer lock; the KDF is the slow part.
        let credential = Credential::derive(plaintext, self.kdf)?;

        let _guard = self.write_lock.lock();
        self.write(&credential)?;
        tracing::info!("Password set ({})", self.kdf);
        Ok(())
    }

    /// Check `plaintext` against the stored credential.
    ///
    /// Returns `Ok(true)` when no credential is configured. A wrong password
    /// is `Ok(false)`. A stored record that cannot be decoded or evaluated
    /// also yields `Ok(false)` but is logged as corruption. Only storage
    /// failures are errors.
    ///
    /// A match against a credential derived with weaker parameters than the
    /// configured ones rewrites it under the configured set. Stronger stored
    /// credentials are left alone.
    pub fn check_password(&self, plaintext: &str) -> Result<bool> {
        let credential = match self.load()? {
            Stored::Absent => return Ok(true),
            Stored::Corrupt(reason) => {
                tracing::warn!("Stored credential is corrupt, rejecting attempt: {}", reason);
                return Ok(false);
            }
            Stored::Present(credential) => credential,
        };

        match credential.verify(plaintext) {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!("Password check failed");
                return Ok(false);
            }
            Err(e @ (Error::Kdf(_) | Error::Params(_))) => {
                tracing::warn!(
                    "Stored credential cannot be evaluated, rejecting attempt: {}",
                    e
                );
                return Ok(false);
            }
            Err(e) => return Err(e),
        }

        if self.kdf.is_stronger_than(&credential.kdf()) {
            if let Err(e) = self.upgrade(plaintext, &credential) {
                tracing::warn!("Failed to upgrade credential parameters: {}", e);
            }
        }

        Ok(true)
    }

    /// Remove the credential. Clearing an empty store is a no-op.
    pub fn clear_password(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        let batch = CREDENTIAL_KEYS
            .iter()
            .fold(PrefsBatch::new(), |batch, key| batch.remove(*key));
        self.prefs.commit(batch)?;
        tracing::info!("Password cleared");
        Ok(())
    }

    fn load(&self) -> Result<Stored> {
        let mut values = self.prefs.snapshot(&CREDENTIAL_KEYS)?.into_iter();
        let hash = values.next().flatten();
        let salt = values.next().flatten();
        let kdf = values.next().flatten();

        match (hash, salt) {
            (Some(hash), Some(salt)) => match Credential::decode(&hash, &salt, kdf.as_deref()) {
                Ok(credential) => Ok(Stored::Present(credential)),
                Err(Error::CorruptCredential(reason)) => Ok(Stored::Corrupt(reason)),
                Err(e) => Err(e),
            },
            (None, None) => Ok(Stored::Absent),
            (hash, _) => {
                let present = if hash.is_some() {
                    KEY_PASSWORD_HASH
                } else {
                    KEY_PASSWORD_SALT
                };
                tracing::warn!("Ignoring orphaned {} entry without its pair", present);
                Ok(Stored::Absent)
            }
        }
    }

    fn write(&self, credential: &Credential) -> Result<()> {
        let (hash, salt, kdf) = credential.encode();
        self.prefs.commit(
            PrefsBatch::new()
                .put(KEY_PASSWORD_HASH, hash)
                .put(KEY_PASSWORD_SALT, salt)
                .put(KEY_PASSWORD_KDF, kdf),
        )
    }

    /// Re-derive a verified password under the configured parameters
    fn upgrade(&self, plaintext: &str, verified: &Credential) -> Result<()> {
        let replacement = Credential::derive(plaintext, self.kdf)?;

        let _guard = self.write_lock.lock();
        // A concurrent set or clear wins over the upgrade.
        match self.load()? {
            Stored::Present(current) if current.salt() == verified.salt() => {}
            _ => return Ok(()),
        }
        self.write(&replacement)?;
        tracing::info!(
            "Upgraded credential parameters from {} to {}",
            verified.kdf(),
            self.kdf
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::MemoryPrefs;

    const FAST: KdfParams = KdfParams::Pbkdf2Sha256 { iterations: 16 };
    const LEGACY_TEST_KDF: KdfParams = KdfParams::Pbkdf2Sha1 { iterations: 16 };

    fn store() -> (Arc<MemoryPrefs>, CredentialStore) {
        let prefs = Arc::new(MemoryPrefs::new());
        let store = CredentialStore::new(prefs.clone(), FAST).unwrap();
        (prefs, store)
    }

    #[test]
    fn test_set_writes_all_entries() {
        let (prefs, store) = store();
        store.set_password("secret1").unwrap();

        let values = prefs.snapshot(&CREDENTIAL_KEYS).unwrap();
        assert!(values.iter().all(Option::is_some));
        assert_eq!(values[2].as_deref(), Some("pbkdf2-sha256:16"));
        assert_ne!(values[0].as_deref(), Some("secret1"));
    }

    #[test]
    fn test_orphaned_salt_reads_as_absent() {
        let (prefs, store) = store();
        prefs.put(KEY_PASSWORD_SALT, &"11".repeat(16)).unwrap();

        assert!(!store.has_credential().unwrap());
        assert!(store.check_password("anything").unwrap());
    }

    #[test]
    fn test_corrupt_record_rejects_every_attempt() {
        let (prefs, store) = store();
        store.set_password("secret1").unwrap();
        prefs.put(KEY_PASSWORD_SALT, "not-hex").unwrap();

        assert!(store.has_credential().unwrap());
        assert!(!store.check_password("secret1").unwrap());
        assert!(!store.check_password("").unwrap());
    }

    #[test]
    fn test_unknown_kdf_tag_is_corrupt() {
        let (prefs, store) = store();
        store.set_password("secret1").unwrap();
        prefs.put(KEY_PASSWORD_KDF, "bcrypt:12").unwrap();
        assert!(!store.check_password("secret1").unwrap());
    }

    #[test]
    fn test_out_of_range_kdf_tag_is_corrupt() {
        let (prefs, store) = store();
        store.set_password("secret1").unwrap();
        for tag in [
            "argon2id:m=4294967295,t=1,p=16777216",
            "argon2id:m=4294967295,t=1,p=1",
            "pbkdf2-sha256:4294967295",
        ] {
            prefs.put(KEY_PASSWORD_KDF, tag).unwrap();
            assert!(!store.check_password("secret1").unwrap(), "{}", tag);
            assert!(!store.check_password("wrong").unwrap(), "{}", tag);
            assert_eq!(store.stored_kdf().unwrap(), None);
        }
    }

    #[test]
    fn test_stronger_stored_kdf_is_not_downgraded() {
        let prefs = Arc::new(MemoryPrefs::new());
        let strong = KdfParams::Argon2id {
            memory_kib: 64,
            iterations: 1,
            lanes: 1,
        };
        CredentialStore::new(prefs.clone(), strong)
            .unwrap()
            .set_password("secret1")
            .unwrap();
        let before = prefs.snapshot(&CREDENTIAL_KEYS).unwrap();

        let weak = CredentialStore::new(prefs.clone(), LEGACY_TEST_KDF).unwrap();
        assert!(weak.check_password("secret1").unwrap());
        assert_eq!(prefs.snapshot(&CREDENTIAL_KEYS).unwrap(), before);
        assert_eq!(weak.stored_kdf().unwrap(), Some(strong));
    }

    #[test]
    fn test_weaker_stored_kdf_is_upgraded() {
        let prefs = Arc::new(MemoryPrefs::new());
        CredentialStore::new(prefs.clone(), LEGACY_TEST_KDF)
            .unwrap()
            .set_password("secret1")
            .unwrap();

        let store = CredentialStore::new(prefs.clone(), FAST).unwrap();
        assert!(store.check_password("secret1").unwrap());
        assert_eq!(store.stored_kdf().unwrap(), Some(FAST));
        assert!(store.check_password("secret1").unwrap());
    }

    #[test]
    fn test_invalid_kdf_config_rejected() {
        let prefs = Arc::new(MemoryPrefs::new());
        let result = CredentialStore::new(prefs, KdfParams::Pbkdf2Sha256 { iterations: 0 });
        assert!(matches!(result, Err(Error::Params(_))));
    }
}
