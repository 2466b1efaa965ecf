//! Platform keystore integration for sealing the database key
//!
//! The preferences database is encrypted with a random key. That key is
//! never written in the clear: it is sealed by a [`PlatformKeystore`] and
//! only the sealed blob is stored next to the database. Platform bindings
//! (Android Keystore, Keychain, DPAPI, libsecret) implement the trait on
//! the integrator's side; this crate ships a software implementation backed
//! by a device key file, and a mock for tests.

use crate::{EncryptionAlgorithm, Error, MasterKey, Result, SealedKey};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

/// Outcome of an unseal, which a platform may gate behind user
/// authentication
#[derive(Debug)]
pub enum KeystoreResult<T> {
    /// Key material released
    Success(T),
    /// The user dismissed the platform prompt
    Cancelled,
    /// The platform rejected the user's authentication
    AuthFailed,
    /// No keystore on this device
    NotAvailable,
    /// Any other failure
    Error(Error),
}

impl<T> KeystoreResult<T> {
    /// Collapse into a storage result; anything but success means the
    /// encrypted store cannot be opened.
    pub fn into_storage_result(self) -> Result<T> {
        match self {
            KeystoreResult::Success(v) => Ok(v),
            KeystoreResult::Cancelled => Err(Error::StorageUnavailable(
                "keystore unlock cancelled".to_string(),
            )),
            KeystoreResult::AuthFailed => Err(Error::StorageUnavailable(
                "keystore authentication failed".to_string(),
            )),
            KeystoreResult::NotAvailable => Err(Error::StorageUnavailable(
                "keystore not available".to_string(),
            )),
            KeystoreResult::Error(e) => {
                Err(Error::StorageUnavailable(format!("keystore error: {}", e)))
            }
        }
    }
}

impl<T> From<Result<T>> for KeystoreResult<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(v) => KeystoreResult::Success(v),
            Err(e) => KeystoreResult::Error(e),
        }
    }
}

/// Seals the database key under a key the platform guards
pub trait PlatformKeystore: Send + Sync {
    /// True if sealing keys live in secure hardware (TEE, Secure Enclave)
    fn hardware_backed(&self) -> bool {
        false
    }

    /// Seal (encrypt) key material under the keystore's own key
    fn seal_key(&self, key: &[u8], key_id: &str) -> Result<SealedKey>;

    /// Unseal key material previously sealed by this keystore
    fn unseal_key(&self, sealed: &SealedKey) -> KeystoreResult<Zeroizing<Vec<u8>>>;
}

/// Software keystore: seals with a random device key kept in a file
/// readable only by the current user.
pub struct SoftwareKeystore {
    device_key: MasterKey,
    key_path: PathBuf,
}

impl SoftwareKeystore {
    /// Load the device key at `key_path`, creating it on first use
    pub fn open<P: AsRef<Path>>(key_path: P, algorithm: EncryptionAlgorithm) -> Result<Self> {
        let key_path = key_path.as_ref().to_path_buf();

        let device_key = if key_path.exists() {
            let bytes = Zeroizing::new(fs::read(&key_path)?);
            MasterKey::from_bytes(&bytes, algorithm).map_err(|_| {
                Error::StorageUnavailable(format!(
                    "device key {} is malformed",
                    key_path.display()
                ))
            })?
        } else {
            if let Some(parent) = key_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let key = MasterKey::generate(algorithm);
            write_private(&key_path, key.as_bytes())?;
            tracing::info!("Created device key at {}", key_path.display());
            key
        };

        Ok(Self {
            device_key,
            key_path,
        })
    }

    /// Path of the device key file
    pub fn key_path(&self) -> &Path {
        &self.key_path
    }
}

impl PlatformKeystore for SoftwareKeystore {
    fn seal_key(&self, key: &[u8], key_id: &str) -> Result<SealedKey> {
        let encrypted = self.device_key.encrypt(key)?;
        Ok(SealedKey::new(
            encrypted,
            key_id.to_string(),
            self.device_key.algorithm(),
        ))
    }

    fn unseal_key(&self, sealed: &SealedKey) -> KeystoreResult<Zeroizing<Vec<u8>>> {
        if sealed.algorithm != self.device_key.algorithm() {
            return KeystoreResult::Error(Error::Encryption(format!(
                "sealed with {:?}, device key is {:?}",
                sealed.algorithm,
                self.device_key.algorithm()
            )));
        }
        self.device_key
            .decrypt(&sealed.encrypted_key)
            .map(Zeroizing::new)
            .into()
    }
}

/// Create `path` with owner-only permissions and write `bytes`.
///
/// The mode is applied at creation, so the key is never readable by others.
/// Fails if the file already exists.
fn write_private(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(())
}

/// Mock keystore for tests
pub struct MockKeystore {
    available: bool,
}

impl MockKeystore {
    const XOR_KEY: u8 = 0x5A;

    /// Create a working mock keystore
    pub fn new() -> Self {
        Self { available: true }
    }

    /// Mock keystore that refuses every operation
    pub fn unavailable() -> Self {
        Self { available: false }
    }
}

impl Default for MockKeystore {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformKeystore for MockKeystore {
    fn seal_key(&self, key: &[u8], key_id: &str) -> Result<SealedKey> {
        if !self.available {
            return Err(Error::Encryption("mock keystore unavailable".to_string()));
        }
        let encrypted = key.iter().map(|b| b ^ Self::XOR_KEY).collect();
        Ok(SealedKey::new(
            encrypted,
            key_id.to_string(),
            EncryptionAlgorithm::ChaCha20Poly1305,
        ))
    }

    fn unseal_key(&self, sealed: &SealedKey) -> KeystoreResult<Zeroizing<Vec<u8>>> {
        if !self.available {
            return KeystoreResult::NotAvailable;
        }
        KeystoreResult::Success(Zeroizing::new(
            sealed.encrypted_key.iter().map(|b| b ^ Self::XOR_KEY).collect(),
        ))
    }
}
