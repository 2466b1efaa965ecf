//! Encrypted credential storage for Lockgate
//!
//! Provides the credential store behind the app's unlock gate: salted
//! password verifiers kept in an encrypted-at-rest preferences database.
//!
//! ## Security Features
//!
//! - **Verifier KDF**: PBKDF2-HMAC-SHA256 (10000 iterations) by default,
//!   legacy PBKDF2-HMAC-SHA1 and Argon2id supported; the parameter set is
//!   stored with each credential and upgraded on the next successful check
//!   when the configured set is stronger
//! - **Constant-time comparison** of verifiers
//! - **Database Encryption**: SQLCipher with a random 256-bit key
//! - **Key Sealing**: the database key is sealed by a platform keystore
//! - **Atomic Commits**: salt, verifier and KDF tag change together or not at all

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod credential;
pub mod credential_store;
pub mod database;
pub mod encryption;
pub mod error;
pub mod keystore;
pub mod migrations;
pub mod prefs;
pub mod retry;
pub mod security;

pub use credential::{Credential, KEY_PASSWORD_HASH, KEY_PASSWORD_KDF, KEY_PASSWORD_SALT};
pub use credential_store::CredentialStore;
pub use database::Database;
pub use encryption::EncryptionKey;
pub use error::{Error, Result};
pub use keystore::{KeystoreResult, MockKeystore, PlatformKeystore, SoftwareKeystore};
pub use prefs::{MemoryPrefs, PrefsBatch, PrefsOp, SecurePrefs, SqlitePrefs};
pub use retry::{BASE_BACKOFF_MS, MAX_BACKOFF_MS, MAX_BUSY_RETRIES};
pub use security::{
    derive_verifier, generate_salt, verifiers_match, EncryptionAlgorithm, MasterKey, SealedKey,
};
