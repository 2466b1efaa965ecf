//! Raw SQLCipher key for the preferences database

use crate::{Error, Result};
use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroizing;

/// Key length SQLCipher expects for a raw key
pub const DB_KEY_LEN: usize = 32;

/// Database key; wiped from memory on drop
pub struct EncryptionKey(Zeroizing<[u8; DB_KEY_LEN]>);

impl EncryptionKey {
    /// Fresh random key for a new store
    pub fn generate() -> Self {
        let mut key = Zeroizing::new([0u8; DB_KEY_LEN]);
        OsRng.fill_bytes(&mut *key);
        Self(key)
    }

    /// Wrap known key bytes
    pub fn from_bytes(bytes: [u8; DB_KEY_LEN]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Wrap unsealed key material, checking its length
    pub fn from_bytes_slice(bytes: &[u8]) -> Result<Self> {
        let key: [u8; DB_KEY_LEN] = bytes.try_into().map_err(|_| {
            Error::Encryption(format!(
                "database key must be {} bytes, got {}",
                DB_KEY_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self::from_bytes(key))
    }

    /// Key bytes
    pub fn as_bytes(&self) -> &[u8; DB_KEY_LEN] {
        &self.0
    }

    /// Hex form passed to `PRAGMA key`
    pub(crate) fn pragma_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_length_checked() {
        assert!(EncryptionKey::from_bytes_slice(&[1u8; DB_KEY_LEN]).is_ok());
        assert!(EncryptionKey::from_bytes_slice(&[1u8; 16]).is_err());
    }

    #[test]
    fn test_pragma_hex() {
        let key = EncryptionKey::from_bytes([0xab; DB_KEY_LEN]);
        assert_eq!(key.pragma_hex().as_str(), "ab".repeat(DB_KEY_LEN));
    }
}
