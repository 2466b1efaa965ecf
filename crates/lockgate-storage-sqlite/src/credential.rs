//! Persisted credential record

use crate::security::{derive_verifier, generate_salt, verifiers_match};
use crate::{Error, Result};
use lockgate_params::{KdfParams, LEGACY_KDF, SALT_LEN, VERIFIER_LEN};
use zeroize::Zeroizing;

/// Entry holding the hex verifier
pub const KEY_PASSWORD_HASH: &str = "password_hash";
/// Entry holding the hex salt
pub const KEY_PASSWORD_SALT: &str = "password_salt";
/// Entry holding the KDF parameter tag (absent on legacy records)
pub const KEY_PASSWORD_KDF: &str = "password_kdf";

/// All entries that make up one credential, in snapshot order
pub const CREDENTIAL_KEYS: [&str; 3] = [KEY_PASSWORD_HASH, KEY_PASSWORD_SALT, KEY_PASSWORD_KDF];

/// Salt + verifier pair for one configured password
pub struct Credential {
    salt: [u8; SALT_LEN],
    verifier: Zeroizing<[u8; VERIFIER_LEN]>,
    kdf: KdfParams,
}

impl Credential {
    /// Derive a credential for `password` with a fresh salt
    pub fn derive(password: &str, kdf: KdfParams) -> Result<Self> {
        let salt = generate_salt();
        let verifier = derive_verifier(password, &salt, &kdf)?;
        Ok(Self {
            salt,
            verifier,
            kdf,
        })
    }

    /// Decode stored entries. `kdf` may be absent (legacy record).
    pub fn decode(hash_hex: &str, salt_hex: &str, kdf: Option<&str>) -> Result<Self> {
        let salt: [u8; SALT_LEN] = decode_fixed(salt_hex, KEY_PASSWORD_SALT)?;
        let verifier = Zeroizing::new(decode_fixed::<VERIFIER_LEN>(hash_hex, KEY_PASSWORD_HASH)?);
        let kdf = match kdf {
            Some(tag) => tag
                .parse()
                .map_err(|e| Error::CorruptCredential(format!("{}: {}", KEY_PASSWORD_KDF, e)))?,
            None => LEGACY_KDF,
        };
        Ok(Self {
            salt,
            verifier,
            kdf,
        })
    }

    /// Hex verifier, hex salt, KDF tag
    pub fn encode(&self) -> (String, String, String) {
        (
            hex::encode(&self.verifier[..]),
            hex::encode(self.salt),
            self.kdf.to_string(),
        )
    }

    /// Recompute the verifier for `password` and compare in constant time
    pub fn verify(&self, password: &str) -> Result<bool> {
        let candidate = derive_verifier(password, &self.salt, &self.kdf)?;
        Ok(verifiers_match(&candidate[..], &self.verifier[..]))
    }

    /// Salt bytes
    pub fn salt(&self) -> &[u8; SALT_LEN] {
        &self.salt
    }

    /// Verifier bytes
    pub fn verifier(&self) -> &[u8; VERIFIER_LEN] {
        &self.verifier
    }

    /// Parameter set the verifier was derived with
    pub fn kdf(&self) -> KdfParams {
        self.kdf
    }
}

fn decode_fixed<const N: usize>(value: &str, field: &str) -> Result<[u8; N]> {
    let bytes = Zeroizing::new(
        hex::decode(value)
            .map_err(|e| Error::CorruptCredential(format!("{} is not valid hex: {}", field, e)))?,
    );
    bytes.as_slice().try_into().map_err(|_| {
        Error::CorruptCredential(format!(
            "{} has {} bytes, expected {}",
            field,
            bytes.len(),
            N
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAST: KdfParams = KdfParams::Pbkdf2Sha256 { iterations: 10 };

    #[test]
    fn test_encode_decode_preserves_verification() {
        let credential = Credential::derive("secret1", FAST).unwrap();
        let (hash, salt, kdf) = credential.encode();
        assert_eq!(hash.len(), VERIFIER_LEN * 2);
        assert_eq!(salt.len(), SALT_LEN * 2);

        let decoded = Credential::decode(&hash, &salt, Some(&kdf)).unwrap();
        assert!(decoded.verify("secret1").unwrap());
        assert!(!decoded.verify("secret2").unwrap());
    }

    #[test]
    fn test_untagged_record_is_legacy() {
        let credential = Credential::decode(&"00".repeat(32), &"11".repeat(16), None).unwrap();
        assert_eq!(credential.kdf(), LEGACY_KDF);
    }

    #[test]
    fn test_verifier_is_not_plaintext() {
        let credential = Credential::derive("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", FAST).unwrap();
        assert_ne!(credential.verifier(), b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
    }

    #[test]
    fn test_corrupt_fields() {
        let good_hash = "00".repeat(32);
        let good_salt = "11".repeat(16);

        for (hash, salt, kdf) in [
            ("zz".repeat(32), good_salt.clone(), None),
            (good_hash.clone(), "abc".to_string(), None),
            (good_hash.clone(), "11".repeat(8), None),
            ("00".repeat(20), good_salt.clone(), None),
            (good_hash.clone(), good_salt.clone(), Some("md5:1")),
        ] {
            let result = Credential::decode(&hash, &salt, kdf);
            assert!(
                matches!(result, Err(Error::CorruptCredential(_))),
                "{:?}/{:?}/{:?} should be corrupt",
                hash,
                salt,
                kdf
            );
        }
    }
}
