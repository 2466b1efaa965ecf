//! Security and encryption primitives
//!
//! Password verifier derivation (PBKDF2-HMAC-SHA1/SHA256, Argon2id),
//! constant-time verifier comparison, and the AEAD key used by the software
//! keystore to seal the database key.

use crate::{Error, Result};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use argon2::{Argon2, Params, Version};
use chacha20poly1305::ChaCha20Poly1305;
use lockgate_params::{KdfParams, SealAlgorithm, SALT_LEN, VERIFIER_LEN};
use rand::{rngs::OsRng, RngCore};
use sha1::Sha1;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// Sealed blob format version
const BLOB_VERSION: u8 = 1;

/// Nonce length for both AEADs
const NONCE_LEN: usize = 12;

/// Encryption algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionAlgorithm {
    /// AES-256-GCM
    AesGcm,
    /// ChaCha20-Poly1305
    ChaCha20Poly1305,
}

impl EncryptionAlgorithm {
    fn id(self) -> u8 {
        match self {
            EncryptionAlgorithm::AesGcm => 0,
            EncryptionAlgorithm::ChaCha20Poly1305 => 1,
        }
    }

    fn from_id(id: u8) -> Result<Self> {
        match id {
            0 => Ok(EncryptionAlgorithm::AesGcm),
            1 => Ok(EncryptionAlgorithm::ChaCha20Poly1305),
            other => Err(Error::Encryption(format!("Unknown algorithm id {}", other))),
        }
    }
}

impl From<SealAlgorithm> for EncryptionAlgorithm {
    fn from(alg: SealAlgorithm) -> Self {
        match alg {
            SealAlgorithm::Aes256Gcm => EncryptionAlgorithm::AesGcm,
            SealAlgorithm::Chacha20Poly1305 => EncryptionAlgorithm::ChaCha20Poly1305,
        }
    }
}

/// 256-bit AEAD key
#[derive(Clone)]
pub struct MasterKey {
    key: Zeroizing<[u8; 32]>,
    algorithm: EncryptionAlgorithm,
}

impl MasterKey {
    /// Generate new random key
    pub fn generate(algorithm: EncryptionAlgorithm) -> Self {
        let mut key = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(&mut *key);
        Self { key, algorithm }
    }

    /// Create from bytes
    pub fn from_bytes(bytes: &[u8], algorithm: EncryptionAlgorithm) -> Result<Self> {
        if bytes.len() != 32 {
            return Err(Error::Encryption("Invalid key length".to_string()));
        }
        let mut key = Zeroizing::new([0u8; 32]);
        key.copy_from_slice(bytes);
        Ok(Self { key, algorithm })
    }

    /// Get key bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }

    /// Algorithm this key encrypts with
    pub fn algorithm(&self) -> EncryptionAlgorithm {
        self.algorithm
    }

    /// Encrypt data
    ///
    /// Format: `[version(1)][algorithm(1)][nonce(12)][ciphertext]`
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);

        let ciphertext = match self.algorithm {
            EncryptionAlgorithm::AesGcm => self
                .aes()
                .encrypt(Nonce::from_slice(&nonce_bytes), plaintext),
            EncryptionAlgorithm::ChaCha20Poly1305 => self
                .chacha()
                .encrypt(chacha20poly1305::Nonce::from_slice(&nonce_bytes), plaintext),
        }
        .map_err(|e| Error::Encryption(e.to_string()))?;

        let mut result = Vec::with_capacity(2 + NONCE_LEN + ciphertext.len());
        result.push(BLOB_VERSION);
        result.push(self.algorithm.id());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    /// Decrypt data produced by [`MasterKey::encrypt`]
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < 2 + NONCE_LEN {
            return Err(Error::Encryption("Invalid ciphertext length".to_string()));
        }
        if data[0] != BLOB_VERSION {
            return Err(Error::Encryption(format!(
                "Unsupported encryption version: {}",
                data[0]
            )));
        }
        let algorithm = EncryptionAlgorithm::from_id(data[1])?;
        if algorithm != self.algorithm {
            return Err(Error::Encryption(format!(
                "Algorithm mismatch: key is {:?}, blob is {:?}",
                self.algorithm, algorithm
            )));
        }

        let nonce = &data[2..2 + NONCE_LEN];
        let ciphertext = &data[2 + NONCE_LEN..];

        match self.algorithm {
            EncryptionAlgorithm::AesGcm => self.aes().decrypt(Nonce::from_slice(nonce), ciphertext),
            EncryptionAlgorithm::ChaCha20Poly1305 => self
                .chacha()
                .decrypt(chacha20poly1305::Nonce::from_slice(nonce), ciphertext),
        }
        .map_err(|e| Error::Encryption(e.to_string()))
    }

    fn aes(&self) -> Aes256Gcm {
        Aes256Gcm::new(aes_gcm::Key::<Aes256Gcm>::from_slice(&self.key[..]))
    }

    fn chacha(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(&self.key[..]))
    }
}

/// Sealed key (encrypted by a platform keystore)
pub struct SealedKey {
    /// Encrypted key material
    pub encrypted_key: Vec<u8>,
    /// Key identifier
    pub key_id: String,
    /// Encryption algorithm
    pub algorithm: EncryptionAlgorithm,
}

impl SealedKey {
    /// Create new sealed key
    pub fn new(encrypted_key: Vec<u8>, key_id: String, algorithm: EncryptionAlgorithm) -> Self {
        Self {
            encrypted_key,
            key_id,
            algorithm,
        }
    }

    /// Serialize for storage
    ///
    /// Format: `[version(1)][algorithm(1)][id_len(u32 LE)][id][key_len(u32 LE)][key]`
    pub fn serialize(&self) -> Vec<u8> {
        let key_id_bytes = self.key_id.as_bytes();
        let mut data = Vec::with_capacity(10 + key_id_bytes.len() + self.encrypted_key.len());

        data.push(BLOB_VERSION);
        data.push(self.algorithm.id());
        data.extend_from_slice(&(key_id_bytes.len() as u32).to_le_bytes());
        data.extend_from_slice(key_id_bytes);
        data.extend_from_slice(&(self.encrypted_key.len() as u32).to_le_bytes());
        data.extend_from_slice(&self.encrypted_key);

        data
    }

    /// Deserialize from storage
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        if data.len() < 10 {
            return Err(Error::Encryption("Invalid sealed key data".to_string()));
        }
        if data[0] != BLOB_VERSION {
            return Err(Error::Encryption("Unknown sealed key version".to_string()));
        }
        let algorithm = EncryptionAlgorithm::from_id(data[1])?;

        let mut pos = 2;
        let key_id_bytes = read_length_prefixed(data, &mut pos)?;
        let key_id = String::from_utf8(key_id_bytes.to_vec())
            .map_err(|_| Error::Encryption("Invalid key ID".to_string()))?;
        let encrypted_key = read_length_prefixed(data, &mut pos)?.to_vec();

        if pos != data.len() {
            return Err(Error::Encryption("Trailing bytes in sealed key".to_string()));
        }

        Ok(Self {
            encrypted_key,
            key_id,
            algorithm,
        })
    }
}

fn read_length_prefixed<'a>(data: &'a [u8], pos: &mut usize) -> Result<&'a [u8]> {
    let len_bytes: [u8; 4] = data
        .get(*pos..*pos + 4)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| Error::Encryption("Truncated sealed key".to_string()))?;
    *pos += 4;
    let len = u32::from_le_bytes(len_bytes) as usize;
    let field = data
        .get(*pos..*pos + len)
        .ok_or_else(|| Error::Encryption("Truncated sealed key".to_string()))?;
    *pos += len;
    Ok(field)
}

/// Generate a fresh credential salt
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Derive a password verifier with the given parameter set.
///
/// Deterministic for equal `(password, salt, params)`.
pub fn derive_verifier(
    password: &str,
    salt: &[u8],
    params: &KdfParams,
) -> Result<Zeroizing<[u8; VERIFIER_LEN]>> {
    if salt.len() < SALT_LEN {
        return Err(Error::Kdf("Salt too short".to_string()));
    }
    params.validate()?;

    let mut out = Zeroizing::new([0u8; VERIFIER_LEN]);
    match *params {
        KdfParams::Pbkdf2Sha1 { iterations } => {
            pbkdf2::pbkdf2_hmac::<Sha1>(password.as_bytes(), salt, iterations, &mut *out);
        }
        KdfParams::Pbkdf2Sha256 { iterations } => {
            pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut *out);
        }
        KdfParams::Argon2id {
            memory_kib,
            iterations,
            lanes,
        } => {
            let argon_params = Params::new(memory_kib, iterations, lanes, Some(VERIFIER_LEN))
                .map_err(|e| Error::Kdf(e.to_string()))?;
            Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, argon_params)
                .hash_password_into(password.as_bytes(), salt, &mut *out)
                .map_err(|e| Error::Kdf(e.to_string()))?;
        }
    }
    Ok(out)
}

/// Compare two verifiers without an early exit on the first differing byte
pub fn verifiers_match(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}
