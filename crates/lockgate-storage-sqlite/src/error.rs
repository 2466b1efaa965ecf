//! Error types

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Encryption error
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),

    /// Encrypted storage backend could not be initialised (keystore failure,
    /// unreadable sealed key, wrong database key)
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A stored credential entry is present but cannot be decoded
    #[error("Corrupt credential: {0}")]
    CorruptCredential(String),

    /// Key derivation failed
    #[error("Key derivation error: {0}")]
    Kdf(String),

    /// Invalid parameters
    #[error("Parameter error: {0}")]
    Params(#[from] lockgate_params::Error),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
