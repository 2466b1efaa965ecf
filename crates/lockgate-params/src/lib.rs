//! Lockgate parameters and configuration
//!
//! This crate provides the key-derivation parameter sets used for stored
//! credentials (with their persisted tag format), the fixed sizes of the
//! credential record, and the on-disk gate configuration.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod kdf;

pub use config::{default_data_dir, GateConfig, SealAlgorithm};
pub use kdf::{KdfParams, LEGACY_KDF, SALT_LEN, VERIFIER_LEN};

/// Error types for parameter operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unknown or malformed KDF parameter tag
    #[error("Invalid KDF parameters: {0}")]
    InvalidKdf(String),

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Config file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for parameter operations
pub type Result<T> = std::result::Result<T, Error>;
