//! Gate configuration file

use crate::{Error, KdfParams, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default name of the secure preferences region
pub const DEFAULT_PREFS_NAME: &str = "secure_prefs";

/// Cipher used to seal the database key on disk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SealAlgorithm {
    /// ChaCha20-Poly1305
    #[default]
    Chacha20Poly1305,
    /// AES-256-GCM
    Aes256Gcm,
}

/// Gate configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Directory holding the encrypted preferences and sealed key
    pub data_dir: PathBuf,
    /// Name of the preferences region (and database file stem)
    pub prefs_name: String,
    /// Parameter set for newly written credentials
    pub kdf: KdfParams,
    /// Cipher for the software keystore
    pub seal_algorithm: SealAlgorithm,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            prefs_name: DEFAULT_PREFS_NAME.to_string(),
            kdf: KdfParams::default(),
            seal_algorithm: SealAlgorithm::default(),
        }
    }
}

impl GateConfig {
    /// Load and validate a config file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: GateConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file, falling back to defaults when it does not exist
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Check the config for values the storage layer cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.prefs_name.is_empty()
            || self
                .prefs_name
                .chars()
                .any(|c| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
        {
            return Err(Error::Config(format!(
                "prefs_name must be non-empty and contain only [A-Za-z0-9_-], got {:?}",
                self.prefs_name
            )));
        }
        self.kdf.validate()
    }

    /// Path of the encrypted preferences database
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.db", self.prefs_name))
    }

    /// Path of the sealed database key
    pub fn sealed_key_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.dbkey", self.prefs_name))
    }

    /// Path of the software keystore's device key
    pub fn device_key_path(&self) -> PathBuf {
        self.data_dir.join("device.key")
    }
}

/// Platform data directory for lockgate
pub fn default_data_dir() -> PathBuf {
    if let Some(proj_dirs) = directories::ProjectDirs::from("org", "lockgate", "lockgate") {
        proj_dirs.data_dir().to_path_buf()
    } else {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".into());
        PathBuf::from(home).join(".lockgate")
    }
}
