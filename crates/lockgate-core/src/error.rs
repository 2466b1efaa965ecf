//! Error types for Lockgate core

use std::fmt;

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Lockgate core errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Credential storage failed
    #[error("Storage error: {0}")]
    Storage(#[from] lockgate_storage_sqlite::Error),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] lockgate_params::Error),
}

impl Error {
    /// True when the encrypted store or its keystore cannot be reached.
    ///
    /// The gate cannot decide anything in this state; callers should keep
    /// the app locked and surface [`Error::user_message`].
    pub fn is_storage_unavailable(&self) -> bool {
        matches!(
            self,
            Error::Storage(lockgate_storage_sqlite::Error::StorageUnavailable(_))
        )
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self.category() {
            ErrorCategory::Unavailable => {
                "Secure storage is unavailable on this device. Please try again later.".to_string()
            }
            ErrorCategory::Config => {
                "The lock configuration is invalid. Please check your settings.".to_string()
            }
            ErrorCategory::Internal => "Something went wrong. Please try again.".to_string(),
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> ErrorCategory {
        match self {
            _ if self.is_storage_unavailable() => ErrorCategory::Unavailable,
            Error::Config(_) | Error::Storage(lockgate_storage_sqlite::Error::Params(_)) => {
                ErrorCategory::Config
            }
            Error::Storage(_) => ErrorCategory::Internal,
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Secure storage or keystore cannot be reached
    Unavailable,
    /// Bad configuration or KDF parameters
    Config,
    /// Database, I/O and other internal failures
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Unavailable => write!(f, "Unavailable"),
            ErrorCategory::Config => write!(f, "Config"),
            ErrorCategory::Internal => write!(f, "Internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockgate_storage_sqlite::Error as StorageError;

    #[test]
    fn test_error_categories() {
        let unavailable = Error::from(StorageError::StorageUnavailable("keystore".into()));
        assert!(unavailable.is_storage_unavailable());
        assert_eq!(unavailable.category(), ErrorCategory::Unavailable);

        let params = Error::from(StorageError::Params(lockgate_params::Error::InvalidKdf(
            "zero iterations".into(),
        )));
        assert_eq!(params.category(), ErrorCategory::Config);

        let migration = Error::from(StorageError::Migration("newer schema".into()));
        assert!(!migration.is_storage_unavailable());
        assert_eq!(migration.category(), ErrorCategory::Internal);
    }

    #[test]
    fn test_user_message_hides_details() {
        let error = Error::from(StorageError::StorageUnavailable("/secret/path".into()));
        let msg = error.user_message();
        assert!(msg.contains("unavailable"));
        assert!(!msg.contains("/secret/path"));
    }

    #[test]
    fn test_category_display() {
        assert_eq!(ErrorCategory::Unavailable.to_string(), "Unavailable");
        assert_eq!(ErrorCategory::Internal.to_string(), "Internal");
    }
}
