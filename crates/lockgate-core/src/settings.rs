//! Settings screen model for turning password protection on and off

use crate::Result;
use lockgate_storage_sqlite::CredentialStore;
use std::sync::Arc;

/// Result of flipping the protection toggle on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// A password is already configured
    Enabled,
    /// No password yet; ask for one and leave the toggle off
    PasswordRequired,
}

/// Protection toggle and password change, backed by the credential store
pub struct ProtectionSettings {
    store: Arc<CredentialStore>,
}

impl ProtectionSettings {
    /// Settings over `store`
    pub fn new(store: Arc<CredentialStore>) -> Self {
        Self { store }
    }

    /// Whether protection is on, i.e. a credential exists
    pub fn is_enabled(&self) -> Result<bool> {
        Ok(self.store.has_credential()?)
    }

    /// User switched the toggle on
    pub fn request_enable(&self) -> Result<ToggleOutcome> {
        if self.store.has_credential()? {
            Ok(ToggleOutcome::Enabled)
        } else {
            Ok(ToggleOutcome::PasswordRequired)
        }
    }

    /// User switched the toggle off
    pub fn disable(&self) -> Result<()> {
        self.store.clear_password()?;
        tracing::info!("Password protection disabled");
        Ok(())
    }

    /// Replace the password (empty disables protection).
    ///
    /// Returns whether protection is enabled afterwards. The current
    /// password is not asked for.
    pub fn change_password(&self, new_password: &str) -> Result<bool> {
        self.store.set_password(new_password)?;
        self.is_enabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockgate_params::KdfParams;
    use lockgate_storage_sqlite::MemoryPrefs;

    fn settings() -> (Arc<CredentialStore>, ProtectionSettings) {
        let store = Arc::new(
            CredentialStore::new(
                Arc::new(MemoryPrefs::new()),
                KdfParams::Pbkdf2Sha256 { iterations: 8 },
            )
            .unwrap(),
        );
        (Arc::clone(&store), ProtectionSettings::new(store))
    }

    #[test]
    fn test_enable_requires_password() {
        let (_, settings) = settings();
        assert!(!settings.is_enabled().unwrap());
        assert_eq!(
            settings.request_enable().unwrap(),
            ToggleOutcome::PasswordRequired
        );
        assert!(!settings.is_enabled().unwrap());
    }

    #[test]
    fn test_change_password_enables_and_empty_disables() {
        let (store, settings) = settings();

        assert!(settings.change_password("secret1").unwrap());
        assert_eq!(settings.request_enable().unwrap(), ToggleOutcome::Enabled);
        assert!(store.check_password("secret1").unwrap());

        assert!(settings.change_password("secret2").unwrap());
        assert!(!store.check_password("secret1").unwrap());

        assert!(!settings.change_password("").unwrap());
        assert!(!settings.is_enabled().unwrap());
    }

    #[test]
    fn test_disable_clears_credential() {
        let (store, settings) = settings();
        settings.change_password("secret1").unwrap();

        settings.disable().unwrap();
        assert!(!settings.is_enabled().unwrap());
        assert!(store.check_password("anything").unwrap());

        settings.disable().unwrap();
    }
}
