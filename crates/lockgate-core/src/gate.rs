//! Gate controller and unlock prompt
//!
//! The gate starts `Locked` when a password is configured and is bypassed
//! otherwise. The only transition is `Locked -> Unlocked`, taken when the
//! credential store accepts an attempt; relocking is the host's business
//! (typically by constructing a new controller on the next launch).

use crate::Result;
use lockgate_storage_sqlite::CredentialStore;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use zeroize::Zeroizing;

/// Message shown for any rejected attempt
pub const INCORRECT_PASSWORD: &str = "Incorrect password";

/// Gate state, process lifetime only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Password required
    Locked,
    /// Access granted (or no password configured)
    Unlocked,
}

/// Owns "is the app currently unlocked"
pub struct GateController {
    store: Arc<CredentialStore>,
    state: RwLock<GateState>,
    failed_attempts: AtomicU32,
}

impl GateController {
    /// Create a controller; `Locked` iff a credential exists
    pub fn new(store: Arc<CredentialStore>) -> Result<Self> {
        let state = if store.has_credential()? {
            GateState::Locked
        } else {
            tracing::debug!("No password configured, gate bypassed");
            GateState::Unlocked
        };

        Ok(Self {
            store,
            state: RwLock::new(state),
            failed_attempts: AtomicU32::new(0),
        })
    }

    /// True while a password is configured and has not been entered.
    ///
    /// Always `false` when no credential exists, even if the controller was
    /// created while one did.
    pub fn is_locked(&self) -> Result<bool> {
        if !self.store.has_credential()? {
            return Ok(false);
        }
        Ok(*self.state.read() == GateState::Locked)
    }

    /// Current state as last recorded
    pub fn state(&self) -> GateState {
        *self.state.read()
    }

    /// Try to unlock with `attempt`
    pub fn unlock(&self, attempt: &str) -> Result<bool> {
        if self.store.check_password(attempt)? {
            let mut state = self.state.write();
            if *state == GateState::Locked {
                tracing::info!("Gate unlocked");
            }
            *state = GateState::Unlocked;
            return Ok(true);
        }

        let failed = self.failed_attempts.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!("Unlock attempt rejected ({} so far)", failed);
        Ok(false)
    }

    /// Rejected attempts since construction
    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts.load(Ordering::Relaxed)
    }

    /// Underlying credential store
    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }
}

/// Result of submitting the prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptOutcome {
    /// The gate is open; leave the lock screen
    Unlocked,
    /// Stay on the lock screen and show `message`
    Rejected {
        /// Text to display
        message: &'static str,
    },
}

/// Lock screen model: an input buffer bound to a gate
pub struct UnlockPrompt {
    gate: Arc<GateController>,
    input: Zeroizing<String>,
}

impl UnlockPrompt {
    /// Prompt for `gate` with an empty input
    pub fn new(gate: Arc<GateController>) -> Self {
        Self {
            gate,
            input: Zeroizing::new(String::new()),
        }
    }

    /// Current input
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Mutable input buffer for incremental editing
    pub fn input_mut(&mut self) -> &mut String {
        &mut self.input
    }

    /// Replace the input
    pub fn set_input(&mut self, value: &str) {
        self.input.clear();
        self.input.push_str(value);
    }

    /// Submit the input to the gate. The input is cleared either way.
    pub fn submit(&mut self) -> Result<PromptOutcome> {
        let unlocked = self.gate.unlock(&self.input);
        self.input.clear();

        if unlocked? {
            Ok(PromptOutcome::Unlocked)
        } else {
            Ok(PromptOutcome::Rejected {
                message: INCORRECT_PASSWORD,
            })
        }
    }

    /// Back navigation never dismisses the lock screen
    pub fn dismissible(&self) -> bool {
        false
    }

    /// Gate this prompt drives
    pub fn gate(&self) -> &Arc<GateController> {
        &self.gate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockgate_params::KdfParams;
    use lockgate_storage_sqlite::MemoryPrefs;

    fn store() -> Arc<CredentialStore> {
        Arc::new(
            CredentialStore::new(
                Arc::new(MemoryPrefs::new()),
                KdfParams::Pbkdf2Sha256 { iterations: 8 },
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_bypassed_without_credential() {
        let gate = GateController::new(store()).unwrap();
        assert_eq!(gate.state(), GateState::Unlocked);
        assert!(!gate.is_locked().unwrap());
        assert!(gate.unlock("anything").unwrap());
        assert_eq!(gate.failed_attempts(), 0);
    }

    #[test]
    fn test_locked_until_correct_password() {
        let store = store();
        store.set_password("secret1").unwrap();
        let gate = GateController::new(store).unwrap();

        assert!(gate.is_locked().unwrap());
        assert!(!gate.unlock("Secret1").unwrap());
        assert!(!gate.unlock("").unwrap());
        assert!(gate.is_locked().unwrap());
        assert_eq!(gate.failed_attempts(), 2);

        assert!(gate.unlock("secret1").unwrap());
        assert!(!gate.is_locked().unwrap());
        assert_eq!(gate.state(), GateState::Unlocked);
    }

    #[test]
    fn test_clearing_credential_opens_locked_gate() {
        let store = store();
        store.set_password("secret1").unwrap();
        let gate = GateController::new(Arc::clone(&store)).unwrap();
        assert!(gate.is_locked().unwrap());

        store.clear_password().unwrap();
        assert!(!gate.is_locked().unwrap());
    }

    #[test]
    fn test_wrong_password_stays_unlocked_once_open() {
        let store = store();
        store.set_password("secret1").unwrap();
        let gate = GateController::new(store).unwrap();
        assert!(gate.unlock("secret1").unwrap());

        assert!(!gate.unlock("wrong").unwrap());
        assert_eq!(gate.state(), GateState::Unlocked);
    }

    #[test]
    fn test_prompt_rejects_and_clears_input() {
        let store = store();
        store.set_password("secret1").unwrap();
        let mut prompt = UnlockPrompt::new(Arc::new(GateController::new(store).unwrap()));

        prompt.set_input("Secret1");
        assert_eq!(
            prompt.submit().unwrap(),
            PromptOutcome::Rejected {
                message: INCORRECT_PASSWORD
            }
        );
        assert_eq!(prompt.input(), "");
        assert!(prompt.gate().is_locked().unwrap());
        assert!(!prompt.dismissible());

        prompt.input_mut().push_str("secret");
        prompt.input_mut().push('1');
        assert_eq!(prompt.submit().unwrap(), PromptOutcome::Unlocked);
        assert!(!prompt.gate().is_locked().unwrap());
    }
}
