//! Lockgate core
//!
//! The app-facing side of the password gate: the gate controller that owns
//! the locked/unlocked state, the unlock prompt and protection settings
//! models that screens drive, and a single-shot consent slot bridging an
//! external confirmation dialog into async code.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod consent;
pub mod error;
pub mod gate;
pub mod settings;

pub use consent::{ConsentError, ConsentLauncher, ConsentSlot, LaunchOutcome, RESULT_OK};
pub use error::{Error, ErrorCategory, Result};
pub use gate::{GateController, GateState, PromptOutcome, UnlockPrompt, INCORRECT_PASSWORD};
pub use settings::{ProtectionSettings, ToggleOutcome};

pub use lockgate_storage_sqlite::CredentialStore;
