//! Single-shot consent slot
//!
//! Bridges a platform confirmation dialog (device credential prompt,
//! biometric sheet, ...) into async code. A caller awaits
//! [`ConsentSlot::request`]; whoever receives the dialog's result calls
//! [`ConsentSlot::deliver`]. At most one request is pending at a time and
//! each is resolved at most once.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;

/// Platform result code meaning the user confirmed
pub const RESULT_OK: i32 = -1;

/// Why a consent request resolved without an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConsentError {
    /// Cancelled, or replaced by a newer request
    #[error("Consent request cancelled")]
    Cancelled,
}

/// What happened when the dialog was asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// The dialog is showing; a result will be delivered later
    Launched,
    /// No dialog needed, consent is already in place
    AlreadyGranted,
    /// The dialog cannot be shown on this device
    Unavailable,
}

/// Shows the external consent dialog
pub trait ConsentLauncher: Send + Sync {
    /// Ask for the dialog. Called with the request already pending, so a
    /// synchronous `deliver` from inside is fine.
    fn launch(&self) -> LaunchOutcome;
}

impl<F> ConsentLauncher for F
where
    F: Fn() -> LaunchOutcome + Send + Sync,
{
    fn launch(&self) -> LaunchOutcome {
        self()
    }
}

struct Pending {
    id: u64,
    tx: oneshot::Sender<bool>,
}

/// Holder for the one pending consent request
#[derive(Default)]
pub struct ConsentSlot {
    pending: Mutex<Option<Pending>>,
    next_id: AtomicU64,
}

impl ConsentSlot {
    /// Empty slot
    pub fn new() -> Self {
        Self::default()
    }

    /// Request consent and wait for the answer.
    ///
    /// A request made while another is pending replaces it; the older
    /// waiter gets [`ConsentError::Cancelled`]. Dropping the returned future
    /// clears the slot.
    pub async fn request(&self, launcher: &dyn ConsentLauncher) -> Result<bool, ConsentError> {
        let (tx, rx) = oneshot::channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        if self.pending.lock().replace(Pending { id, tx }).is_some() {
            tracing::warn!("Consent request superseded by a newer one");
        }
        let _guard = SlotGuard { slot: self, id };

        match launcher.launch() {
            LaunchOutcome::Launched => {}
            LaunchOutcome::AlreadyGranted => return Ok(true),
            LaunchOutcome::Unavailable => {
                tracing::debug!("Consent dialog unavailable");
                return Ok(false);
            }
        }

        rx.await.map_err(|_| ConsentError::Cancelled)
    }

    /// Resolve the pending request. Returns `false` if nothing was pending.
    pub fn deliver(&self, granted: bool) -> bool {
        match self.pending.lock().take() {
            Some(pending) => {
                // Receiver gone means the waiter was dropped between take and send.
                let _ = pending.tx.send(granted);
                tracing::debug!("Consent delivered (granted: {})", granted);
                true
            }
            None => {
                tracing::debug!("Consent result with no pending request ignored");
                false
            }
        }
    }

    /// Resolve the pending request from a platform result code
    pub fn deliver_result_code(&self, code: i32) -> bool {
        self.deliver(code == RESULT_OK)
    }

    /// Drop the pending request; its waiter gets [`ConsentError::Cancelled`]
    pub fn cancel(&self) {
        if self.pending.lock().take().is_some() {
            tracing::debug!("Consent request cancelled");
        }
    }

    /// True while a request is waiting for its answer
    pub fn is_pending(&self) -> bool {
        self.pending.lock().is_some()
    }
}

/// Clears the slot when the waiting request goes away, unless a newer
/// request has taken it over.
struct SlotGuard<'a> {
    slot: &'a ConsentSlot,
    id: u64,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        let mut pending = self.slot.pending.lock();
        if pending.as_ref().map(|p| p.id) == Some(self.id) {
            *pending = None;
        }
    }
}
