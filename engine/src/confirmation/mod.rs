//! Confirmation broker
//!
//! Holds at most one pending confirmation per session. A waiter is resolved
//! exactly once: by [`ConfirmationBroker::resolve`], by its timeout, or by
//! the task's cancellation token. The pending entry is released on every
//! path, including when the waiting future is dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Outcome of waiting for a user decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationDecision {
    /// User approved the action
    Approved,
    /// User rejected the action, or a newer request superseded this one
    Rejected,
    /// No answer before the timeout
    TimedOut,
    /// The task was cancelled while waiting
    Cancelled,
}

impl ConfirmationDecision {
    /// Only an explicit approval lets the action through
    pub fn is_approved(self) -> bool {
        matches!(self, ConfirmationDecision::Approved)
    }
}

struct PendingConfirmation {
    id: u64,
    responder: oneshot::Sender<bool>,
}

/// Session-scoped one-shot confirmations
#[derive(Default)]
pub struct ConfirmationBroker {
    pending: Mutex<HashMap<String, PendingConfirmation>>,
    next_id: AtomicU64,
}

/// A registered confirmation waiting to be awaited
///
/// Registered before the request is announced so an immediate answer is
/// never lost. Dropping it removes the entry unless a newer request owns it.
pub struct PendingWait<'a> {
    broker: &'a ConfirmationBroker,
    session_id: String,
    id: u64,
    receiver: Option<oneshot::Receiver<bool>>,
}

impl PendingWait<'_> {
    /// Wait for the decision, the timeout or cancellation
    pub async fn wait(
        mut self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> ConfirmationDecision {
        let Some(receiver) = self.receiver.take() else {
            return ConfirmationDecision::Rejected;
        };

        debug!(
            "Waiting up to {}ms for confirmation in session {}",
            timeout.as_millis(),
            self.session_id
        );

        let decision = tokio::select! {
            biased;
            _ = cancel.cancelled() => ConfirmationDecision::Cancelled,
            answer = tokio::time::timeout(timeout, receiver) => match answer {
                Ok(Ok(true)) => ConfirmationDecision::Approved,
                Ok(Ok(false)) => ConfirmationDecision::Rejected,
                // Sender dropped: superseded by a newer request
                Ok(Err(_)) => ConfirmationDecision::Rejected,
                Err(_) => ConfirmationDecision::TimedOut,
            },
        };

        info!(
            "Confirmation for session {} resolved: {:?}",
            self.session_id, decision
        );
        decision
    }
}

impl Drop for PendingWait<'_> {
    fn drop(&mut self) {
        let mut pending = self.broker.lock_pending();
        if pending
            .get(&self.session_id)
            .is_some_and(|entry| entry.id == self.id)
        {
            pending.remove(&self.session_id);
        }
    }
}

impl ConfirmationBroker {
    /// Create a new broker with no pending confirmations
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_pending(&self) -> MutexGuard<'_, HashMap<String, PendingConfirmation>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Open a pending confirmation for the session
    ///
    /// From this point [`ConfirmationBroker::resolve`] delivers to the
    /// returned handle, even before [`PendingWait::wait`] is polled. A newer
    /// registration on the same session supersedes this one, which then
    /// resolves as [`ConfirmationDecision::Rejected`].
    pub fn register(&self, session_id: &str) -> PendingWait<'_> {
        let (tx, rx) = oneshot::channel();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        if self
            .lock_pending()
            .insert(
                session_id.to_string(),
                PendingConfirmation { id, responder: tx },
            )
            .is_some()
        {
            warn!("Superseding pending confirmation for session {}", session_id);
        }

        PendingWait {
            broker: self,
            session_id: session_id.to_string(),
            id,
            receiver: Some(rx),
        }
    }

    /// Register and wait in one call
    pub async fn wait_for_decision(
        &self,
        session_id: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> ConfirmationDecision {
        self.register(session_id).wait(timeout, cancel).await
    }

    /// Deliver a decision to the session's pending confirmation
    ///
    /// Returns `false` when nothing was waiting.
    pub fn resolve(&self, session_id: &str, approved: bool) -> bool {
        let entry = self.lock_pending().remove(session_id);

        match entry {
            Some(entry) => entry.responder.send(approved).is_ok(),
            None => {
                debug!("No pending confirmation for session {}", session_id);
                false
            }
        }
    }

    /// Whether the session currently has a pending confirmation
    pub fn is_pending(&self, session_id: &str) -> bool {
        self.lock_pending().contains_key(session_id)
    }

    /// Number of pending confirmations across all sessions
    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }
}
