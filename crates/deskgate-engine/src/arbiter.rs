//! Exclusive-access arbitration.
//!
//! Exactly one session may hold Exclusive access to the desktop at a time.
//! Denied requesters queue FIFO and are promoted when the holder releases
//! or terminates; promotion happens inside the same call, so a terminated
//! holder can never leak the slot.

use std::collections::VecDeque;
use std::sync::Mutex;

use deskgate_types::SessionId;
use tracing::{debug, info};

/// Outcome of an exclusive-access request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArbiterDecision {
    /// The requester now holds Exclusive access.
    Granted,
    /// Someone else holds it; the requester has been queued FIFO.
    Denied { holder: SessionId },
}

struct Inner {
    holder: Option<SessionId>,
    queue: VecDeque<SessionId>,
}

/// Grants and queues Exclusive access requests.
pub struct SessionArbiter {
    inner: Mutex<Inner>,
}

impl SessionArbiter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                holder: None,
                queue: VecDeque::new(),
            }),
        }
    }

    /// Request Exclusive access.
    ///
    /// First come, first served: if the slot is free it is granted
    /// immediately; otherwise the requester joins the wait queue once,
    /// and repeat requests do not duplicate the entry. Asking again while
    /// already the holder is a no-op `Granted`.
    pub fn request_exclusive(&self, session: SessionId) -> ArbiterDecision {
        let mut inner = self.lock();
        match inner.holder {
            None => {
                inner.holder = Some(session);
                info!(session = %session, "exclusive access granted");
                ArbiterDecision::Granted
            }
            Some(holder) if holder == session => ArbiterDecision::Granted,
            Some(holder) => {
                if !inner.queue.contains(&session) {
                    inner.queue.push_back(session);
                }
                debug!(session = %session, holder = %holder, queued = inner.queue.len(),
                    "exclusive access denied, queued");
                ArbiterDecision::Denied { holder }
            }
        }
    }

    /// Voluntarily relinquish Exclusive access.
    ///
    /// Returns the session promoted from the queue head, if any. Calling
    /// without holding the slot is a no-op (the caller may have been
    /// terminated concurrently).
    pub fn release(&self, session: SessionId) -> Option<SessionId> {
        let mut inner = self.lock();
        if inner.holder != Some(session) {
            // Not the holder; drop any queued request instead.
            inner.queue.retain(|s| *s != session);
            return None;
        }
        Self::promote(&mut inner)
    }

    /// Remove a terminated session from the holder slot or the queue.
    ///
    /// Promotion happens here, in the same critical section, so the slot is
    /// never left dangling behind a dead session.
    pub fn handle_termination(&self, session: SessionId) -> Option<SessionId> {
        let mut inner = self.lock();
        if inner.holder == Some(session) {
            return Self::promote(&mut inner);
        }
        inner.queue.retain(|s| *s != session);
        None
    }

    /// Current Exclusive holder, if any.
    #[must_use]
    pub fn holder(&self) -> Option<SessionId> {
        self.lock().holder
    }

    /// Whether the given session currently holds Exclusive access.
    #[must_use]
    pub fn is_holder(&self, session: SessionId) -> bool {
        self.lock().holder == Some(session)
    }

    /// Number of sessions waiting for the slot.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.lock().queue.len()
    }

    fn promote(inner: &mut Inner) -> Option<SessionId> {
        inner.holder = inner.queue.pop_front();
        if let Some(next) = inner.holder {
            info!(session = %next, "exclusive access promoted from queue");
        }
        inner.holder
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Default for SessionArbiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grants_free_slot() {
        let arbiter = SessionArbiter::new();
        let a = SessionId::new();
        assert_eq!(arbiter.request_exclusive(a), ArbiterDecision::Granted);
        assert!(arbiter.is_holder(a));
    }

    #[test]
    fn denies_and_queues_second_requester() {
        let arbiter = SessionArbiter::new();
        let a = SessionId::new();
        let b = SessionId::new();
        arbiter.request_exclusive(a);
        assert_eq!(
            arbiter.request_exclusive(b),
            ArbiterDecision::Denied { holder: a }
        );
        assert_eq!(arbiter.queue_len(), 1);
        // Repeat requests do not duplicate the queue entry.
        arbiter.request_exclusive(b);
        assert_eq!(arbiter.queue_len(), 1);
    }

    #[test]
    fn rerequest_by_holder_is_granted() {
        let arbiter = SessionArbiter::new();
        let a = SessionId::new();
        arbiter.request_exclusive(a);
        assert_eq!(arbiter.request_exclusive(a), ArbiterDecision::Granted);
        assert_eq!(arbiter.queue_len(), 0);
    }

    #[test]
    fn release_promotes_fifo() {
        let arbiter = SessionArbiter::new();
        let a = SessionId::new();
        let b = SessionId::new();
        let c = SessionId::new();
        arbiter.request_exclusive(a);
        arbiter.request_exclusive(b);
        arbiter.request_exclusive(c);
        assert_eq!(arbiter.release(a), Some(b));
        assert!(arbiter.is_holder(b));
        assert_eq!(arbiter.release(b), Some(c));
        assert_eq!(arbiter.release(c), None);
        assert!(arbiter.holder().is_none());
    }

    #[test]
    fn termination_of_holder_promotes() {
        let arbiter = SessionArbiter::new();
        let a = SessionId::new();
        let b = SessionId::new();
        arbiter.request_exclusive(a);
        arbiter.request_exclusive(b);
        assert_eq!(arbiter.handle_termination(a), Some(b));
        assert!(arbiter.is_holder(b));
    }

    #[test]
    fn termination_of_queued_session_removes_it() {
        let arbiter = SessionArbiter::new();
        let a = SessionId::new();
        let b = SessionId::new();
        let c = SessionId::new();
        arbiter.request_exclusive(a);
        arbiter.request_exclusive(b);
        arbiter.request_exclusive(c);
        assert_eq!(arbiter.handle_termination(b), None);
        assert_eq!(arbiter.release(a), Some(c));
    }

    #[test]
    fn release_by_non_holder_is_noop() {
        let arbiter = SessionArbiter::new();
        let a = SessionId::new();
        let b = SessionId::new();
        arbiter.request_exclusive(a);
        assert_eq!(arbiter.release(b), None);
        assert!(arbiter.is_holder(a));
    }

    #[test]
    fn single_holder_under_interleaving() {
        let arbiter = SessionArbiter::new();
        let sessions: Vec<SessionId> = (0..8).map(|_| SessionId::new()).collect();
        for s in &sessions {
            arbiter.request_exclusive(*s);
        }
        // Exactly one holder at every step of the drain.
        let mut seen = vec![arbiter.holder().unwrap()];
        while let Some(next) = arbiter.release(arbiter.holder().unwrap()) {
            assert_eq!(arbiter.holder(), Some(next));
            seen.push(next);
        }
        assert_eq!(seen, sessions);
    }
}
