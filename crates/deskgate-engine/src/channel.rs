//! Control-channel fan-out.
//!
//! A subscription ties a session to a live delivery endpoint without either
//! side owning the other: dropping the receiver or terminating the session
//! removes the subscription, and closed endpoints are pruned on the next
//! publish rather than cross-notified.

use std::collections::HashMap;
use std::sync::Mutex;

use deskgate_types::{LifecycleEvent, SessionId, StateChangeEvent};
use tokio::sync::mpsc;
use tracing::debug;

/// Lazy, unbounded, non-restartable stream of state-change events.
///
/// Ends when the owning session terminates or the hub shuts down.
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<StateChangeEvent>,
}

impl EventStream {
    /// Receive the next event; `None` once the stream has ended.
    pub async fn next(&mut self) -> Option<StateChangeEvent> {
        self.rx.recv().await
    }

    /// Non-blocking poll, for callers with their own scheduling.
    pub fn try_next(&mut self) -> Option<StateChangeEvent> {
        self.rx.try_recv().ok()
    }
}

/// Stream of session lifecycle events for admin observers.
pub struct LifecycleStream {
    rx: mpsc::UnboundedReceiver<LifecycleEvent>,
}

impl LifecycleStream {
    /// Receive the next event; `None` once the hub has shut down.
    pub async fn next(&mut self) -> Option<LifecycleEvent> {
        self.rx.recv().await
    }

    /// Non-blocking poll.
    pub fn try_next(&mut self) -> Option<LifecycleEvent> {
        self.rx.try_recv().ok()
    }
}

/// Fan-out point for state-change and lifecycle events.
pub struct ChannelHub {
    state_subs: Mutex<HashMap<SessionId, mpsc::UnboundedSender<StateChangeEvent>>>,
    lifecycle_subs: Mutex<Vec<mpsc::UnboundedSender<LifecycleEvent>>>,
}

impl ChannelHub {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state_subs: Mutex::new(HashMap::new()),
            lifecycle_subs: Mutex::new(Vec::new()),
        }
    }

    /// Attach a state-change stream to a session.
    ///
    /// Subscribing again replaces the previous endpoint; the old stream
    /// ends. Streams are non-restartable: a consumer that lost its place
    /// re-reads the snapshot, it does not replay.
    pub fn subscribe(&self, session: SessionId) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let previous = self
            .state_subs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(session, tx);
        if previous.is_some() {
            debug!(session = %session, "replaced existing subscription");
        }
        EventStream { rx }
    }

    /// Attach an admin lifecycle stream.
    pub fn subscribe_lifecycle(&self) -> LifecycleStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lifecycle_subs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(tx);
        LifecycleStream { rx }
    }

    /// End a session's stream. Idempotent.
    pub fn close(&self, session: SessionId) {
        self.state_subs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&session);
    }

    /// Fan a state change out to every live subscriber.
    ///
    /// Endpoints whose receiver is gone are pruned here.
    pub fn publish_state(&self, event: &StateChangeEvent) {
        let mut subs = self
            .state_subs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        subs.retain(|session, tx| {
            let alive = tx.send(event.clone()).is_ok();
            if !alive {
                debug!(session = %session, "pruned dead subscription");
            }
            alive
        });
    }

    /// Fan a lifecycle event out to admin observers.
    pub fn publish_lifecycle(&self, event: &LifecycleEvent) {
        let mut subs = self
            .lifecycle_subs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        subs.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Number of live state subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.state_subs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}

impl Default for ChannelHub {
    fn default() -> Self {
        Self::new()
    }
}
