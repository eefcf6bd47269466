//! Session store: the authoritative set of control sessions.
//!
//! All mutation goes through this API; nothing else reaches into the map.
//! Lifecycle transitions are published through the [`ChannelHub`] so admin
//! observers see them on the same path as ordinary events.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use deskgate_types::{
    AccessMode, EndReason, Identity, LifecycleEvent, SessionId, SessionState, SessionSummary,
    SessionToken,
};
use tracing::{debug, info};

use crate::channel::ChannelHub;
use crate::config::SessionConfig;
use crate::error::EngineError;

/// Current Unix time in milliseconds.
#[must_use]
pub(crate) fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

struct SessionRecord {
    identity: Identity,
    token: SessionToken,
    mode: AccessMode,
    state: SessionState,
    created_at_ms: u64,
    last_activity_ms: u64,
    last_activity: Instant,
    terminated_at: Option<Instant>,
    end_reason: Option<EndReason>,
    /// Highest sequence number observed, accepted or not.
    highest_seq: u64,
}

/// What a sweep pass found.
#[derive(Debug, Default)]
pub struct SweepOutcome {
    /// Sessions marked Idle this pass.
    pub went_idle: Vec<SessionId>,
    /// Sessions terminated with `IdleTimeout` this pass.
    pub timed_out: Vec<SessionId>,
    /// Terminated sessions garbage-collected past retention.
    pub collected: usize,
}

/// Owns all session records and their lifecycle.
pub struct SessionStore {
    sessions: Mutex<HashMap<SessionId, SessionRecord>>,
    hub: Arc<ChannelHub>,
    idle_after: Duration,
    idle_timeout: Duration,
    retention: Duration,
    max_sessions: usize,
}

impl SessionStore {
    #[must_use]
    pub fn new(config: &SessionConfig, hub: Arc<ChannelHub>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            hub,
            idle_after: Duration::from_secs(config.idle_after_secs),
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
            retention: Duration::from_secs(config.retention_secs),
            max_sessions: config.max_sessions,
        }
    }

    /// Insert a new session. Fails with `Capacity` when the live-session
    /// cap is reached.
    pub fn create(
        &self,
        id: SessionId,
        identity: Identity,
        token: SessionToken,
        mode: AccessMode,
    ) -> Result<(), EngineError> {
        let mut sessions = self.lock();
        let live = sessions.values().filter(|r| r.state.is_live()).count();
        if live >= self.max_sessions {
            return Err(EngineError::Capacity { holder: None });
        }
        let now_ms = unix_ms();
        sessions.insert(
            id,
            SessionRecord {
                identity: identity.clone(),
                token,
                mode,
                state: SessionState::Pending,
                created_at_ms: now_ms,
                last_activity_ms: now_ms,
                last_activity: Instant::now(),
                terminated_at: None,
                end_reason: None,
                highest_seq: 0,
            },
        );
        drop(sessions);
        info!(session = %id, identity = %identity, %mode, "session created");
        self.hub
            .publish_lifecycle(&LifecycleEvent::Created { session: id, mode });
        Ok(())
    }

    /// Refresh last-activity and mark the session Active.
    ///
    /// Unknown and Terminated sessions both fail with `NotFound`.
    pub fn touch(&self, id: SessionId) -> Result<(), EngineError> {
        let mut sessions = self.lock();
        let record = sessions.get_mut(&id).ok_or(EngineError::NotFound(id))?;
        if !record.state.can_touch() {
            return Err(EngineError::NotFound(id));
        }
        let was_pending = record.state == SessionState::Pending;
        record.state = SessionState::Active;
        record.last_activity = Instant::now();
        record.last_activity_ms = unix_ms();
        drop(sessions);
        if was_pending {
            self.hub
                .publish_lifecycle(&LifecycleEvent::Activated { session: id });
        }
        Ok(())
    }

    /// Enforce the per-session sequence discipline.
    ///
    /// Strict no-gap: the only accepted value is `highest_seen + 1`. The
    /// high-water mark advances on every observed submission, accepted or
    /// rejected, so a skipped number is never retroactively accepted; a
    /// client that gapped must resynchronise past its own high water.
    pub fn check_sequence(&self, id: SessionId, seq: u64) -> Result<(), EngineError> {
        let mut sessions = self.lock();
        let record = sessions.get_mut(&id).ok_or(EngineError::NotFound(id))?;
        let expected = record.highest_seq + 1;
        record.highest_seq = record.highest_seq.max(seq);
        if seq == expected {
            Ok(())
        } else {
            debug!(session = %id, expected, got = seq, "out-of-order sequence");
            Err(EngineError::OutOfOrder { expected, got: seq })
        }
    }

    /// Transition a session to Terminated.
    ///
    /// Idempotent: terminating an already-terminated session returns
    /// `Ok(false)` and emits nothing. Unknown sessions are `NotFound`.
    pub fn terminate(&self, id: SessionId, reason: EndReason) -> Result<bool, EngineError> {
        let mut sessions = self.lock();
        let record = sessions.get_mut(&id).ok_or(EngineError::NotFound(id))?;
        if record.state == SessionState::Terminated {
            return Ok(false);
        }
        record.state = SessionState::Terminated;
        record.terminated_at = Some(Instant::now());
        record.end_reason = Some(reason);
        drop(sessions);
        info!(session = %id, %reason, "session terminated");
        self.hub
            .publish_lifecycle(&LifecycleEvent::Terminated {
                session: id,
                reason,
            });
        Ok(true)
    }

    /// Remove a record outright, emitting nothing.
    ///
    /// Rollback path for a create whose exclusive grant fell through; the
    /// session never becomes visible as Terminated.
    pub fn discard(&self, id: SessionId) {
        self.lock().remove(&id);
    }

    /// Idle sweep and garbage collection.
    ///
    /// Sessions idle past the hard window are terminated with
    /// `IdleTimeout`; Active sessions past the soft window are marked Idle.
    /// Terminated records older than the retention window are dropped.
    /// The caller (the engine's sweep task) completes arbitration and
    /// channel cleanup for everything in `timed_out`.
    pub fn sweep(&self, now: Instant) -> SweepOutcome {
        let mut outcome = SweepOutcome::default();
        let mut sessions = self.lock();

        for (id, record) in sessions.iter_mut() {
            if !record.state.is_live() {
                continue;
            }
            let idle_for = now.saturating_duration_since(record.last_activity);
            if idle_for >= self.idle_timeout {
                record.state = SessionState::Terminated;
                record.terminated_at = Some(now);
                record.end_reason = Some(EndReason::IdleTimeout);
                outcome.timed_out.push(*id);
            } else if idle_for >= self.idle_after && record.state == SessionState::Active {
                record.state = SessionState::Idle;
                outcome.went_idle.push(*id);
            }
        }

        let retention = self.retention;
        let before = sessions.len();
        sessions.retain(|_, record| match record.terminated_at {
            Some(at) => now.saturating_duration_since(at) < retention,
            None => true,
        });
        outcome.collected = before - sessions.len();
        drop(sessions);

        for id in &outcome.timed_out {
            info!(session = %id, "session timed out");
            self.hub.publish_lifecycle(&LifecycleEvent::Terminated {
                session: *id,
                reason: EndReason::IdleTimeout,
            });
        }
        for id in &outcome.went_idle {
            self.hub
                .publish_lifecycle(&LifecycleEvent::WentIdle { session: *id });
        }
        outcome
    }

    /// Current state of a session, if it is still on record.
    #[must_use]
    pub fn state_of(&self, id: SessionId) -> Option<SessionState> {
        self.lock().get(&id).map(|r| r.state)
    }

    /// Current access mode of a session.
    #[must_use]
    pub fn mode_of(&self, id: SessionId) -> Option<AccessMode> {
        self.lock().get(&id).map(|r| r.mode)
    }

    /// Change a session's access mode (exclusive grant or release).
    pub fn set_mode(&self, id: SessionId, mode: AccessMode) -> Result<(), EngineError> {
        let mut sessions = self.lock();
        let record = sessions.get_mut(&id).ok_or(EngineError::NotFound(id))?;
        record.mode = mode;
        Ok(())
    }

    /// Constant-time token check for transport adapters.
    #[must_use]
    pub fn verify_token(&self, id: SessionId, token: &SessionToken) -> bool {
        self.lock()
            .get(&id)
            .is_some_and(|r| r.state.is_live() && r.token == *token)
    }

    /// All sessions on record, ordered by creation time.
    #[must_use]
    pub fn summaries(&self) -> Vec<SessionSummary> {
        let sessions = self.lock();
        let mut out: Vec<SessionSummary> = sessions
            .iter()
            .map(|(id, r)| SessionSummary {
                id: *id,
                identity: r.identity.clone(),
                mode: r.mode,
                state: r.state,
                created_at_ms: r.created_at_ms,
                last_activity_ms: r.last_activity_ms,
            })
            .collect();
        out.sort_by_key(|s| (s.created_at_ms, *s.id.as_uuid()));
        out
    }

    /// IDs of all live sessions.
    #[must_use]
    pub fn live_ids(&self) -> Vec<SessionId> {
        self.lock()
            .iter()
            .filter(|(_, r)| r.state.is_live())
            .map(|(id, _)| *id)
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SessionId, SessionRecord>> {
        self.sessions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
