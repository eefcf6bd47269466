//! Command validation and application.
//!
//! Per-command state machine: Received -> Validated -> Applying ->
//! Applied | Rejected. Rejections are non-destructive; the desktop record
//! is never partially mutated.

use std::sync::Arc;

use deskgate_types::{Command, CommandId, CommandKind, CommandResult, SessionId, StateChangeEvent};
use tracing::{error, warn};

use crate::arbiter::SessionArbiter;
use crate::audit::{AuditRecord, AuditSink};
use crate::channel::ChannelHub;
use crate::config::InputConfig;
use crate::desktop::DesktopState;
use crate::error::EngineError;
use crate::store::{unix_ms, SessionStore};

/// Bounded retries on version conflict before the desktop is declared
/// inconsistent. Exclusive access serialises writers, so any conflict at
/// all means the arbiter let two through.
const MAX_APPLY_ATTEMPTS: u32 = 3;

/// Validates and applies commands against the desktop through the arbiter.
pub struct CommandDispatcher {
    store: Arc<SessionStore>,
    desktop: Arc<DesktopState>,
    arbiter: Arc<SessionArbiter>,
    hub: Arc<ChannelHub>,
    audit: Arc<dyn AuditSink>,
    blocked_keys: Vec<String>,
    max_combo_keys: usize,
}

impl CommandDispatcher {
    #[must_use]
    pub fn new(
        store: Arc<SessionStore>,
        desktop: Arc<DesktopState>,
        arbiter: Arc<SessionArbiter>,
        hub: Arc<ChannelHub>,
        audit: Arc<dyn AuditSink>,
        input: &InputConfig,
    ) -> Self {
        Self {
            store,
            desktop,
            arbiter,
            hub,
            audit,
            blocked_keys: input
                .blocked_keys
                .iter()
                .map(|k| k.to_ascii_lowercase())
                .collect(),
            max_combo_keys: input.max_combo_keys,
        }
    }

    /// Submit a command on behalf of a session.
    ///
    /// `Err` only for sessions with no record at all (a transport-layer
    /// bug); every policy outcome is a `CommandResult` with a reason code,
    /// and every submission is audited either way.
    pub async fn submit(
        &self,
        session: SessionId,
        seq: u64,
        kind: CommandKind,
    ) -> Result<CommandResult, EngineError> {
        if self.store.state_of(session).is_none() {
            return Err(EngineError::NotFound(session));
        }
        let command = Command {
            id: CommandId { session, seq },
            kind,
            submitted_at_ms: unix_ms(),
        };

        let result = match self.process(&command) {
            Ok(new_version) => CommandResult::applied(command.id, new_version),
            Err(e) => CommandResult::rejected(command.id, e.reason_code()),
        };

        self.audit
            .record(AuditRecord {
                command: command.id,
                session,
                kind: command.kind.name(),
                timestamp_ms: command.submitted_at_ms,
                status: result.status,
                reason: result.reason.clone(),
            })
            .await;
        Ok(result)
    }

    fn process(&self, command: &Command) -> Result<u64, EngineError> {
        let id = command.id;
        let kind = &command.kind;
        // Received -> Validated.
        if self.desktop.is_halted() {
            return Err(EngineError::ConsistencyFailure);
        }
        // Replay protection comes first: the high-water mark must advance
        // even for submissions rejected later in the pipeline.
        self.store.check_sequence(id.session, id.seq)?;
        self.store
            .touch(id.session)
            .map_err(|_| EngineError::SessionTerminated)?;
        self.validate_payload(kind)?;
        if !self.arbiter.is_holder(id.session) {
            return Err(EngineError::ExclusiveRequired {
                holder: self.arbiter.holder(),
            });
        }

        // Validated -> Applying. Mandatory liveness re-check immediately
        // before the apply step: a session terminated mid-flight must not
        // mutate state even though validation already passed.
        match self.store.state_of(id.session) {
            Some(state) if state.is_live() => {}
            _ => return Err(EngineError::SessionTerminated),
        }

        let mut expected = self.desktop.snapshot().version;
        for attempt in 1..=MAX_APPLY_ATTEMPTS {
            match self.desktop.try_apply(expected, id, kind) {
                Ok(snapshot) => {
                    let event = StateChangeEvent {
                        version: snapshot.version,
                        produced_by: id,
                        snapshot,
                    };
                    self.hub.publish_state(&event);
                    return Ok(event.version);
                }
                Err(EngineError::VersionConflict {
                    expected: stale,
                    actual,
                }) => {
                    warn!(command = %id, attempt, stale, actual,
                        "version conflict under exclusive access");
                    expected = actual;
                }
                Err(other) => return Err(other),
            }
        }

        // A conflict that survives re-reads under a single-writer
        // discipline is a broken invariant, not a transient fault.
        error!(command = %id, attempts = MAX_APPLY_ATTEMPTS,
            "persistent version conflict, halting desktop");
        self.desktop.halt();
        Err(EngineError::ConsistencyFailure)
    }

    fn validate_payload(&self, kind: &CommandKind) -> Result<(), EngineError> {
        match kind {
            CommandKind::KeyCombo { keys } => {
                if keys.is_empty() {
                    return Err(EngineError::InvalidArgument(
                        "key combo must name at least one key".to_string(),
                    ));
                }
                if keys.len() > self.max_combo_keys {
                    return Err(EngineError::InvalidArgument(format!(
                        "key combo of {} keys exceeds the limit of {}",
                        keys.len(),
                        self.max_combo_keys
                    )));
                }
                for key in keys {
                    if self.blocked_keys.contains(&key.to_ascii_lowercase()) {
                        return Err(EngineError::InvalidArgument(format!(
                            "key {key} is blocked by policy"
                        )));
                    }
                }
                Ok(())
            }
            // Clipboard size and resolution bounds are enforced by the
            // desktop record itself at apply time.
            CommandKind::MoveMouse { .. }
            | CommandKind::SetClipboard { .. }
            | CommandKind::SetResolution { .. }
            | CommandKind::PowerAction { .. } => Ok(()),
        }
    }
}
