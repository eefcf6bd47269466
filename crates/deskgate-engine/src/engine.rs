//! Engine facade: the external interface of the control core.
//!
//! Wires the credential registry, session store, desktop record, arbiter,
//! dispatcher, and channel hub together, and owns the background idle
//! sweep. The transport layer (HTTP/WebSocket, out of scope) calls these
//! methods with already-framed requests.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use deskgate_types::{
    AccessMode, CommandKind, CommandResult, EndReason, Identity, LifecycleEvent, SessionId,
    SessionState, SessionSummary, SessionToken,
};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::arbiter::{ArbiterDecision, SessionArbiter};
use crate::audit::{AuditSink, LogAuditSink};
use crate::auth::CredentialRegistry;
use crate::channel::{ChannelHub, EventStream, LifecycleStream};
use crate::config::Config;
use crate::desktop::DesktopState;
use crate::dispatcher::CommandDispatcher;
use crate::error::EngineError;
use crate::store::SessionStore;

/// Result of a successful authentication.
#[derive(Debug, Clone)]
pub struct AuthOutcome {
    pub session: SessionId,
    pub token: SessionToken,
    /// The mode actually granted.
    pub mode: AccessMode,
}

/// The control core for one logical desktop.
pub struct Engine {
    auth: CredentialRegistry,
    store: Arc<SessionStore>,
    desktop: Arc<DesktopState>,
    arbiter: Arc<SessionArbiter>,
    hub: Arc<ChannelHub>,
    dispatcher: CommandDispatcher,
    sweep_interval: Duration,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Build an engine from configuration with the default audit sink.
    #[must_use]
    pub fn new(config: &Config) -> Arc<Self> {
        Self::with_audit_sink(config, Arc::new(LogAuditSink))
    }

    /// Build an engine with a caller-provided audit sink.
    #[must_use]
    pub fn with_audit_sink(config: &Config, audit: Arc<dyn AuditSink>) -> Arc<Self> {
        let hub = Arc::new(ChannelHub::new());
        let store = Arc::new(SessionStore::new(&config.session, Arc::clone(&hub)));
        let desktop = Arc::new(DesktopState::new(
            deskgate_types::ScreenResolution::new(config.desktop.width, config.desktop.height),
            config.desktop.max_clipboard_bytes,
        ));
        let arbiter = Arc::new(SessionArbiter::new());
        let dispatcher = CommandDispatcher::new(
            Arc::clone(&store),
            Arc::clone(&desktop),
            Arc::clone(&arbiter),
            Arc::clone(&hub),
            audit,
            &config.input,
        );
        info!(desktop = %config.desktop.name, "engine initialised");
        Arc::new(Self {
            auth: CredentialRegistry::new(&config.identities),
            store,
            desktop,
            arbiter,
            hub,
            dispatcher,
            sweep_interval: Duration::from_secs(config.engine.sweep_interval_secs),
            sweeper: Mutex::new(None),
        })
    }

    /// Authenticate and open a session.
    ///
    /// An `Exclusive` request succeeds only if the slot is free at this
    /// instant; otherwise it fails with `Capacity` and no session is kept.
    /// The caller may retry as Observer and queue for the slot via
    /// [`Engine::request_exclusive`].
    pub fn authenticate(
        &self,
        identity: &Identity,
        secret: &str,
        requested_mode: AccessMode,
    ) -> Result<AuthOutcome, EngineError> {
        self.auth.verify(identity, secret)?;
        let token = self.auth.mint_token()?;
        let session = SessionId::new();

        if requested_mode == AccessMode::Exclusive {
            match self.arbiter.request_exclusive(session) {
                ArbiterDecision::Granted => {}
                ArbiterDecision::Denied { holder } => {
                    // Leave no queue entry behind for the aborted session.
                    self.arbiter.handle_termination(session);
                    return Err(EngineError::Capacity {
                        holder: Some(holder),
                    });
                }
            }
        }

        if let Err(e) = self
            .store
            .create(session, identity.clone(), token.clone(), requested_mode)
        {
            self.arbiter.handle_termination(session);
            return Err(e);
        }
        if requested_mode == AccessMode::Exclusive {
            self.hub
                .publish_lifecycle(&LifecycleEvent::ExclusiveGranted { session });
        }
        Ok(AuthOutcome {
            session,
            token,
            mode: requested_mode,
        })
    }

    /// Request Exclusive access for an existing session.
    ///
    /// Denied requesters are queued FIFO and promoted automatically when
    /// the holder releases or terminates.
    pub fn request_exclusive(&self, session: SessionId) -> Result<ArbiterDecision, EngineError> {
        match self.store.state_of(session) {
            Some(state) if state.is_live() => {}
            Some(_) => return Err(EngineError::SessionTerminated),
            None => return Err(EngineError::NotFound(session)),
        }
        let decision = self.arbiter.request_exclusive(session);
        if decision == ArbiterDecision::Granted {
            self.store.set_mode(session, AccessMode::Exclusive)?;
            self.hub
                .publish_lifecycle(&LifecycleEvent::ExclusiveGranted { session });
        }
        Ok(decision)
    }

    /// Voluntarily give up Exclusive access, promoting the queue head.
    pub fn release_exclusive(&self, session: SessionId) -> Result<(), EngineError> {
        if self.store.state_of(session).is_none() {
            return Err(EngineError::NotFound(session));
        }
        self.store.set_mode(session, AccessMode::Observer)?;
        let promoted = self.arbiter.release(session);
        self.finish_promotion(promoted);
        Ok(())
    }

    /// Report client activity (keepalive) for a session.
    pub fn touch(&self, session: SessionId) -> Result<(), EngineError> {
        self.store.touch(session)
    }

    /// Submit a control command.
    pub async fn submit(
        &self,
        session: SessionId,
        seq: u64,
        kind: CommandKind,
    ) -> Result<CommandResult, EngineError> {
        self.dispatcher.submit(session, seq, kind).await
    }

    /// Attach a state-change stream to a session.
    ///
    /// The stream is lazy, unbounded, and non-restartable; it ends when the
    /// session terminates.
    pub fn subscribe(&self, session: SessionId) -> Result<EventStream, EngineError> {
        self.store.touch(session)?;
        Ok(self.hub.subscribe(session))
    }

    /// Attach an admin lifecycle stream.
    #[must_use]
    pub fn subscribe_lifecycle(&self) -> LifecycleStream {
        self.hub.subscribe_lifecycle()
    }

    /// End a session at the client's request. Idempotent.
    pub fn terminate(&self, session: SessionId) -> Result<(), EngineError> {
        self.end_session(session, EndReason::ClientRequest)
    }

    /// All sessions on record, ordered by creation time.
    #[must_use]
    pub fn admin_list_sessions(&self) -> Vec<SessionSummary> {
        self.store.summaries()
    }

    /// Forcibly evict a session.
    pub fn admin_evict(&self, session: SessionId) -> Result<(), EngineError> {
        info!(session = %session, "admin eviction");
        self.end_session(session, EndReason::AdminEviction)
    }

    /// Read-only snapshot of the desktop, for transports serving initial
    /// state to a freshly attached client.
    #[must_use]
    pub fn desktop_snapshot(&self) -> deskgate_types::DesktopSnapshot {
        self.desktop.snapshot()
    }

    /// Start the background idle sweep.
    ///
    /// The sweep never blocks foreground command processing; terminations
    /// it causes flow through the same lifecycle/arbitration path as
    /// explicit ones.
    pub fn run_sweeper(self: &Arc<Self>) {
        let engine = Arc::clone(self);
        let interval = self.sweep_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                engine.sweep_once(Instant::now());
            }
        });
        let mut sweeper = self
            .sweeper
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(old) = sweeper.replace(handle) {
            old.abort();
        }
    }

    /// One sweep pass; exposed for deterministic tests.
    pub fn sweep_once(&self, now: Instant) {
        let outcome = self.store.sweep(now);
        if !outcome.timed_out.is_empty() || outcome.collected > 0 {
            debug!(
                timed_out = outcome.timed_out.len(),
                collected = outcome.collected,
                "sweep pass"
            );
        }
        for session in outcome.timed_out {
            self.hub.close(session);
            let promoted = self.arbiter.handle_termination(session);
            self.finish_promotion(promoted);
        }
    }

    /// Terminate every live session and stop the sweeper.
    pub fn shutdown(&self) {
        info!("engine shutting down");
        if let Some(handle) = self
            .sweeper
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
        for session in self.store.live_ids() {
            let _ = self.end_session(session, EndReason::EngineShutdown);
        }
    }

    fn end_session(&self, session: SessionId, reason: EndReason) -> Result<(), EngineError> {
        let newly_terminated = self.store.terminate(session, reason)?;
        if !newly_terminated {
            return Ok(());
        }
        self.hub.close(session);
        let promoted = self.arbiter.handle_termination(session);
        self.finish_promotion(promoted);
        Ok(())
    }

    /// Complete an arbiter promotion, skipping sessions that are no longer
    /// live. A sweep pass can terminate the holder and a queued session
    /// together; the queued one must not surface as the new holder.
    fn finish_promotion(&self, mut promoted: Option<SessionId>) {
        while let Some(next) = promoted {
            if self.store.state_of(next).is_some_and(SessionState::is_live) {
                let _ = self.store.set_mode(next, AccessMode::Exclusive);
                self.hub
                    .publish_lifecycle(&LifecycleEvent::ExclusiveGranted { session: next });
                return;
            }
            promoted = self.arbiter.handle_termination(next);
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Some(handle) = self
            .sweeper
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}
