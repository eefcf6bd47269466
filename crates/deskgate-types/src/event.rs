//! Events fanned out over control channels.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::command::CommandId;
use crate::desktop::DesktopSnapshot;
use crate::session::{AccessMode, SessionId};

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum EndReason {
    /// The client asked to terminate.
    ClientRequest,
    /// No activity within the configured idle window.
    IdleTimeout,
    /// Forced out by an administrative action.
    AdminEviction,
    /// The engine is shutting down.
    EngineShutdown,
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ClientRequest => write!(f, "ClientRequest"),
            Self::IdleTimeout => write!(f, "IdleTimeout"),
            Self::AdminEviction => write!(f, "AdminEviction"),
            Self::EngineShutdown => write!(f, "EngineShutdown"),
        }
    }
}

/// Published to every subscriber after a successful mutation.
///
/// A notification reflects a version at least as new as the one in effect
/// when it was generated; subscribers resynchronise from the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct StateChangeEvent {
    /// Desktop version this event describes.
    pub version: u64,
    /// The command that produced the mutation.
    pub produced_by: CommandId,
    /// Full state after the mutation.
    pub snapshot: DesktopSnapshot,
}

/// Session lifecycle notifications, consumed by admin observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum LifecycleEvent {
    /// A session was created.
    Created {
        session: SessionId,
        mode: AccessMode,
    },
    /// A session attached its control channel and became Active.
    Activated { session: SessionId },
    /// A session went Idle (soft, still usable).
    WentIdle { session: SessionId },
    /// A session ended.
    Terminated {
        session: SessionId,
        reason: EndReason,
    },
    /// Exclusive access changed hands.
    ExclusiveGranted { session: SessionId },
}

impl LifecycleEvent {
    /// The session this event concerns.
    #[must_use]
    pub fn session(&self) -> SessionId {
        match self {
            Self::Created { session, .. }
            | Self::Activated { session }
            | Self::WentIdle { session }
            | Self::Terminated { session, .. }
            | Self::ExclusiveGranted { session } => *session,
        }
    }
}
