//! Control command types.
//!
//! Commands flow controller -> dispatcher; each carries a per-session
//! sequence number so replays and reordering are detectable.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::desktop::{ClipboardContent, MousePosition, ScreenResolution};
use crate::session::SessionId;

/// Globally unique command identity: issuing session plus its sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub struct CommandId {
    pub session: SessionId,
    /// Per-session monotonically increasing sequence number, starting at 1.
    pub seq: u64,
}

impl std::fmt::Display for CommandId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.session, self.seq)
    }
}

/// What a command does to the desktop. All kinds mutate state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub enum CommandKind {
    /// Move the cursor to an absolute position.
    MoveMouse { position: MousePosition },

    /// Replace the clipboard contents.
    SetClipboard { content: ClipboardContent },

    /// Change the desktop resolution.
    SetResolution { resolution: ScreenResolution },

    /// Press a combination of named keys simultaneously.
    KeyCombo { keys: Vec<String> },

    /// Request a power-state change on the desktop.
    PowerAction { action: PowerAction },
}

impl CommandKind {
    /// Short name for logging and audit records.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::MoveMouse { .. } => "MoveMouse",
            Self::SetClipboard { .. } => "SetClipboard",
            Self::SetResolution { .. } => "SetResolution",
            Self::KeyCombo { .. } => "KeyCombo",
            Self::PowerAction { .. } => "PowerAction",
        }
    }
}

/// Power-state changes a controller may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub enum PowerAction {
    Shutdown,
    Restart,
    Sleep,
    LockScreen,
}

impl std::fmt::Display for PowerAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shutdown => write!(f, "Shutdown"),
            Self::Restart => write!(f, "Restart"),
            Self::Sleep => write!(f, "Sleep"),
            Self::LockScreen => write!(f, "LockScreen"),
        }
    }
}

/// A submitted command, as seen by the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct Command {
    pub id: CommandId,
    pub kind: CommandKind,
    /// Unix milliseconds at submission.
    pub submitted_at_ms: u64,
}

/// Lifecycle of a command through the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum CommandStatus {
    Pending,
    Applied,
    Rejected,
}

impl std::fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Applied => write!(f, "Applied"),
            Self::Rejected => write!(f, "Rejected"),
        }
    }
}

/// Outcome of a `submit` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct CommandResult {
    pub id: CommandId,
    pub status: CommandStatus,
    /// Desktop version after a successful apply.
    pub new_version: Option<u64>,
    /// Machine-readable reason code on rejection.
    pub reason: Option<String>,
}

impl CommandResult {
    /// A successful apply at the given version.
    #[must_use]
    pub fn applied(id: CommandId, new_version: u64) -> Self {
        Self {
            id,
            status: CommandStatus::Applied,
            new_version: Some(new_version),
            reason: None,
        }
    }

    /// A rejection carrying its reason code.
    #[must_use]
    pub fn rejected(id: CommandId, reason: impl Into<String>) -> Self {
        Self {
            id,
            status: CommandStatus::Rejected,
            new_version: None,
            reason: Some(reason.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names() {
        let kind = CommandKind::MoveMouse {
            position: MousePosition::new(1, 2),
        };
        assert_eq!(kind.name(), "MoveMouse");
        let kind = CommandKind::PowerAction {
            action: PowerAction::LockScreen,
        };
        assert_eq!(kind.name(), "PowerAction");
    }

    #[test]
    fn command_bincode_roundtrip() {
        let command = Command {
            id: CommandId {
                session: SessionId::new(),
                seq: 3,
            },
            kind: CommandKind::SetClipboard {
                content: ClipboardContent::new("copy me"),
            },
            submitted_at_ms: 1_700_000_000_000,
        };
        let config = bincode::config::standard();
        let bytes = bincode::encode_to_vec(&command, config).unwrap();
        let (decoded, _): (Command, _) = bincode::decode_from_slice(&bytes, config).unwrap();
        assert_eq!(command, decoded);
    }

    #[test]
    fn result_constructors() {
        let id = CommandId {
            session: SessionId::new(),
            seq: 1,
        };
        let ok = CommandResult::applied(id, 5);
        assert_eq!(ok.status, CommandStatus::Applied);
        assert_eq!(ok.new_version, Some(5));
        assert!(ok.reason.is_none());

        let rejected = CommandResult::rejected(id, "out_of_order");
        assert_eq!(rejected.status, CommandStatus::Rejected);
        assert!(rejected.new_version.is_none());
        assert_eq!(rejected.reason.as_deref(), Some("out_of_order"));
    }
}
