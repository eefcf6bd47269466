//! Shared types for deskgate.
//!
//! This crate contains all types shared across the deskgate workspace:
//! session identity and lifecycle, control commands, desktop state
//! snapshots, and the events fanned out to control-channel subscribers.

pub mod command;
pub mod desktop;
pub mod event;
pub mod session;

pub use command::{Command, CommandId, CommandKind, CommandResult, CommandStatus, PowerAction};
pub use desktop::{ClipboardContent, DesktopId, DesktopSnapshot, MousePosition, ScreenResolution};
pub use event::{EndReason, LifecycleEvent, StateChangeEvent};
pub use session::{AccessMode, Identity, SessionId, SessionState, SessionSummary, SessionToken};
